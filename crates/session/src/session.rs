// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! A single streaming-audio session: owns the per-connection `Vad`,
//! `RollingBuffer`, `Deduper`, and (optionally) `ChunkRecorder`, and decides
//! when a smart trigger fires a commit to the client as a `final` message.

use std::sync::Arc;
use std::time::SystemTime;

use mte_asr::{AsrError, StreamingAsr};
use mte_core::state_helpers;
use mte_core::{AlignmentMethod, AlignmentState, CloseReason, SessionStateUpdate, TranscriptSegment};
use mte_engine::{ChunkRecorder, Deduper, DeduperConfig, DedupeOutcome, RollingBuffer, RollingBufferConfig, Vad};
use mte_store::VersionStore;
use tokio::sync::{broadcast, mpsc, Semaphore};

use crate::config::SessionConfig;
use crate::protocol::{AudioFrame, ServerMessage};
use crate::queue::AudioQueue;

const FRAME_MS: u32 = 20;
const SAMPLE_RATE: u32 = 16_000;
const MAX_TRANSIENT_RETRIES: u32 = 3;
const UNKNOWN_SPEAKER: &str = "Unknown";

fn ends_with_punctuation(text: &str) -> bool {
    text.trim_end().ends_with(['.', '!', '?'])
}

/// A `Clone`-able handle to a running session's processor task. Mirrors the
/// reference server's `Session` handle: cheap to clone, the actual state
/// lives behind the task it was spawned with.
#[derive(Clone)]
pub struct Session {
    pub id: String,
    pub meeting_id: Option<String>,
    pub created_at: SystemTime,
    queue: Arc<AudioQueue>,
    events_tx: broadcast::Sender<ServerMessage>,
}

impl Session {
    /// Spawns the session's processor task and returns a handle to it.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        id: String,
        meeting_id: Option<String>,
        config: SessionConfig,
        vad: Vad,
        streaming_asr: Arc<dyn StreamingAsr>,
        asr_semaphore: Arc<Semaphore>,
        chunk_recorder: Option<ChunkRecorder>,
        store: VersionStore,
        state_tx: mpsc::Sender<SessionStateUpdate>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(32);
        let queue = Arc::new(AudioQueue::new(config.max_audio_queue));

        let processor = SessionProcessor {
            id: id.clone(),
            meeting_id: meeting_id.clone().unwrap_or_else(|| id.clone()),
            config: config.clone(),
            vad,
            rolling_buffer: RollingBuffer::new(RollingBufferConfig {
                sample_rate: SAMPLE_RATE,
                window_sec: config.window_sec,
                overlap_sec: config.overlap_sec,
                max_window_sec: config.max_window_sec,
            }),
            deduper: Deduper::new(DeduperConfig::default()),
            streaming_asr,
            asr_semaphore,
            chunk_recorder,
            store,
            events_tx: events_tx.clone(),
            state_tx,
            silence_duration_sec: 0.0,
            stall_duration_sec: 0.0,
            last_partial_text: String::new(),
            stable_count: 0,
            consecutive_asr_failures: 0,
            degraded: false,
            last_audio_start_sec: None,
        };

        let queue_for_task = Arc::clone(&queue);
        tokio::spawn(processor.run(queue_for_task));

        Self { id, meeting_id, created_at: SystemTime::now(), queue, events_tx }
    }

    /// Enqueues a decoded audio frame. Drops the oldest queued frame under
    /// backpressure rather than blocking the caller (the WebSocket read loop).
    pub fn push_frame(&self, frame: AudioFrame) {
        if self.queue.push(frame) {
            tracing::warn!(session_id = %self.id, "audio queue full, dropped oldest frame");
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.events_tx.subscribe()
    }

    /// Builds a handle with no backing processor task, for exercising
    /// `SessionManager` bookkeeping in isolation.
    #[cfg(test)]
    #[must_use]
    pub fn for_test(
        id: String,
        queue: Arc<AudioQueue>,
        events_tx: broadcast::Sender<ServerMessage>,
    ) -> Self {
        Self { id, meeting_id: None, created_at: SystemTime::now(), queue, events_tx }
    }

    /// Signals the processor task to flush and close. Does not block; the
    /// processor finishes committing any buffered audio on its own task.
    pub fn close(&self) {
        self.queue.close();
    }
}

struct SessionProcessor {
    id: String,
    meeting_id: String,
    config: SessionConfig,
    vad: Vad,
    rolling_buffer: RollingBuffer,
    deduper: Deduper,
    streaming_asr: Arc<dyn StreamingAsr>,
    asr_semaphore: Arc<Semaphore>,
    chunk_recorder: Option<ChunkRecorder>,
    store: VersionStore,
    events_tx: broadcast::Sender<ServerMessage>,
    state_tx: mpsc::Sender<SessionStateUpdate>,
    silence_duration_sec: f64,
    stall_duration_sec: f64,
    last_partial_text: String,
    stable_count: u32,
    consecutive_asr_failures: u32,
    degraded: bool,
    last_audio_start_sec: Option<f64>,
}

impl SessionProcessor {
    fn emit(&self, msg: ServerMessage) {
        // No receivers yet (client reconnecting) is not an error.
        let _ = self.events_tx.send(msg);
    }

    async fn run(mut self, queue: Arc<AudioQueue>) {
        state_helpers::emit_streaming(&self.state_tx, &self.id);
        while let Some(frame) = queue.recv().await {
            self.handle_frame(frame).await;
            if self.degraded {
                break;
            }
        }
        state_helpers::emit_draining(&self.state_tx, &self.id, CloseReason::ClientClosed);
        self.finalize_on_close("session_closed").await;
        state_helpers::emit_closed(&self.state_tx, &self.id, CloseReason::ClientClosed);
    }

    async fn handle_frame(&mut self, mut frame: AudioFrame) {
        if let Some(recorder) = self.chunk_recorder.as_mut() {
            match recorder.write(&frame.samples, frame.audio_start_sec).await {
                Ok(Some(chunk)) => {
                    if let Err(e) = self.store.append_audio_chunk(&chunk).await {
                        tracing::warn!(session_id = %self.id, error = %e, "failed to persist audio chunk");
                    }
                },
                Ok(None) => {},
                Err(e) => {
                    tracing::warn!(session_id = %self.id, error = %e, "chunk recorder write failed");
                },
            }
        }

        if let Some(last) = self.last_audio_start_sec {
            if frame.audio_start_sec < last {
                tracing::warn!(
                    session_id = %self.id,
                    got = frame.audio_start_sec,
                    last,
                    "non-monotonic audio_start_sec, clamping"
                );
                frame.audio_start_sec = last + 0.1;
            }
        }
        self.last_audio_start_sec = Some(frame.audio_start_sec);

        let frame_duration_sec = frame.samples.len() as f64 / f64::from(SAMPLE_RATE);
        self.update_silence(&frame.samples);

        if let Err(mte_engine::RollingBufferError::Overflow { dropped }) =
            self.rolling_buffer.append(&frame.samples, frame.audio_start_sec)
        {
            tracing::warn!(session_id = %self.id, dropped, "rolling buffer overflow");
        }

        self.run_asr_and_maybe_commit(frame_duration_sec).await;
    }

    fn update_silence(&mut self, samples: &[i16]) {
        let frame_samples = (SAMPLE_RATE as usize / 1000) * FRAME_MS as usize;
        let mut any_speech = false;
        let mut evaluated = 0usize;
        for chunk in samples.chunks_exact(frame_samples) {
            if let Ok((mte_engine::VadDecision::Speech, _speech_prob)) = self.vad.is_speech(chunk, FRAME_MS) {
                any_speech = true;
            }
            evaluated += chunk.len();
        }
        let evaluated_sec = evaluated as f64 / f64::from(SAMPLE_RATE);
        if any_speech {
            self.silence_duration_sec = 0.0;
        } else {
            self.silence_duration_sec += evaluated_sec;
        }
    }

    async fn run_asr_and_maybe_commit(&mut self, frame_duration_sec: f64) {
        if self.rolling_buffer.is_empty() {
            return;
        }
        let (samples, start, end) = self.rolling_buffer.snapshot();

        let Ok(permit) = self.asr_semaphore.clone().acquire_owned().await else { return };
        let context_hint = self.deduper.context_hint().to_string();
        let result = self.streaming_asr.transcribe(&samples, &context_hint).await;
        drop(permit);

        let output = match result {
            Ok(o) => {
                self.consecutive_asr_failures = 0;
                o
            },
            Err(AsrError::Transient(msg)) => {
                self.consecutive_asr_failures += 1;
                tracing::warn!(session_id = %self.id, error = %msg, "transient ASR error");
                if self.consecutive_asr_failures >= MAX_TRANSIENT_RETRIES {
                    self.emit(ServerMessage::Error {
                        code: "asr_unavailable".to_string(),
                        message: msg,
                    });
                }
                return;
            },
            Err(AsrError::Permanent(msg)) => {
                tracing::error!(session_id = %self.id, error = %msg, "permanent ASR error, session degraded");
                self.emit(ServerMessage::Error { code: "asr_unavailable".to_string(), message: msg });
                self.degraded = true;
                return;
            },
            Err(AsrError::Io(e)) => {
                tracing::error!(session_id = %self.id, error = %e, "ASR I/O error");
                return;
            },
        };

        if output.text != self.last_partial_text {
            self.stable_count = 0;
            self.stall_duration_sec = 0.0;
            self.last_partial_text.clone_from(&output.text);
            self.emit(ServerMessage::Partial {
                text: output.text.clone(),
                confidence: output.confidence,
                is_stable: false,
            });
        } else {
            self.stable_count += 1;
            self.stall_duration_sec += frame_duration_sec;
        }

        if let Some(reason) = self.check_trigger(start, end) {
            self.commit(reason, &output.text, output.confidence, start, end).await;
        }
    }

    fn check_trigger(&self, start: f64, end: f64) -> Option<&'static str> {
        if self.silence_duration_sec >= self.config.silence_commit_sec {
            return Some("silence");
        }
        if end - start >= self.config.window_sec {
            return Some("window_full");
        }
        if ends_with_punctuation(&self.last_partial_text)
            && self.stall_duration_sec >= self.config.punctuation_stall_sec
        {
            return Some("punctuation_stall");
        }
        if self.stable_count >= self.config.stable_partial_count {
            return Some("stable_text");
        }
        None
    }

    async fn commit(&mut self, reason: &'static str, text: &str, confidence: f32, start: f64, end: f64) {
        match self.deduper.filter(text) {
            DedupeOutcome::Drop => {},
            DedupeOutcome::Keep(text) | DedupeOutcome::Trimmed(text) => {
                self.persist_live_segment(&text, confidence, start, end).await;
                self.emit(ServerMessage::Final {
                    text,
                    confidence,
                    reason: reason.to_string(),
                    audio_start_time: start,
                    audio_end_time: end,
                    duration: end - start,
                });
            },
        }
        self.rolling_buffer.slide();
        self.silence_duration_sec = 0.0;
        self.stall_duration_sec = 0.0;
        self.stable_count = 0;
        self.last_partial_text.clear();
    }

    /// Appends a committed final to the meeting's live `TranscriptVersion`.
    /// No speaker attribution is attempted live, so the segment carries
    /// `Unknown`/`UnknownSpeaker`/`Live` until diarization fuses it later.
    async fn persist_live_segment(&self, text: &str, confidence: f32, start: f64, end: f64) {
        let segment = TranscriptSegment {
            text: text.to_string(),
            audio_start_sec: start,
            audio_end_sec: end,
            speaker_label: UNKNOWN_SPEAKER.to_string(),
            speaker_confidence: confidence,
            alignment_state: AlignmentState::UnknownSpeaker,
            alignment_method: AlignmentMethod::Live,
        };
        if let Err(e) = self.store.append_live_segment(&self.meeting_id, &segment).await {
            tracing::warn!(session_id = %self.id, error = %e, "failed to persist live transcript segment");
        }
    }

    async fn finalize_on_close(&mut self, reason: &str) {
        if !self.rolling_buffer.is_empty() {
            let (samples, start, end) = self.rolling_buffer.drain();
            if let Ok(permit) = self.asr_semaphore.clone().acquire_owned().await {
                let context_hint = self.deduper.context_hint().to_string();
                if let Ok(output) = self.streaming_asr.transcribe(&samples, &context_hint).await {
                    if let DedupeOutcome::Keep(text) | DedupeOutcome::Trimmed(text) =
                        self.deduper.filter(&output.text)
                    {
                        self.persist_live_segment(&text, output.confidence, start, end).await;
                        self.emit(ServerMessage::Final {
                            text,
                            confidence: output.confidence,
                            reason: reason.to_string(),
                            audio_start_time: start,
                            audio_end_time: end,
                            duration: end - start,
                        });
                    }
                }
                drop(permit);
            }
        }
        if let Some(recorder) = self.chunk_recorder.take() {
            match recorder.close().await {
                Ok(Some(chunk)) => {
                    if let Err(e) = self.store.append_audio_chunk(&chunk).await {
                        tracing::warn!(session_id = %self.id, error = %e, "failed to persist final audio chunk");
                    }
                },
                Ok(None) => {},
                Err(e) => {
                    tracing::warn!(session_id = %self.id, error = %e, "chunk recorder close failed");
                },
            }
        }
    }
}
