// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Persists raw audio to disk in fixed-duration chunks so that, on crash, at
//! most the final partial chunk is lost. [`ChunkRecorder::merge_to_wav`]
//! stitches the chunks for a meeting back into a single WAV file for
//! post-processing (`hound`, matching the WAV-handling convention used
//! elsewhere in the retrieval pack's meeting-recording apps).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const SAMPLE_RATE: u32 = 16_000;
const BYTES_PER_SAMPLE: u64 = 2;

#[derive(Debug, Error)]
pub enum ChunkRecorderError {
    #[error("a recorder is already writing chunks for meeting {0}")]
    LeaseHeld(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV encoding error: {0}")]
    Wav(String),
}

/// Process-wide registry of meetings currently held by a writer, enforcing
/// the "at most one writer per meeting" guarantee across `ChunkRecorder`
/// instances.
#[derive(Clone, Default)]
pub struct LeaseRegistry {
    held: Arc<Mutex<HashSet<String>>>,
}

impl LeaseRegistry {
    fn acquire(&self, meeting_id: &str) -> Result<(), ChunkRecorderError> {
        let mut held = self.held.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !held.insert(meeting_id.to_string()) {
            return Err(ChunkRecorderError::LeaseHeld(meeting_id.to_string()));
        }
        Ok(())
    }

    fn release(&self, meeting_id: &str) {
        let mut held = self.held.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        held.remove(meeting_id);
    }
}

/// Writes raw PCM16 mono 16kHz audio to `<data_root>/<meeting_id>/chunk_NNNNN.pcm`,
/// rolling over to a new chunk every `chunk_duration_sec` seconds.
pub struct ChunkRecorder {
    meeting_id: String,
    dir: PathBuf,
    chunk_duration_sec: f64,
    registry: LeaseRegistry,
    current_seq: u32,
    current_samples: u64,
    current_bytes: u64,
    current_chunk_start_sec: Option<f64>,
    current_file: Option<fs::File>,
}

impl ChunkRecorder {
    /// Opens `<data_root>/<meeting_id>/`, creating it if absent, and acquires
    /// the meeting's write lease.
    ///
    /// # Errors
    /// Returns [`ChunkRecorderError::LeaseHeld`] if another recorder already
    /// holds the lease for this meeting.
    pub async fn start(
        data_root: &Path,
        meeting_id: &str,
        chunk_duration_sec: f64,
        registry: LeaseRegistry,
    ) -> Result<Self, ChunkRecorderError> {
        registry.acquire(meeting_id)?;
        let dir = data_root.join(meeting_id);
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            meeting_id: meeting_id.to_string(),
            dir,
            chunk_duration_sec,
            registry,
            current_seq: 0,
            current_samples: 0,
            current_bytes: 0,
            current_chunk_start_sec: None,
            current_file: None,
        })
    }

    /// Atomically renames this recorder's directory from its current meeting
    /// id (typically the originating session id) to `new_meeting_id`, e.g.
    /// once an external create-meeting call assigns the session a permanent
    /// meeting id. A no-op if `new_meeting_id` already matches.
    ///
    /// # Errors
    /// Returns [`ChunkRecorderError::LeaseHeld`] if another recorder already
    /// holds the lease for `new_meeting_id`, or an I/O error if the rename
    /// fails.
    pub async fn assign_meeting_id(&mut self, new_meeting_id: &str) -> Result<(), ChunkRecorderError> {
        if new_meeting_id == self.meeting_id {
            return Ok(());
        }
        self.registry.acquire(new_meeting_id)?;
        let new_dir = self.dir.parent().map_or_else(|| self.dir.clone(), |p| p.join(new_meeting_id));
        fs::rename(&self.dir, &new_dir).await?;
        self.registry.release(&self.meeting_id);
        self.meeting_id = new_meeting_id.to_string();
        self.dir = new_dir;
        Ok(())
    }

    fn chunk_path(&self, seq: u32) -> PathBuf {
        self.dir.join(format!("chunk_{seq:05}.pcm"))
    }

    async fn ensure_open(&mut self) -> Result<(), ChunkRecorderError> {
        if self.current_file.is_none() {
            let path = self.chunk_path(self.current_seq);
            self.current_file = Some(fs::File::create(path).await?);
        }
        Ok(())
    }

    /// Appends samples, rolling over to a new chunk file once the current one
    /// reaches `chunk_duration_sec` of audio. `samples` is little-endian i16
    /// PCM, matching the WebSocket ingress frame format. `audio_start_sec` is
    /// the stream-relative timestamp of the first sample in `samples`, and is
    /// recorded as the started-at time of whichever chunk it lands in.
    ///
    /// Returns the just-closed chunk's metadata when this call causes a
    /// rollover, for the caller to persist as an `AudioChunk` row.
    pub async fn write(
        &mut self,
        samples: &[i16],
        audio_start_sec: f64,
    ) -> Result<Option<mte_core::AudioChunk>, ChunkRecorderError> {
        if self.current_file.is_none() {
            self.current_chunk_start_sec.get_or_insert(audio_start_sec);
        }
        self.ensure_open().await?;
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        if let Some(file) = self.current_file.as_mut() {
            file.write_all(&bytes).await?;
        }
        self.current_samples += samples.len() as u64;
        self.current_bytes += bytes.len() as u64;

        let chunk_samples = (self.chunk_duration_sec * f64::from(SAMPLE_RATE)) as u64;
        if self.current_samples >= chunk_samples {
            return self.roll_over().await.map(Some);
        }
        Ok(None)
    }

    async fn roll_over(&mut self) -> Result<mte_core::AudioChunk, ChunkRecorderError> {
        let path = self.chunk_path(self.current_seq);
        if let Some(mut file) = self.current_file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        let chunk = mte_core::AudioChunk {
            meeting_id: self.meeting_id.clone(),
            seq: self.current_seq,
            started_at_sec: self.current_chunk_start_sec.unwrap_or(0.0),
            path: path.to_string_lossy().into_owned(),
            byte_count: self.current_bytes,
        };
        self.current_seq += 1;
        self.current_samples = 0;
        self.current_bytes = 0;
        self.current_chunk_start_sec = None;
        Ok(chunk)
    }

    /// Flushes and fsyncs the current chunk, then releases the write lease.
    /// Called on session teardown; does not delete any files. Returns the
    /// final partial chunk's metadata, if any audio was written to it.
    pub async fn close(mut self) -> Result<Option<mte_core::AudioChunk>, ChunkRecorderError> {
        let chunk = if self.current_file.is_some() {
            let path = self.chunk_path(self.current_seq);
            if let Some(mut file) = self.current_file.take() {
                file.flush().await?;
                file.sync_all().await?;
            }
            Some(mte_core::AudioChunk {
                meeting_id: self.meeting_id.clone(),
                seq: self.current_seq,
                started_at_sec: self.current_chunk_start_sec.unwrap_or(0.0),
                path: path.to_string_lossy().into_owned(),
                byte_count: self.current_bytes,
            })
        } else {
            None
        };
        self.registry.release(&self.meeting_id);
        Ok(chunk)
    }

    /// Reads all chunk files for `meeting_id` in sequence order and writes a
    /// single mono 16-bit 16kHz WAV to `<data_root>/<meeting_id>/merged.wav`.
    ///
    /// Runs the WAV encode on a blocking thread since `hound` is synchronous.
    pub async fn merge_to_wav(
        data_root: &Path,
        meeting_id: &str,
    ) -> Result<PathBuf, ChunkRecorderError> {
        let dir = data_root.join(meeting_id);
        let mut entries = fs::read_dir(&dir).await?;
        let mut chunk_paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("pcm") {
                chunk_paths.push(path);
            }
        }
        chunk_paths.sort();

        let mut pcm = Vec::new();
        for path in &chunk_paths {
            pcm.extend(fs::read(path).await?);
        }

        let out_path = dir.join("merged.wav");
        let out_path_clone = out_path.clone();
        tokio::task::spawn_blocking(move || write_wav(&out_path_clone, &pcm))
            .await
            .map_err(|e| ChunkRecorderError::Wav(e.to_string()))??;
        Ok(out_path)
    }
}

fn write_wav(path: &Path, pcm_bytes: &[u8]) -> Result<(), ChunkRecorderError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| ChunkRecorderError::Wav(e.to_string()))?;
    for chunk in pcm_bytes.chunks_exact(BYTES_PER_SAMPLE as usize) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        writer.write_sample(sample).map_err(|e| ChunkRecorderError::Wav(e.to_string()))?;
    }
    writer.finalize().map_err(|e| ChunkRecorderError::Wav(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_recorder_on_same_meeting_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LeaseRegistry::default();
        let first = ChunkRecorder::start(dir.path(), "m1", 30.0, registry.clone()).await.unwrap();
        let second = ChunkRecorder::start(dir.path(), "m1", 30.0, registry.clone()).await;
        assert!(matches!(second, Err(ChunkRecorderError::LeaseHeld(_))));
        first.close().await.unwrap();
        // Lease released, a new recorder can now start.
        let third = ChunkRecorder::start(dir.path(), "m1", 30.0, registry).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn write_then_merge_round_trips_sample_count() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LeaseRegistry::default();
        let mut recorder =
            ChunkRecorder::start(dir.path(), "m2", 1.0, registry.clone()).await.unwrap();
        recorder.write(&vec![100i16; 8_000], 0.0).await.unwrap();
        recorder.write(&vec![200i16; 8_000], 0.5).await.unwrap();
        recorder.close().await.unwrap();

        let wav_path = ChunkRecorder::merge_to_wav(dir.path(), "m2").await.unwrap();
        let reader = hound::WavReader::open(&wav_path).unwrap();
        assert_eq!(reader.len(), 16_000);
    }

    #[tokio::test]
    async fn write_returns_chunk_metadata_on_rollover() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LeaseRegistry::default();
        let mut recorder =
            ChunkRecorder::start(dir.path(), "m3", 1.0, registry.clone()).await.unwrap();
        assert!(recorder.write(&vec![0i16; 8_000], 0.0).await.unwrap().is_none());
        let chunk = recorder.write(&vec![0i16; 8_000], 0.5).await.unwrap().unwrap();
        assert_eq!(chunk.seq, 0);
        assert!((chunk.started_at_sec - 0.0).abs() < f64::EPSILON);
        assert_eq!(chunk.byte_count, 32_000);

        let final_chunk = recorder.close().await.unwrap();
        assert!(final_chunk.is_none());
    }

    #[tokio::test]
    async fn assign_meeting_id_renames_the_recording_directory() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LeaseRegistry::default();
        let mut recorder =
            ChunkRecorder::start(dir.path(), "session-abc", 30.0, registry.clone()).await.unwrap();
        recorder.write(&vec![0i16; 100], 0.0).await.unwrap();
        recorder.assign_meeting_id("meeting-123").await.unwrap();
        recorder.close().await.unwrap();

        assert!(!dir.path().join("session-abc").exists());
        assert!(dir.path().join("meeting-123").exists());
        // Lease for the old id is released, a new recorder can reuse it.
        let reused = ChunkRecorder::start(dir.path(), "session-abc", 30.0, registry).await;
        assert!(reused.is_ok());
    }
}
