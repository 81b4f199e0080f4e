// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Deterministic test doubles for the three recognizer traits. Not behind a
//! `#[cfg(test)]` gate because downstream crates (`mte-session`,
//! `mte-postprocess`) need them in their own test suites.

use async_trait::async_trait;
use mte_core::{SpeakerSegment, StreamingAsrOutput, TextSegment};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::error::AsrError;
use crate::traits::{AccurateAsr, DiarizingAsr, StreamingAsr};

/// Returns a fixed canned response on every call, optionally failing the
/// first `fail_n_times` calls with a transient error to exercise retry paths.
pub struct MockStreamingAsr {
    pub response: StreamingAsrOutput,
    pub fail_n_times: usize,
    calls: AtomicUsize,
}

impl MockStreamingAsr {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            response: StreamingAsrOutput {
                text: text.into(),
                confidence: 0.9,
                word_confidences: Vec::new(),
            },
            fail_n_times: 0,
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub const fn failing(mut self, n: usize) -> Self {
        self.fail_n_times = n;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamingAsr for MockStreamingAsr {
    async fn transcribe(
        &self,
        _pcm16k_mono: &[i16],
        _context_hint: &str,
    ) -> Result<StreamingAsrOutput, AsrError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_n_times {
            return Err(AsrError::Transient("mock streaming asr failure".into()));
        }
        Ok(self.response.clone())
    }
}

/// Returns a fixed sequence of text segments, regardless of the WAV path.
pub struct MockAccurateAsr {
    pub segments: Mutex<Vec<TextSegment>>,
}

impl MockAccurateAsr {
    #[must_use]
    pub fn new(segments: Vec<TextSegment>) -> Self {
        Self { segments: Mutex::new(segments) }
    }
}

#[async_trait]
impl AccurateAsr for MockAccurateAsr {
    async fn transcribe_file(&self, _wav_path: &Path) -> Result<Vec<TextSegment>, AsrError> {
        Ok(self.segments.lock().await.clone())
    }
}

/// Returns a fixed sequence of speaker segments, regardless of the WAV path.
pub struct MockDiarizingAsr {
    pub segments: Mutex<Vec<SpeakerSegment>>,
}

impl MockDiarizingAsr {
    #[must_use]
    pub fn new(segments: Vec<SpeakerSegment>) -> Self {
        Self { segments: Mutex::new(segments) }
    }
}

#[async_trait]
impl DiarizingAsr for MockDiarizingAsr {
    async fn diarize(&self, _wav_path: &Path) -> Result<Vec<SpeakerSegment>, AsrError> {
        Ok(self.segments.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn streaming_mock_retries_then_succeeds() {
        let mock = MockStreamingAsr::new("hello world").failing(2);
        assert!(mock.transcribe(&[], "").await.is_err());
        assert!(mock.transcribe(&[], "").await.is_err());
        let out = mock.transcribe(&[], "").await.expect("third call succeeds");
        assert_eq!(out.text, "hello world");
        assert_eq!(mock.call_count(), 3);
    }
}
