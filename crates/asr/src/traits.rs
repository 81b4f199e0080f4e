// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The three external recognizer interfaces the engine depends on. Production
//! implementations (wrapping a local model or a remote recognition service)
//! are injected by the deployment; this crate only defines the contract plus
//! deterministic mocks for testing (see [`mock`](crate::mock)).

use async_trait::async_trait;
use mte_core::{SpeakerSegment, StreamingAsrOutput, TextSegment};
use std::path::Path;

use crate::error::AsrError;

/// Fast, cheap speech-to-text over a short buffer of 16kHz mono PCM. Used by
/// `Session` on every smart-trigger firing; must complete well under the
/// 8 second per-call timeout the session enforces.
#[async_trait]
pub trait StreamingAsr: Send + Sync {
    /// `context_hint` is the tail of the previously committed text, offered
    /// to backends that can use it to bias decoding across the rolling
    /// window's overlap.
    async fn transcribe(
        &self,
        pcm16k_mono: &[i16],
        context_hint: &str,
    ) -> Result<StreamingAsrOutput, AsrError>;
}

/// Slower, higher-accuracy speech-to-text over a full meeting recording. Used
/// once per meeting by `PostProcessor`.
#[async_trait]
pub trait AccurateAsr: Send + Sync {
    async fn transcribe_file(&self, wav_path: &Path) -> Result<Vec<TextSegment>, AsrError>;
}

/// Speaker diarization over a full meeting recording. Used once per meeting
/// by `PostProcessor`, in parallel with `AccurateAsr`.
#[async_trait]
pub trait DiarizingAsr: Send + Sync {
    async fn diarize(&self, wav_path: &Path) -> Result<Vec<SpeakerSegment>, AsrError>;
}
