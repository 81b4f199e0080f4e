// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PostProcessError {
    #[error("merging chunk recordings to WAV: {0}")]
    Merge(#[from] mte_engine::ChunkRecorderError),

    #[error("accurate transcription failed after retries: {0}")]
    AccurateAsr(String),

    #[error("diarization failed after retries: {0}")]
    Diarization(String),

    #[error("alignment failed: {0}")]
    Alignment(#[from] mte_engine::AlignmentError),

    #[error("version store error: {0}")]
    Store(#[from] mte_store::VersionStoreError),
}
