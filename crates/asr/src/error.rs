// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use thiserror::Error;

/// Error returned by a `StreamingAsr`, `AccurateAsr`, or `DiarizingAsr` backend.
///
/// The `Transient`/`Permanent` split lets callers (the `Session` worker pool,
/// `PostProcessor`) apply a uniform retry policy without inspecting backend
/// internals.
#[derive(Debug, Error)]
pub enum AsrError {
    /// Worth retrying with backoff (timeout, backend momentarily unavailable).
    #[error("transient ASR error: {0}")]
    Transient(String),

    /// Not worth retrying (bad audio, backend rejected the request outright).
    #[error("permanent ASR error: {0}")]
    Permanent(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AsrError {
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
