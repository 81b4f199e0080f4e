// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} was evicted")]
    Evicted(String),
    #[error("invalid audio frame: {0}")]
    InvalidFrame(String),
    #[error("session {0} not found")]
    NotFound(String),
    #[error("a session with name '{0}' already exists")]
    DuplicateName(String),
}
