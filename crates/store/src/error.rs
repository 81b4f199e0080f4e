// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VersionStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("meeting {0} has no versions")]
    NotFound(String),
    #[error("version {version_num} did not meet auto-promote thresholds (avg_confidence={avg_confidence:.2}, word_count_drift={word_count_drift:.2})")]
    PromotionBlocked { version_num: u32, avg_confidence: f64, word_count_drift: f64 },
}

pub type Result<T> = std::result::Result<T, VersionStoreError>;
