// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

#[derive(Debug, Clone)]
pub struct PostProcessConfig {
    pub data_root: std::path::PathBuf,
    /// Attempts per recognizer before giving up (3, per-recognizer, independent).
    pub max_attempts: u32,
    pub initial_backoff_sec: f64,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            data_root: std::path::PathBuf::from("data"),
            max_attempts: 3,
            initial_backoff_sec: 1.0,
        }
    }
}
