// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Per-session tuning, mirroring the engine's own `DynamicEngineConfig` in
//! spirit: a small config struct the caller (`mte-server`) builds from its
//! layered `Config` and passes in at session creation time.

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub window_sec: f64,
    pub overlap_sec: f64,
    pub max_window_sec: f64,
    pub silence_commit_sec: f64,
    pub punctuation_stall_sec: f64,
    /// Number of consecutive *repeats* of the same partial text, after the
    /// first sighting, before forcing a commit (so a streak of 4 identical
    /// outputs fires at the default of 3).
    pub stable_partial_count: u32,
    pub max_audio_queue: usize,
    pub heartbeat_timeout_sec: f64,
    pub session_linger_sec: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_sec: 12.0,
            overlap_sec: 1.5,
            max_window_sec: 15.0,
            silence_commit_sec: 1.2,
            punctuation_stall_sec: 3.0,
            stable_partial_count: 3,
            max_audio_queue: 10,
            heartbeat_timeout_sec: 15.0,
            session_linger_sec: 120.0,
        }
    }
}
