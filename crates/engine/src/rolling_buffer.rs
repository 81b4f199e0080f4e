// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! A per-session sliding window over 16kHz mono PCM16 audio.
//!
//! Samples are appended as they arrive off the WebSocket; once a smart
//! trigger fires (evaluated by `Session`, not here), the caller takes a
//! [`RollingBuffer::snapshot`] to send to `StreamingAsr` and then
//! [`RollingBuffer::slide`]s, retaining only the trailing overlap so the next
//! ASR call has enough context to avoid a hard cut mid-word.

use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RollingBufferError {
    #[error("rolling buffer overflow: dropped {dropped} samples")]
    Overflow { dropped: usize },
}

#[derive(Debug, Clone)]
pub struct RollingBufferConfig {
    pub sample_rate: u32,
    pub window_sec: f64,
    pub overlap_sec: f64,
    pub max_window_sec: f64,
}

impl Default for RollingBufferConfig {
    fn default() -> Self {
        Self { sample_rate: 16_000, window_sec: 12.0, overlap_sec: 1.5, max_window_sec: 15.0 }
    }
}

/// Sliding PCM16 window referenced to a session's monotonic audio clock
/// (seconds since the client's recording start, per the binary frame
/// protocol's `audio_start_sec` field).
pub struct RollingBuffer {
    config: RollingBufferConfig,
    samples: VecDeque<i16>,
    /// `audio_start_sec` of the oldest retained sample.
    window_start_sec: f64,
    /// `audio_start_sec` just past the newest retained sample.
    window_end_sec: f64,
    dropped_samples: u64,
}

impl RollingBuffer {
    #[must_use]
    pub fn new(config: RollingBufferConfig) -> Self {
        Self {
            samples: VecDeque::new(),
            window_start_sec: 0.0,
            window_end_sec: 0.0,
            dropped_samples: 0,
            config,
        }
    }

    fn samples_to_sec(&self, n: usize) -> f64 {
        n as f64 / f64::from(self.config.sample_rate)
    }

    /// Appends samples whose first sample begins at `chunk_start_sec`. Drops
    /// the oldest samples (not the new ones) if appending would exceed
    /// `max_window_sec`, incrementing the drop counter rather than erroring -
    /// overflow is recoverable, never a reason to tear down the session.
    pub fn append(&mut self, samples: &[i16], chunk_start_sec: f64) -> Result<(), RollingBufferError> {
        if self.samples.is_empty() {
            self.window_start_sec = chunk_start_sec;
        }
        self.samples.extend(samples.iter().copied());
        self.window_end_sec = chunk_start_sec + self.samples_to_sec(samples.len());

        let max_samples =
            (self.config.max_window_sec * f64::from(self.config.sample_rate)) as usize;
        if self.samples.len() > max_samples {
            let excess = self.samples.len() - max_samples;
            for _ in 0..excess {
                self.samples.pop_front();
            }
            self.window_start_sec += self.samples_to_sec(excess);
            self.dropped_samples += excess as u64;
            return Err(RollingBufferError::Overflow { dropped: excess });
        }
        Ok(())
    }

    /// Current window length in seconds.
    #[must_use]
    pub fn duration_sec(&self) -> f64 {
        self.window_end_sec - self.window_start_sec
    }

    #[must_use]
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns a copy of the current window and the time range it covers.
    #[must_use]
    pub fn snapshot(&self) -> (Vec<i16>, f64, f64) {
        (self.samples.iter().copied().collect(), self.window_start_sec, self.window_end_sec)
    }

    /// Retains only the trailing `overlap_sec` of audio, discarding the rest.
    pub fn slide(&mut self) {
        let overlap_samples =
            (self.config.overlap_sec * f64::from(self.config.sample_rate)) as usize;
        if self.samples.len() <= overlap_samples {
            return;
        }
        let drop = self.samples.len() - overlap_samples;
        for _ in 0..drop {
            self.samples.pop_front();
        }
        self.window_start_sec += self.samples_to_sec(drop);
    }

    /// Returns all remaining samples and clears the buffer. Used on session
    /// teardown to flush whatever is left, even if under `window_sec`.
    pub fn drain(&mut self) -> (Vec<i16>, f64, f64) {
        let (samples, start, end) = self.snapshot();
        self.samples.clear();
        self.window_start_sec = end;
        (samples, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RollingBufferConfig {
        RollingBufferConfig { sample_rate: 16_000, window_sec: 1.0, overlap_sec: 0.25, max_window_sec: 1.25 }
    }

    #[test]
    fn append_and_snapshot_tracks_time_range() {
        let mut buf = RollingBuffer::new(cfg());
        buf.append(&vec![1; 16_000], 0.0).unwrap();
        let (samples, start, end) = buf.snapshot();
        assert_eq!(samples.len(), 16_000);
        assert!((start - 0.0).abs() < 1e-9);
        assert!((end - 1.0).abs() < 1e-9);
    }

    #[test]
    fn slide_retains_only_overlap() {
        let mut buf = RollingBuffer::new(cfg());
        buf.append(&vec![1; 16_000], 0.0).unwrap();
        buf.slide();
        let (samples, start, end) = buf.snapshot();
        assert_eq!(samples.len(), 4_000);
        assert!((start - 0.75).abs() < 1e-9);
        assert!((end - 1.0).abs() < 1e-9);
    }

    #[test]
    fn overflow_drops_oldest_and_reports_count() {
        let mut buf = RollingBuffer::new(cfg());
        buf.append(&vec![1; 16_000], 0.0).unwrap();
        let err = buf.append(&vec![2; 8_000], 1.0).unwrap_err();
        match err {
            RollingBufferError::Overflow { dropped } => assert_eq!(dropped, 4_000),
        }
        assert!(buf.duration_sec() <= 1.25 + 1e-9);
        assert_eq!(buf.dropped_samples(), 4_000);
    }

    #[test]
    fn drain_empties_the_buffer() {
        let mut buf = RollingBuffer::new(cfg());
        buf.append(&vec![1; 8_000], 0.0).unwrap();
        let (samples, ..) = buf.drain();
        assert_eq!(samples.len(), 8_000);
        assert!(buf.is_empty());
    }
}
