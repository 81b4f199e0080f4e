// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Default tuning values for the streaming engine's internal components.
//!
//! These back `RollingBufferConfig::default`, `DeduperConfig::default`, etc.;
//! `mte-server`'s layered `Config` overrides them per-deployment.

/// Samples per second for all PCM16 audio handled by this crate.
pub const SAMPLE_RATE: u32 = 16_000;

/// `RollingBuffer` window length before a smart trigger forces a commit.
pub const DEFAULT_WINDOW_SEC: f64 = 12.0;

/// `RollingBuffer` trailing overlap kept after a slide, to avoid a hard cut mid-word.
pub const DEFAULT_OVERLAP_SEC: f64 = 1.5;

/// `RollingBuffer` hard ceiling; exceeding it drops the oldest samples.
pub const DEFAULT_MAX_WINDOW_SEC: f64 = 15.0;

/// Seconds of continuous silence that triggers an early window commit.
pub const DEFAULT_SILENCE_COMMIT_SEC: f64 = 1.2;

/// Seconds of stalled-but-unterminated speech (trailing punctuation) before
/// forcing a commit anyway.
pub const DEFAULT_PUNCTUATION_STALL_SEC: f64 = 3.0;

/// `ChunkRecorder` chunk rollover interval.
pub const DEFAULT_CHUNK_DURATION_SEC: f64 = 30.0;

/// `AlignmentEngine` Tier 1 accept threshold.
pub const ALIGNMENT_TIER1_ACCEPT: f64 = 0.6;

/// `AlignmentEngine` Tier 2 accept threshold.
pub const ALIGNMENT_TIER2_ACCEPT: f64 = 0.7;

/// Minimum fraction of a text segment's duration two distinct speakers must
/// each cover for the segment to be flagged `Overlap`.
pub const ALIGNMENT_OVERLAP_SPEAKER_FRACTION: f64 = 0.3;

/// `VersionStore` auto-promotion threshold on a diarized version's `avg_confidence`.
pub const AUTO_PROMOTE_MIN_AVG_CONFIDENCE: f64 = 0.75;

/// `VersionStore` auto-promotion word-count drift tolerance vs. the latest live version.
pub const AUTO_PROMOTE_MAX_WORD_COUNT_DRIFT: f64 = 0.05;

/// Default bound on the per-session inbound audio queue; beyond this the
/// oldest queued frame is dropped rather than applying backpressure to the
/// socket read loop.
pub const DEFAULT_MAX_AUDIO_QUEUE: usize = 10;

/// Default size of the bounded `StreamingAsr` worker pool shared by all sessions.
pub const DEFAULT_ASR_WORKER_POOL: usize = 2;
