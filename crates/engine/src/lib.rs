// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! engine: the audio processing components a streaming transcription session
//! is built from.
//!
//! - [`vad`]: 3-tier voice activity detection.
//! - [`rolling_buffer`]: the sliding PCM16 window fed to `StreamingAsr`.
//! - [`deduper`]: suppresses repeats arising from the rolling window's overlap.
//! - [`chunk_recorder`]: persists raw audio to disk for post-processing.
//! - [`alignment`]: fuses `AccurateAsr` + `DiarizingAsr` output post-meeting.

pub mod alignment;
pub mod chunk_recorder;
pub mod constants;
pub mod deduper;
pub mod rolling_buffer;
pub mod vad;

pub use alignment::{align, AlignmentError};
pub use chunk_recorder::{ChunkRecorder, ChunkRecorderError, LeaseRegistry};
pub use deduper::{DedupeOutcome, Deduper, DeduperConfig};
pub use rolling_buffer::{RollingBuffer, RollingBufferConfig, RollingBufferError};
pub use vad::{EnergyVad, HiVadFactory, MlVadFactory, Vad, VadDecision, VadDetector, VadError, VadTier};
