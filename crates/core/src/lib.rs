// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Core domain types and error/state scaffolding for the meeting
//! transcription engine.
//!
//! ## Modules
//!
//! - [`types`]: domain entities (Meeting, `AudioChunk`, `TranscriptVersion`, ...)
//!   and the shapes exchanged with external recognizers (`TextSegment`, `SpeakerSegment`).
//! - [`state`]: the session state machine and emission helpers.
//! - [`error`]: crate-wide error type for code that doesn't own a narrower one.

pub mod error;
pub mod state;
pub mod types;

pub use error::EngineError;
pub use state::{state_helpers, CloseReason, SessionState, SessionStateUpdate};
pub use types::{
    AlignmentMetrics, AlignmentMethod, AlignmentState, AudioChunk, DiarizationStatus, Meeting,
    SpeakerMapping, SpeakerSegment, StreamingAsrOutput, TextSegment, TranscriptSegment,
    TranscriptVersion, VersionSource,
};
