// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! External speech recognition and diarization interfaces.
//!
//! Production backends (wrapping a local model or a hosted recognition
//! service) live outside this crate and are wired in by the deployment via
//! `Arc<dyn StreamingAsr>` / `Arc<dyn AccurateAsr>` / `Arc<dyn DiarizingAsr>`.
//! See [`mock`] for deterministic test doubles.

pub mod error;
pub mod mock;
pub mod traits;

pub use error::AsrError;
pub use traits::{AccurateAsr, DiarizingAsr, StreamingAsr};
