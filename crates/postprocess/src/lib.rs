// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The post-meeting job that turns a meeting's recorded audio into a
//! speaker-attributed, diarized transcript version.

mod config;
mod error;
mod processor;

pub use config::PostProcessConfig;
pub use error::PostProcessError;
pub use processor::run;
