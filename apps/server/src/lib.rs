// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

pub mod cli;
pub mod config;
pub mod logging;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod websocket;

pub use config::Config;
