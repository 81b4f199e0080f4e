// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use clap::Parser;

mod cli;
mod config;
mod logging;
mod server;
mod state;
mod telemetry;
mod websocket;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    cli::handle_command(&cli, |log_config, telemetry_config| {
        logging::init_logging(log_config, telemetry_config)
    })
    .await;
}
