// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::Level;

const fn default_max_body_size() -> usize {
    100 * 1024 * 1024
}

fn default_cors_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "https://localhost".to_string(),
        "http://localhost:*".to_string(),
        "https://localhost:*".to_string(),
        "http://127.0.0.1".to_string(),
        "https://127.0.0.1".to_string(),
        "http://127.0.0.1:*".to_string(),
        "https://127.0.0.1:*".to_string(),
    ]
}

/// CORS configuration for cross-origin requests.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct CorsConfig {
    #[serde(default = "default_cors_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { allowed_origins: default_cors_allowed_origins() }
    }
}

/// HTTP/WebSocket server bind settings.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ServerConfig {
    pub address: String,
    /// Maximum request body size in bytes (default: 100MB).
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:4545".to_string(),
            max_body_size: default_max_body_size(),
            cors: CorsConfig::default(),
        }
    }
}

/// Per-session smart-trigger and backpressure tuning, mirrored from
/// `mte_session::SessionConfig`'s own defaults.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct SessionConfig {
    pub window_sec: f64,
    pub overlap_sec: f64,
    pub max_window_sec: f64,
    pub silence_commit_sec: f64,
    pub punctuation_stall_sec: f64,
    pub stable_partial_count: u32,
    pub max_audio_queue: usize,
    pub heartbeat_timeout_sec: f64,
    pub session_linger_sec: f64,
    /// Number of concurrent `StreamingAsr::transcribe` calls allowed
    /// across all sessions.
    pub asr_worker_pool: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let inner = mte_session::SessionConfig::default();
        Self {
            window_sec: inner.window_sec,
            overlap_sec: inner.overlap_sec,
            max_window_sec: inner.max_window_sec,
            silence_commit_sec: inner.silence_commit_sec,
            punctuation_stall_sec: inner.punctuation_stall_sec,
            stable_partial_count: inner.stable_partial_count,
            max_audio_queue: inner.max_audio_queue,
            heartbeat_timeout_sec: inner.heartbeat_timeout_sec,
            session_linger_sec: inner.session_linger_sec,
            asr_worker_pool: 2,
        }
    }
}

impl From<&SessionConfig> for mte_session::SessionConfig {
    fn from(c: &SessionConfig) -> Self {
        Self {
            window_sec: c.window_sec,
            overlap_sec: c.overlap_sec,
            max_window_sec: c.max_window_sec,
            silence_commit_sec: c.silence_commit_sec,
            punctuation_stall_sec: c.punctuation_stall_sec,
            stable_partial_count: c.stable_partial_count,
            max_audio_queue: c.max_audio_queue,
            heartbeat_timeout_sec: c.heartbeat_timeout_sec,
            session_linger_sec: c.session_linger_sec,
        }
    }
}

/// Chunked PCM recording configuration.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct RecordingConfig {
    pub chunk_duration_sec: f64,
    pub data_root: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self { chunk_duration_sec: 30.0, data_root: "./data".to_string() }
    }
}

/// `AlignmentEngine` tuning.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct AlignmentConfig {
    pub alignment_overlap_threshold: f64,
    pub alignment_density_threshold: f64,
    pub auto_promote_avg_conf: f64,
    pub max_segment_gap_eps_ms: u64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            alignment_overlap_threshold: 0.6,
            alignment_density_threshold: 0.7,
            auto_promote_avg_conf: 0.75,
            max_segment_gap_eps_ms: 100,
        }
    }
}

/// Log level for filtering messages.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Log file format options.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration for console and file output.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct LogConfig {
    #[serde(default)]
    pub console_enable: bool,
    #[serde(default)]
    pub file_enable: bool,
    #[serde(default)]
    pub console_level: LogLevel,
    #[serde(default)]
    pub file_level: LogLevel,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub file_format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enable: true,
            file_enable: true,
            console_level: LogLevel::default(),
            file_level: LogLevel::Info,
            file_path: "./mte.log".to_string(),
            file_format: LogFormat::default(),
        }
    }
}

const fn default_true() -> bool {
    true
}

/// Telemetry and observability configuration (OpenTelemetry, tokio-console).
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default)]
    pub tracing_enable: bool,
    pub otlp_endpoint: Option<String>,
    pub otlp_traces_endpoint: Option<String>,
    #[serde(default)]
    pub otlp_headers: HashMap<String, String>,
    #[serde(default)]
    pub tokio_console: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable: true,
            tracing_enable: false,
            otlp_endpoint: None,
            otlp_traces_endpoint: None,
            otlp_headers: HashMap::new(),
            tokio_console: false,
        }
    }
}

fn default_database_url() -> String {
    "sqlite://./data/mte.db".to_string()
}

/// Root configuration for the meeting transcription engine's server.
#[derive(Deserialize, Serialize, Default, Debug, Clone, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub recording: RecordingConfig,

    #[serde(default)]
    pub alignment: AlignmentConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default = "default_database_url")]
    pub database_url: String,
}

#[derive(Debug)]
pub struct ConfigLoadResult {
    pub config: Config,
    pub file_missing: Option<String>,
}

/// Loads the application configuration from defaults, a TOML file, and
/// `MTE_`-prefixed environment variables (double underscore as the
/// nesting separator, e.g. `MTE_SESSION__WINDOW_SEC=10`).
///
/// # Errors
///
/// Returns an error if the configuration file contains invalid TOML, or if
/// an environment variable holds a value that doesn't match its field's type.
pub fn load(config_path: &str) -> Result<ConfigLoadResult, Box<figment::Error>> {
    let mut figment =
        Figment::new().merge(figment::providers::Serialized::defaults(Config::default()));

    let mut file_missing = None;
    if std::path::Path::new(config_path).exists() {
        figment = figment.merge(Toml::file(config_path));
    } else {
        file_missing = Some(config_path.to_string());
    }

    let config: Config =
        figment.merge(Env::prefixed("MTE_").split("__")).extract().map_err(Box::new)?;

    Ok(ConfigLoadResult { config, file_missing })
}

/// Generates the default configuration as a pretty-printed TOML string.
///
/// # Errors
/// Returns an error if the default configuration cannot be serialized to TOML.
pub fn generate_default() -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&Config::default())
}
