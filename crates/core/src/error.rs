// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for the transcription engine.
//!
//! This module provides a hierarchy of error types for better error handling
//! and programmatic error inspection. All errors implement `Display` and can
//! be converted to/from `String` for backward compatibility.

use thiserror::Error;

/// Main error type for engine-wide operations that don't belong to a single
/// component's own error enum (see `mte_engine::VadError`, `AsrError`, etc.).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration or parameter validation error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Runtime processing error during normal operation.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Network-related error (sockets, HTTP, WebSocket, etc.).
    #[error("Network error: {0}")]
    Network(String),

    /// I/O error (file operations, device access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource exhaustion or limit exceeded.
    #[error("Resource exhaustion: {0}")]
    ResourceExhausted(String),
}

/// Convenience type alias for Results using `EngineError`.
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<EngineError> for String {
    fn from(err: EngineError) -> Self {
        err.to_string()
    }
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        Self::Runtime(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        Self::Runtime(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::Configuration("invalid sample rate".to_string());
        assert_eq!(err.to_string(), "Configuration error: invalid sample rate");

        let err = EngineError::Network("connection timeout".to_string());
        assert_eq!(err.to_string(), "Network error: connection timeout");
    }

    #[test]
    fn test_error_to_string_conversion() {
        let err = EngineError::Runtime("processing failed".to_string());
        let s: String = err.into();
        assert_eq!(s, "Runtime error: processing failed");
    }

    #[test]
    fn test_string_to_error_conversion() {
        let err: EngineError = "something went wrong".into();
        assert_eq!(err.to_string(), "Runtime error: something went wrong");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EngineError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("file not found"));
    }
}
