// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The `/ws/streaming-audio` wire protocol. Binary frames carry audio; text
//! frames carry JSON control/event messages in both directions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A binary audio frame: an `f64` LE timestamp followed by LE i16 PCM @16kHz mono.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub audio_start_sec: f64,
    pub samples: Vec<i16>,
}

#[derive(Debug, Error)]
pub enum FrameDecodeError {
    #[error("frame too short: got {got} bytes, need at least 8 for the timestamp header")]
    TooShort { got: usize },
    #[error("payload length {payload_len} is not a multiple of 2 (i16 samples)")]
    MisalignedPayload { payload_len: usize },
}

impl AudioFrame {
    /// Decodes `[f64 LE audio_start_sec][i16 LE PCM]`.
    ///
    /// # Errors
    /// Returns [`FrameDecodeError`] if the frame is too short or its payload
    /// isn't a whole number of i16 samples.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameDecodeError> {
        if bytes.len() < 8 {
            return Err(FrameDecodeError::TooShort { got: bytes.len() });
        }
        let audio_start_sec = f64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let payload = &bytes[8..];
        if payload.len() % 2 != 0 {
            return Err(FrameDecodeError::MisalignedPayload { payload_len: payload.len() });
        }
        let samples = payload.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect();
        Ok(Self { audio_start_sec, samples })
    }
}

/// Text JSON message sent by the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
}

/// Text JSON message sent by the server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        session_id: String,
    },
    Partial {
        text: String,
        confidence: f32,
        is_stable: bool,
    },
    Final {
        text: String,
        confidence: f32,
        reason: String,
        audio_start_time: f64,
        audio_end_time: f64,
        duration: f64,
    },
    Error {
        code: String,
        message: String,
    },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_round_trips_timestamp_and_samples() {
        let mut bytes = 1.5f64.to_le_bytes().to_vec();
        bytes.extend_from_slice(&100i16.to_le_bytes());
        bytes.extend_from_slice(&(-200i16).to_le_bytes());
        let frame = AudioFrame::decode(&bytes).unwrap();
        assert!((frame.audio_start_sec - 1.5).abs() < 1e-12);
        assert_eq!(frame.samples, vec![100, -200]);
    }

    #[test]
    fn decode_rejects_short_frame() {
        assert!(matches!(AudioFrame::decode(&[0; 4]), Err(FrameDecodeError::TooShort { got: 4 })));
    }

    #[test]
    fn decode_rejects_misaligned_payload() {
        let mut bytes = 0.0f64.to_le_bytes().to_vec();
        bytes.push(0);
        assert!(matches!(
            AudioFrame::decode(&bytes),
            Err(FrameDecodeError::MisalignedPayload { payload_len: 1 })
        ));
    }

    #[test]
    fn connected_message_serializes_with_tagged_type() {
        let msg = ServerMessage::Connected { session_id: "abc".to_string() };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["session_id"], "abc");
    }
}
