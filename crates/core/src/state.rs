// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Session state management and lifecycle tracking.
//!
//! This module defines the state machine a streaming transcription [`Session`]
//! moves through, and helper functions for emitting state updates.
//!
//! ## State Machine
//!
//! ```text
//!       Idle
//!         ↓
//!     Connected
//!         ↓
//!     Streaming ←──┐
//!         ↓        │ ping / trigger fires
//!     Draining  ───┘
//!         ↓
//!      Closed
//! ```
//!
//! [`Session`]: https://docs.rs/mte-session

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Why a session transitioned into [`SessionState::Closed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Client sent a WebSocket close frame.
    ClientClosed,
    /// No frame or ping arrived within the heartbeat timeout.
    HeartbeatTimeout,
    /// A write to the socket failed.
    SocketError,
    /// The session was evicted after sitting idle past `session_linger_sec`.
    Evicted,
    /// Shutdown was requested (server-side, e.g. process termination).
    Shutdown,
}

/// Runtime state of a streaming transcription session.
///
/// ### Valid transitions
/// - `Idle` → `Connected` (WebSocket accepted, `connected` message sent)
/// - `Connected` → `Streaming` (first audio frame received)
/// - `Streaming` → `Streaming` (trigger fires, buffer slides; heartbeat ping resets deadline)
/// - `Streaming` → `Draining` (heartbeat missed, socket closed, or shutdown requested)
/// - `Draining` → `Closed` (final flush complete, recorder closed)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionState {
    /// WebSocket accepted, handshake not yet acknowledged to the client.
    Idle,
    /// `{"type":"connected", ...}` has been sent to the client.
    Connected,
    /// Audio is flowing; triggers are being evaluated.
    Streaming,
    /// No longer accepting new frames; performing final flush.
    Draining { reason: CloseReason },
    /// All resources released.
    Closed { reason: CloseReason },
}

/// A state update message sent by a session to report its current state.
#[derive(Debug, Clone)]
pub struct SessionStateUpdate {
    pub session_id: String,
    pub state: SessionState,
    pub timestamp: SystemTime,
}

impl SessionStateUpdate {
    #[inline]
    pub fn new(session_id: String, state: SessionState) -> Self {
        Self { session_id, state, timestamp: SystemTime::now() }
    }
}

/// Helper functions for emitting session state updates.
///
/// These reduce boilerplate at the call sites that report state transitions
/// to an observer channel; failures are silently ignored since state
/// reporting is best-effort and must never block the processor task.
pub mod state_helpers {
    use super::{CloseReason, SessionState, SessionStateUpdate};
    use tokio::sync::mpsc;

    #[inline]
    pub fn emit_state(
        state_tx: &mpsc::Sender<SessionStateUpdate>,
        session_id: &str,
        state: SessionState,
    ) {
        let _ = state_tx.try_send(SessionStateUpdate::new(session_id.to_string(), state));
    }

    #[inline]
    pub fn emit_connected(state_tx: &mpsc::Sender<SessionStateUpdate>, session_id: &str) {
        emit_state(state_tx, session_id, SessionState::Connected);
    }

    #[inline]
    pub fn emit_streaming(state_tx: &mpsc::Sender<SessionStateUpdate>, session_id: &str) {
        emit_state(state_tx, session_id, SessionState::Streaming);
    }

    #[inline]
    pub fn emit_draining(
        state_tx: &mpsc::Sender<SessionStateUpdate>,
        session_id: &str,
        reason: CloseReason,
    ) {
        emit_state(state_tx, session_id, SessionState::Draining { reason });
    }

    #[inline]
    pub fn emit_closed(
        state_tx: &mpsc::Sender<SessionStateUpdate>,
        session_id: &str,
        reason: CloseReason,
    ) {
        emit_state(state_tx, session_id, SessionState::Closed { reason });
    }
}
