// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The `/ws/streaming-audio` handler: upgrades the connection, spawns or
//! resumes a [`mte_session::Session`], and pumps binary audio frames and JSON
//! control messages in, [`mte_session::ServerMessage`] events out.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use opentelemetry::{global, KeyValue};
use serde::Deserialize;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use mte_engine::{ChunkRecorder, ChunkRecorderError, Vad};
use mte_session::{AudioFrame, ClientMessage, FrameDecodeError, Session, ServerMessage};

use crate::state::AppState;

const ENERGY_VAD_THRESHOLD: f32 = 0.02;

static ACTIVE_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

#[derive(Debug, Deserialize)]
pub struct WsParams {
    session_id: Option<String>,
    #[allow(dead_code)] // carried through for the out-of-scope external meeting-creation path
    user_email: Option<String>,
}

#[derive(Clone)]
struct WsMetrics {
    connections_gauge: opentelemetry::metrics::Gauge<u64>,
    frames_counter: opentelemetry::metrics::Counter<u64>,
    errors_counter: opentelemetry::metrics::Counter<u64>,
}

impl WsMetrics {
    fn shared() -> Self {
        static METRICS: OnceLock<WsMetrics> = OnceLock::new();
        METRICS
            .get_or_init(|| {
                let meter = global::meter("mte_websocket");
                Self {
                    connections_gauge: meter
                        .u64_gauge("websocket.connections.active")
                        .with_description("Number of active streaming-audio connections")
                        .build(),
                    frames_counter: meter
                        .u64_counter("websocket.audio_frames")
                        .with_description("Total audio frames received")
                        .build(),
                    errors_counter: meter
                        .u64_counter("websocket.errors")
                        .with_description("WebSocket errors")
                        .build(),
                }
            })
            .clone()
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

async fn spawn_new_session(
    state: &AppState,
    preferred_id: Option<String>,
) -> Result<Session, ChunkRecorderError> {
    let id = preferred_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let meeting_id = id.clone();

    let data_root = std::path::Path::new(&state.config.recording.data_root);
    let chunk_recorder = ChunkRecorder::start(
        data_root,
        &meeting_id,
        state.config.recording.chunk_duration_sec,
        state.chunk_lease_registry.clone(),
    )
    .await?;

    let vad = Vad::new(None, None, ENERGY_VAD_THRESHOLD);
    let (state_tx, mut state_rx) = mpsc::channel(16);
    let session_id_for_log = id.clone();
    tokio::spawn(async move {
        while let Some(update) = state_rx.recv().await {
            tracing::debug!(
                session_id = %session_id_for_log,
                state = ?update.state,
                "session state transition"
            );
        }
    });

    let session = Session::spawn(
        id,
        Some(meeting_id),
        (&state.config.session).into(),
        vad,
        Arc::clone(&state.streaming_asr),
        Arc::clone(&state.asr_semaphore),
        Some(chunk_recorder),
        state.store.clone(),
        state_tx,
    );
    state.session_manager.add_session(session.clone()).await;
    Ok(session)
}

fn record_active_connections(metrics: &WsMetrics, delta: i64) {
    let active = ACTIVE_CONNECTIONS.fetch_add(delta, Ordering::Relaxed) + delta;
    metrics.connections_gauge.record(u64::try_from(active.max(0)).unwrap_or(0), &[]);
}

#[allow(clippy::cognitive_complexity)]
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, params: WsParams) {
    let metrics = WsMetrics::shared();
    record_active_connections(&metrics, 1);

    let resumed = match params.session_id.as_deref() {
        Some(id) => state.session_manager.resume(id).await,
        None => None,
    };

    let session = match resumed {
        Some(session) => session,
        None => match spawn_new_session(&state, params.session_id.clone()).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "failed to start streaming-audio session");
                let error_msg = ServerMessage::Error {
                    code: "session_unavailable".to_string(),
                    message: e.to_string(),
                };
                let _ = send_json(&mut socket, &error_msg).await;
                let _ = socket.send(Message::Close(None)).await;
                record_active_connections(&metrics, -1);
                return;
            },
        },
    };

    info!(session_id = %session.id, "streaming-audio connection established");
    let connected = ServerMessage::Connected { session_id: session.id.clone() };
    if send_json(&mut socket, &connected).await.is_err() {
        state.session_manager.mark_disconnected(&session.id).await;
        record_active_connections(&metrics, -1);
        return;
    }

    let mut events_rx = session.subscribe();
    let heartbeat_timeout = Duration::from_secs_f64(state.config.session.heartbeat_timeout_sec);
    let mut deadline = Instant::now() + heartbeat_timeout;
    let mut explicit_close = false;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                match msg {
                    Ok(Message::Binary(data)) => {
                        deadline = Instant::now() + heartbeat_timeout;
                        metrics.frames_counter.add(1, &[]);
                        match AudioFrame::decode(&data) {
                            Ok(frame) => session.push_frame(frame),
                            Err(FrameDecodeError::TooShort { got }) => {
                                metrics.errors_counter.add(1, &[KeyValue::new("error_type", "too_short")]);
                                warn!(session_id = %session.id, got, "rejected undersized audio frame");
                            },
                            Err(FrameDecodeError::MisalignedPayload { payload_len }) => {
                                metrics.errors_counter.add(1, &[KeyValue::new("error_type", "misaligned")]);
                                warn!(session_id = %session.id, payload_len, "rejected misaligned audio frame");
                            },
                        }
                    },
                    Ok(Message::Text(text)) => {
                        deadline = Instant::now() + heartbeat_timeout;
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Ping) => {
                                let _ = send_json(&mut socket, &ServerMessage::Pong).await;
                            },
                            Err(e) => {
                                warn!(session_id = %session.id, error = %e, "failed to parse client message");
                            },
                        }
                    },
                    Ok(Message::Close(_)) => {
                        explicit_close = true;
                        break;
                    },
                    Ok(_) => {},
                    Err(e) => {
                        warn!(session_id = %session.id, error = %e, "websocket error");
                        metrics.errors_counter.add(1, &[KeyValue::new("error_type", "socket_error")]);
                        break;
                    },
                }
            },
            event = events_rx.recv() => {
                match event {
                    Ok(event) => {
                        if send_json(&mut socket, &event).await.is_err() {
                            break;
                        }
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(session_id = %session.id, skipped, "event receiver lagged, dropping events");
                    },
                    Err(RecvError::Closed) => break,
                }
            },
            () = tokio::time::sleep_until(deadline) => {
                warn!(session_id = %session.id, "heartbeat timeout, closing connection");
                let _ = socket.send(Message::Close(None)).await;
                break;
            },
        }
    }

    if explicit_close {
        state.session_manager.remove_and_close(&session.id).await;
    } else {
        state.session_manager.mark_disconnected(&session.id).await;
    }
    record_active_connections(&metrics, -1);
    info!(session_id = %session.id, "streaming-audio connection terminated");
}

async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, msg: &T) -> Result<(), ()> {
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}
