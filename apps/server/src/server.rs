// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use mte_asr::mock::{MockAccurateAsr, MockDiarizingAsr, MockStreamingAsr};
use mte_store::VersionStore;

use crate::config::{Config, CorsConfig};
use crate::state::AppState;
use crate::websocket::ws_handler;

/// Matches an `Origin` header against a configured allowlist entry, which may
/// end in `:*` to accept any port on an otherwise exact origin.
fn origin_matches_pattern(origin: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix_without_port) = pattern.strip_suffix(":*") {
        let Some(rest) = origin.strip_prefix(prefix_without_port) else { return false };
        let Some(port_str) = rest.strip_prefix(':') else { return false };
        return !port_str.is_empty() && port_str.chars().all(|c| c.is_ascii_digit());
    }
    origin == pattern
}

fn create_cors_layer(config: &CorsConfig) -> CorsLayer {
    if config.allowed_origins.iter().any(|o| o == "*") {
        info!("CORS configured to allow all origins (permissive mode)");
        return CorsLayer::permissive();
    }

    let origins = config.allowed_origins.clone();
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
        .allow_origin(tower_http::cors::AllowOrigin::predicate(
            move |origin: &HeaderValue, _| {
                origin
                    .to_str()
                    .map(|o| origins.iter().any(|p| origin_matches_pattern(o, p)))
                    .unwrap_or(false)
            },
        ))
}

async fn healthz_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = SystemTime::now().duration_since(state.started_at).unwrap_or_default();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_sec": uptime.as_secs(),
    }))
}

async fn readyz_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => Json(serde_json::json!({ "status": "ready" })).into_response(),
        Err(e) => {
            warn!(error = %e, "readiness probe failed: store unreachable");
            (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "status": "not_ready" })))
                .into_response()
        },
    }
}

/// Dumps the effective configuration, with OTLP header values redacted since
/// they commonly carry bearer tokens.
async fn config_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut config = (*state.config).clone();
    for value in config.telemetry.otlp_headers.values_mut() {
        *value = "[redacted]".to_string();
    }
    Json(config)
}

fn build_router(app_state: Arc<AppState>) -> Router {
    let cors_layer = create_cors_layer(&app_state.config.server.cors);

    Router::new()
        .route("/ws/streaming-audio", get(ws_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/api/v1/config", get(config_handler))
        .with_state(app_state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

/// Builds the default recognizer backends this crate ships with. Production
/// deployments wrap their own model or hosted recognition service behind the
/// same traits and substitute them here.
fn default_asr_backends() -> (
    Arc<dyn mte_asr::StreamingAsr>,
    Arc<dyn mte_asr::AccurateAsr>,
    Arc<dyn mte_asr::DiarizingAsr>,
) {
    (
        Arc::new(MockStreamingAsr::new("")),
        Arc::new(MockAccurateAsr::new(Vec::new())),
        Arc::new(MockDiarizingAsr::new(Vec::new())),
    )
}

/// Builds the shared `AppState` and Axum router from a loaded configuration.
///
/// # Errors
/// Returns an error if the `VersionStore` fails to open or migrate its
/// database.
pub async fn build_app(
    config: Config,
) -> Result<(Router, Arc<AppState>), Box<dyn std::error::Error>> {
    let store = VersionStore::connect(&config.database_url).await?;
    let (streaming_asr, accurate_asr, diarizing_asr) = default_asr_backends();
    let app_state = Arc::new(AppState::new(
        Arc::new(config),
        store,
        streaming_asr,
        accurate_asr,
        diarizing_asr,
    ));
    app_state.session_manager.spawn_eviction_sweeper(app_state.config.session.session_linger_sec);
    let router = build_router(Arc::clone(&app_state));
    Ok((router, app_state))
}

/// # Errors
/// Returns an error if the configured `server.address` is invalid, the
/// listener cannot bind, or the server exits with an I/O error.
pub async fn start_server(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let (app, app_state) = build_app(config.clone()).await?;

    let addr: SocketAddr = app_state.config.server.address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Starting meeting transcription engine server");

    let shutdown_signal = async {
        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                },
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                },
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!("received CTRL-C signal, initiating graceful shutdown"),
            () = terminate => info!("received SIGTERM signal, initiating graceful shutdown"),
        }
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| {
            error!(error = %e, "server error");
            Box::new(e) as Box<dyn std::error::Error>
        })
}
