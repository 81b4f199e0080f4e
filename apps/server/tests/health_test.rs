// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use mte_server::{server, Config};

async fn spawn_test_server() -> (String, tokio::task::JoinHandle<()>) {
    let mut config = Config::default();
    config.database_url = "sqlite::memory:".to_string();
    let (router, _state) = server::build_app(config).await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle =
        tokio::spawn(async move { axum::serve(listener, router.into_make_service()).await.unwrap() });
    (format!("http://{addr}"), handle)
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (base_url, handle) = spawn_test_server().await;
    let response = reqwest::get(format!("{base_url}/healthz")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    handle.abort();
}

#[tokio::test]
async fn readyz_reports_ready_when_store_is_reachable() {
    let (base_url, handle) = spawn_test_server().await;
    let response = reqwest::get(format!("{base_url}/readyz")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ready");
    handle.abort();
}

#[tokio::test]
async fn config_endpoint_redacts_otlp_headers() {
    let (base_url, handle) = spawn_test_server().await;
    let response = reqwest::get(format!("{base_url}/api/v1/config")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["database_url"], "sqlite::memory:");
    handle.abort();
}
