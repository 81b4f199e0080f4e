// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;
use std::time::SystemTime;

use mte_asr::{AccurateAsr, DiarizingAsr, StreamingAsr};
use mte_engine::LeaseRegistry;
use mte_session::SessionManager;
use mte_store::VersionStore;
use tokio::sync::Semaphore;

use crate::config::Config;

/// Shared handles the WebSocket and HTTP handlers need. Constructed once in
/// `server::start_server` and held behind an `Arc` by every connection.
pub struct AppState {
    pub config: Arc<Config>,
    pub session_manager: SessionManager,
    pub store: VersionStore,
    pub streaming_asr: Arc<dyn StreamingAsr>,
    pub accurate_asr: Arc<dyn AccurateAsr>,
    pub diarizing_asr: Arc<dyn DiarizingAsr>,
    /// Bounds the number of concurrent `StreamingAsr::transcribe` calls
    /// across every session, regardless of how many are connected.
    pub asr_semaphore: Arc<Semaphore>,
    pub chunk_lease_registry: LeaseRegistry,
    pub started_at: SystemTime,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        store: VersionStore,
        streaming_asr: Arc<dyn StreamingAsr>,
        accurate_asr: Arc<dyn AccurateAsr>,
        diarizing_asr: Arc<dyn DiarizingAsr>,
    ) -> Self {
        let asr_worker_pool = config.session.asr_worker_pool;
        Self {
            config,
            session_manager: SessionManager::new(),
            store,
            streaming_asr,
            accurate_asr,
            diarizing_asr,
            asr_semaphore: Arc::new(Semaphore::new(asr_worker_pool)),
            chunk_lease_registry: LeaseRegistry::default(),
            started_at: SystemTime::now(),
        }
    }
}
