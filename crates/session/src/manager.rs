// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Tracks all live sessions, allows a dropped WebSocket to reconnect and
//! resume an existing session by id, and evicts sessions that have sat idle
//! (no socket attached) for longer than `session_linger_sec`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use opentelemetry::global;
use tokio::sync::Mutex;
use tokio::time::interval;

use crate::session::Session;

struct Entry {
    session: Session,
    /// Set when the owning WebSocket disconnects; cleared on reconnect.
    /// The sweeper evicts entries whose disconnect has outlived the linger.
    disconnected_at: Option<SystemTime>,
}

struct Inner {
    sessions: HashMap<String, Entry>,
    sessions_active_gauge: opentelemetry::metrics::Gauge<u64>,
    sessions_created_counter: opentelemetry::metrics::Counter<u64>,
    sessions_destroyed_counter: opentelemetry::metrics::Counter<u64>,
    session_duration_histogram: opentelemetry::metrics::Histogram<f64>,
}

impl Default for Inner {
    fn default() -> Self {
        let meter = global::meter("mte_sessions");
        Self {
            sessions: HashMap::new(),
            sessions_active_gauge: meter
                .u64_gauge("sessions.active")
                .with_description("Number of tracked sessions, attached or lingering")
                .build(),
            sessions_created_counter: meter
                .u64_counter("sessions.created")
                .with_description("Total number of sessions created")
                .build(),
            sessions_destroyed_counter: meter
                .u64_counter("sessions.destroyed")
                .with_description("Total number of sessions destroyed")
                .build(),
            session_duration_histogram: meter
                .f64_histogram("session.duration")
                .with_description("Session lifetime duration in seconds")
                .with_unit("s")
                .build(),
        }
    }
}

impl Inner {
    fn record_destruction(&self, created_at: SystemTime) {
        self.sessions_destroyed_counter.add(1, &[]);
        self.sessions_active_gauge.record(self.sessions.len() as u64, &[]);
        let duration = SystemTime::now().duration_since(created_at).unwrap_or_default();
        self.session_duration_histogram.record(duration.as_secs_f64(), &[]);
    }
}

/// A thread-safe registry of active and lingering sessions.
///
/// Cheap to clone: all state lives behind an `Arc<Mutex<_>>`, so every clone
/// observes the same session set.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Mutex<Inner>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self { inner: Arc::new(Mutex::new(Inner::default())) }
    }
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly spawned session.
    pub async fn add_session(&self, session: Session) {
        let mut inner = self.inner.lock().await;
        let id = session.id.clone();
        inner.sessions.insert(id, Entry { session, disconnected_at: None });
        inner.sessions_created_counter.add(1, &[]);
        let count = inner.sessions.len() as u64;
        inner.sessions_active_gauge.record(count, &[]);
    }

    /// Looks up a session by id, for a fresh socket attaching for the first
    /// time or a dropped socket reconnecting with `?session_id=`.
    ///
    /// A successful resume clears any pending eviction: the session's
    /// buffered state is untouched and no events are replayed, the caller
    /// just resubscribes to `Session::subscribe` and starts pushing frames
    /// again.
    pub async fn resume(&self, session_id: &str) -> Option<Session> {
        let mut inner = self.inner.lock().await;
        let entry = inner.sessions.get_mut(session_id)?;
        entry.disconnected_at = None;
        Some(entry.session.clone())
    }

    pub async fn get(&self, session_id: &str) -> Option<Session> {
        let inner = self.inner.lock().await;
        inner.sessions.get(session_id).map(|e| e.session.clone())
    }

    /// Marks a session as having lost its socket without closing it: the
    /// processor keeps running and buffering, but the session becomes
    /// eligible for eviction after `session_linger_sec`.
    pub async fn mark_disconnected(&self, session_id: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.sessions.get_mut(session_id) {
            entry.disconnected_at = Some(SystemTime::now());
        }
    }

    /// Removes and closes a session immediately, e.g. on an explicit client
    /// disconnect message rather than a dropped connection.
    pub async fn remove_and_close(&self, session_id: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.sessions.remove(session_id) {
            entry.session.close();
            inner.record_destruction(entry.session.created_at);
        }
    }

    pub async fn list(&self) -> Vec<Session> {
        let inner = self.inner.lock().await;
        inner.sessions.values().map(|e| e.session.clone()).collect()
    }

    /// Spawns a background task that evicts sessions which have been
    /// disconnected for longer than `session_linger_sec`. The discarded
    /// session's in-memory audio buffer is dropped with it; nothing is
    /// flushed to the transcript store for a session that never reconnects.
    pub fn spawn_eviction_sweeper(&self, session_linger_sec: f64) {
        let manager = self.clone();
        let linger = Duration::from_secs_f64(session_linger_sec.max(1.0));
        tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(10));
            loop {
                tick.tick().await;
                manager.sweep_expired(linger).await;
            }
        });
    }

    async fn sweep_expired(&self, linger: Duration) {
        let mut inner = self.inner.lock().await;
        let now = SystemTime::now();
        let expired: Vec<String> = inner
            .sessions
            .iter()
            .filter_map(|(id, entry)| {
                let disconnected_at = entry.disconnected_at?;
                if now.duration_since(disconnected_at).unwrap_or_default() >= linger {
                    Some(id.clone())
                } else {
                    None
                }
            })
            .collect();
        for id in expired {
            if let Some(entry) = inner.sessions.remove(&id) {
                tracing::info!(session_id = %id, "evicting lingering session");
                entry.session.close();
                inner.record_destruction(entry.session.created_at);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::AudioQueue;
    use std::sync::Arc as StdArc;
    use tokio::sync::broadcast;

    fn bare_session(id: &str) -> Session {
        // Constructs a `Session` handle without spawning a processor task,
        // exercising only the manager's bookkeeping.
        Session::for_test(id.to_string(), StdArc::new(AudioQueue::new(1)), broadcast::channel(1).0)
    }

    #[tokio::test]
    async fn resume_clears_pending_eviction() {
        let manager = SessionManager::new();
        manager.add_session(bare_session("s1")).await;
        manager.mark_disconnected("s1").await;
        assert!(manager.resume("s1").await.is_some());
        manager.sweep_expired(Duration::from_secs(0)).await;
        assert!(manager.get("s1").await.is_some());
    }

    #[tokio::test]
    async fn sweep_evicts_after_linger_elapses() {
        let manager = SessionManager::new();
        manager.add_session(bare_session("s1")).await;
        manager.mark_disconnected("s1").await;
        manager.sweep_expired(Duration::from_secs(0)).await;
        assert!(manager.get("s1").await.is_none());
    }

    #[tokio::test]
    async fn connected_session_is_not_swept() {
        let manager = SessionManager::new();
        manager.add_session(bare_session("s1")).await;
        manager.sweep_expired(Duration::from_secs(0)).await;
        assert!(manager.get("s1").await.is_some());
    }
}
