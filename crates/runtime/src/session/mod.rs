//! In-memory session store
//!
//! Owns every `SessionRecord`. The engine and the tool surface read
//! clones and write back through `upsert`/`update`; calls for the same
//! session are serialized by the transport, so per-entry locking is all
//! the coordination needed. A background sweeper evicts idle sessions
//! and emits an archival summary before dropping them.

use crate::types::{Role, SessionRecord};
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Sessions idle longer than this are evicted.
pub const IDLE_EVICTION: Duration = Duration::from_secs(24 * 60 * 60);
/// Sweep cadence.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionRecord>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Fetch a clone of a session, stamping activity.
    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.get_mut(session_id).map(|mut entry| {
            entry.touch();
            entry.clone()
        })
    }

    /// Fetch a session, creating a default record on miss.
    pub fn get_or_create(&self, session_id: &str) -> SessionRecord {
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord::new(session_id, "", Role::Planner));
        entry.touch();
        entry.clone()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Write a record back, restamping activity.
    pub fn upsert(&self, mut record: SessionRecord) {
        record.touch();
        self.sessions.insert(record.session_id.clone(), record);
    }

    /// Mutate a session in place; returns false when it does not exist.
    pub fn update<F>(&self, session_id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut SessionRecord),
    {
        match self.sessions.get_mut(session_id) {
            Some(mut entry) => {
                mutate(&mut entry);
                entry.touch();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Evict sessions idle longer than `max_idle`, logging an archival
    /// summary for each. Returns the number evicted.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(max_idle).unwrap_or_else(|_| ChronoDuration::hours(24));
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.last_activity < cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for session_id in stale {
            if let Some((_, record)) = self.sessions.remove(&session_id) {
                tracing::info!(
                    session_id = %record.session_id,
                    final_phase = %record.current_phase,
                    role = %record.detected_role,
                    effectiveness = record.reasoning_effectiveness,
                    payload_keys = record.payload.len(),
                    "archiving idle session"
                );
                evicted += 1;
            }
        }
        evicted
    }

    /// Run the hourly eviction sweep until the process exits.
    pub fn spawn_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = store.evict_idle(IDLE_EVICTION);
                if evicted > 0 {
                    tracing::info!(evicted, remaining = store.len(), "session sweep complete");
                }
            }
        })
    }
}
