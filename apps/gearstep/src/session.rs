//! # Session Store
//!
//! Sessions are kept as encoded [`SessionRecord`]s keyed by id. Each record
//! carries the fingerprint of the stage config it was created under; a
//! record from another config is rejected rather than replayed against
//! stages it was never built for.
//!
//! One stage-advance operation runs per session at a time: handlers hold
//! the guard from [`SessionStore::lock`] across load, flow and save.
//!
//! [`MemorySessionStore`] drops sessions that have not been saved within its
//! idle timeout, together with their lock entries.

use async_trait::async_trait;
use gearstep_core::formats::{decode_record, encode_record};
use gearstep_core::{ConfigFingerprint, GearstepError, SessionRecord};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session '{0}' not found")]
    NotFound(String),

    #[error("session '{session}' was created under config {stored}, current config is {current}")]
    FingerprintMismatch {
        session: String,
        stored: ConfigFingerprint,
        current: ConfigFingerprint,
    },

    #[error("session record error: {0}")]
    Codec(#[from] GearstepError),
}

/// Opaque keyed storage for session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Allocate a fresh, unused session id.
    async fn next_id(&self) -> String;

    async fn load(&self, id: &str) -> Result<SessionRecord, SessionError>;

    async fn save(&self, record: &SessionRecord) -> Result<(), SessionError>;

    async fn remove(&self, id: &str) -> bool;

    /// Per-session exclusive guard.
    async fn lock(&self, id: &str) -> OwnedMutexGuard<()>;

    /// Load and check the record against the running config.
    async fn load_checked(
        &self,
        id: &str,
        current: ConfigFingerprint,
    ) -> Result<SessionRecord, SessionError> {
        let record = self.load(id).await?;
        if record.fingerprint != current {
            return Err(SessionError::FingerprintMismatch {
                session: id.to_string(),
                stored: record.fingerprint,
                current,
            });
        }
        Ok(record)
    }
}

#[derive(Debug)]
struct StoredRecord {
    bytes: Vec<u8>,
    saved_at: Instant,
}

/// In-memory store holding encoded records.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: RwLock<BTreeMap<String, StoredRecord>>,
    locks: Mutex<BTreeMap<String, Arc<Mutex<()>>>>,
    counter: AtomicU64,
    idle_timeout: Option<Duration>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict sessions not saved for `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Drop idle records and every lock entry that is neither held nor
    /// backed by a record. Returns the number of records dropped.
    pub async fn evict_idle(&self) -> usize {
        let evicted = match self.idle_timeout {
            Some(timeout) => {
                let now = Instant::now();
                let mut records = self.records.write().await;
                let before = records.len();
                records.retain(|_, stored| now.duration_since(stored.saved_at) < timeout);
                before.saturating_sub(records.len())
            }
            None => 0,
        };

        let records = self.records.read().await;
        let mut locks = self.locks.lock().await;
        locks.retain(|id, lock| records.contains_key(id) || Arc::strong_count(lock) > 1);
        if evicted > 0 {
            debug!(evicted, remaining = records.len(), "idle sessions evicted");
        }
        evicted
    }

    pub async fn lock_entries(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn next_id(&self) -> String {
        self.evict_idle().await;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        loop {
            let n = self.counter.fetch_add(1, Ordering::Relaxed);
            let id = format!("{:016x}", nanos.rotate_left(17) ^ n.wrapping_mul(0x9E37_79B9_7F4A_7C15));
            if !self.records.read().await.contains_key(&id) {
                return id;
            }
        }
    }

    async fn load(&self, id: &str) -> Result<SessionRecord, SessionError> {
        let records = self.records.read().await;
        let stored = records
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        Ok(decode_record(&stored.bytes)?)
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), SessionError> {
        let bytes = encode_record(record)?;
        self.records.write().await.insert(
            record.session_id.clone(),
            StoredRecord {
                bytes,
                saved_at: Instant::now(),
            },
        );
        self.evict_idle().await;
        Ok(())
    }

    async fn remove(&self, id: &str) -> bool {
        self.locks.lock().await.remove(id);
        self.records.write().await.remove(id).is_some()
    }

    async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(id.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

// =============================================================================
// TESTS
// =============================================================================
