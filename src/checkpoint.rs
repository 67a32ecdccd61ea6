// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Watermark persistence for each stream.
//!
//! Each stream keeps the `updated_at` of the last row it selected under its own
//! key in Redis (`persons_last_update`, `genres_last_update`, `films_last_update`).
//! A missing key means the stream has never run and starts from the configured
//! initial watermark.
//!
//! ## Watermark Semantics
//!
//! Detect queries use `updated_at > watermark`, so the stored value is exclusive:
//!
//! ```text
//! poll page ending at 12:00:05.123456 → advance to 12:00:05.123456
//!                                       next poll starts strictly after it
//! ```
//!
//! [`CheckpointTracker::advance`] never moves a watermark backwards.
//!
//! ## Format
//!
//! Values are written as RFC 3339 with microseconds (`2024-01-01T12:00:05.123456Z`).
//! Reads also accept the space-separated form `2024-01-01 12:00:05.123456+00:00`.

use crate::error::{Result, SyncError};
use crate::metrics;
use crate::resilience::BackoffPolicy;
use crate::source::BoxFuture;
use chrono::{DateTime, SecondsFormat, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Formats accepted besides RFC 3339.
const FALLBACK_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M:%S%.f%#z",
];

/// Parse a stored watermark.
pub fn parse_watermark(key: &str, raw: &str) -> Result<DateTime<Utc>> {
    let value = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in FALLBACK_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(value, format) {
            return Ok(ts.with_timezone(&Utc));
        }
    }
    Err(SyncError::InvalidWatermark {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

/// Render a watermark for storage.
pub fn format_watermark(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Key-value store holding one watermark string per key.
pub trait CheckpointStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>>;

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, ()>;
}

/// Redis-backed checkpoint store.
#[derive(Clone)]
pub struct RedisCheckpointStore {
    conn: ConnectionManager,
}

impl RedisCheckpointStore {
    /// Connect to Redis. The connection manager reconnects on its own
    /// after the initial connection succeeds.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| SyncError::checkpoint("open", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| SyncError::checkpoint("connect", e))?;
        info!("Connected to checkpoint store");
        Ok(Self { conn })
    }

    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

impl CheckpointStore for RedisCheckpointStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let value: Option<String> = conn
                .get(key)
                .await
                .map_err(|e| SyncError::checkpoint("GET", e))?;
            Ok(value)
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            conn.set::<_, _, ()>(key, value)
                .await
                .map_err(|e| SyncError::checkpoint("SET", e))?;
            Ok(())
        })
    }
}

/// In-process checkpoint store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw value, bypassing watermark formatting.
    pub async fn insert(&self, key: &str, value: impl Into<String>) {
        self.values.write().await.insert(key.to_string(), value.into());
    }

    pub async fn raw(&self, key: &str) -> Option<String> {
        self.values.read().await.get(key).cloned()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.values.read().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.values.write().await.insert(key.to_string(), value);
            Ok(())
        })
    }
}

/// Reads and advances stream watermarks with retry.
pub struct CheckpointTracker<K> {
    store: K,
    policy: BackoffPolicy,
    initial: DateTime<Utc>,
}

impl<K: CheckpointStore> CheckpointTracker<K> {
    pub fn new(store: K, policy: BackoffPolicy, initial: DateTime<Utc>) -> Self {
        Self { store, policy, initial }
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    /// Watermark used for keys that were never written.
    pub fn initial(&self) -> DateTime<Utc> {
        self.initial
    }

    /// Current watermark for `key`.
    pub async fn watermark(&self, key: &str) -> Result<DateTime<Utc>> {
        let raw = self.policy.retry("checkpoint_get", || self.store.get(key)).await?;
        match raw {
            Some(value) => parse_watermark(key, &value),
            None => {
                debug!(key, initial = %self.initial, "No checkpoint yet, using initial watermark");
                Ok(self.initial)
            }
        }
    }

    /// Move `key` forward to `to`. Returns `false` (and writes nothing) if
    /// `to` is not newer than the stored watermark.
    pub async fn advance(&self, key: &str, to: DateTime<Utc>) -> Result<bool> {
        let current = self.watermark(key).await?;
        if to <= current {
            debug!(key, current = %current, proposed = %to, "Watermark not advanced");
            return Ok(false);
        }

        let value = format_watermark(to);
        self.policy
            .retry("checkpoint_set", || self.store.set(key, value.clone()))
            .await?;

        metrics::record_watermark(key, to);
        if let Ok(lag) = (Utc::now() - to).to_std() {
            metrics::record_watermark_lag(key, lag);
        }
        debug!(key, watermark = %value, "Watermark advanced");
        Ok(true)
    }
}
