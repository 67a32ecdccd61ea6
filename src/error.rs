// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the sync engine.
//!
//! Errors are categorized by the collaborator they come from (source database,
//! search index, checkpoint store) and by whether a retry can help.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `TransientConnection` | Yes | Source connection unusable (closed, reset, timed out) |
//! | `TransientNetwork` | Yes | Search index request failed at the network level |
//! | `Checkpoint` | Yes | Checkpoint store (Redis) command failed |
//! | `PermanentQuery` | No | Malformed query, schema mismatch, undecodable row |
//! | `InvalidWatermark` | No | Stored checkpoint is not a timestamp |
//! | `Serialization` | No | Bulk payload could not be encoded |
//! | `Config` | No | Configuration invalid |
//!
//! # Retry Behavior
//!
//! [`SyncError::is_retryable()`] drives [`BackoffPolicy`](crate::resilience::BackoffPolicy).
//! Transient classes are absorbed below the orchestrator when a retry succeeds
//! within the attempt cap. Everything else aborts the current cycle.

use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while synchronizing.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The source database connection is unusable.
    ///
    /// Handled by the connection recovery controller, which reconnects
    /// and retries the operation.
    #[error("Source connection error ({operation}): {message}")]
    TransientConnection { operation: String, message: String },

    /// A request to the search index failed before a response arrived.
    #[error("Network error ({operation}): {message}")]
    TransientNetwork { operation: String, message: String },

    /// A source query failed for a reason a retry will not fix.
    ///
    /// Aborts the current cycle and needs operator attention.
    #[error("Query error ({operation}): {message}")]
    PermanentQuery { operation: String, message: String },

    /// Checkpoint store (Redis) command error.
    #[error("Checkpoint store error ({operation}): {message}")]
    Checkpoint {
        operation: String,
        message: String,
        #[source]
        source: Option<redis::RedisError>,
    },

    /// A stored watermark could not be parsed as a timestamp.
    #[error("Invalid watermark for {key}: {value:?}")]
    InvalidWatermark { key: String, value: String },

    /// Bulk payload serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Create a checkpoint store error from a redis::RedisError
    pub fn checkpoint(operation: impl Into<String>, source: redis::RedisError) -> Self {
        Self::Checkpoint {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a checkpoint store error without source
    pub fn checkpoint_msg(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Checkpoint {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn connection(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientConnection {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn network(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientNetwork {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn query(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PermanentQuery {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Classify a source database error.
    ///
    /// Transport-level failures mean the connection is gone; everything
    /// the server or the decoder rejected is permanent.
    pub fn from_sqlx(operation: impl Into<String>, e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::connection(operation, e.to_string()),
            other => Self::query(operation, other.to_string()),
        }
    }

    /// Classify a search index HTTP error.
    pub fn from_reqwest(operation: impl Into<String>, e: reqwest::Error) -> Self {
        if e.is_builder() {
            return Self::Config(format!("invalid search index request: {}", e));
        }
        Self::network(operation, e.to_string())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientConnection { .. } => true,
            Self::TransientNetwork { .. } => true,
            Self::Checkpoint { .. } => true, // Redis blips are transient
            Self::PermanentQuery { .. } => false,
            Self::InvalidWatermark { .. } => false,
            Self::Serialization(_) => false,
            Self::Config(_) => false,
        }
    }

    /// Short label for the `error_type` metric.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientConnection { .. } => "transient_connection",
            Self::TransientNetwork { .. } => "transient_network",
            Self::PermanentQuery { .. } => "permanent_query",
            Self::Checkpoint { .. } => "checkpoint",
            Self::InvalidWatermark { .. } => "invalid_watermark",
            Self::Serialization(_) => "serialization",
            Self::Config(_) => "config",
        }
    }
}

impl From<redis::RedisError> for SyncError {
    fn from(e: redis::RedisError) -> Self {
        Self::checkpoint("unknown", e)
    }
}
