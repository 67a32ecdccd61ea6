// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Source connection recovery.
//!
//! [`SourceSession`] owns the single source connection shared by every stream.
//! Before each operation it checks the handle; a closed (or never opened)
//! handle is replaced by connecting on the backoff schedule:
//!
//! ```text
//! run(op) ──► ensure_live ──► op(conn) ──► Ok ─────────────► return
//!                │                 │
//!                │ closed?         └─► TransientConnection: drop handle,
//!                ▼                     back off, loop (ensure_live reconnects)
//!          connect × max_attempts
//!          then one unguarded connect
//! ```

use super::{BoxFuture, SourceConnection, SourceConnector};
use crate::error::{Result, SyncError};
use crate::metrics;
use crate::resilience::BackoffPolicy;
use tracing::{debug, info, warn};

/// The shared source connection plus its recovery policy.
pub struct SourceSession<C: SourceConnector> {
    connector: C,
    conn: Option<C::Conn>,
    policy: BackoffPolicy,
    reconnects: u64,
}

impl<C: SourceConnector> SourceSession<C> {
    /// Create a session that connects lazily on first use.
    pub fn new(connector: C, policy: BackoffPolicy) -> Self {
        Self {
            connector,
            conn: None,
            policy,
            reconnects: 0,
        }
    }

    /// Create a session around an already open connection.
    pub fn with_connection(connector: C, conn: C::Conn, policy: BackoffPolicy) -> Self {
        Self {
            connector,
            conn: Some(conn),
            policy,
            reconnects: 0,
        }
    }

    /// Whether a usable connection is currently held.
    pub fn is_live(&self) -> bool {
        self.conn.as_ref().map_or(false, |c| !c.is_closed())
    }

    /// Connections opened by this session so far.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Replace a missing or closed connection.
    pub async fn ensure_live(&mut self) -> Result<()> {
        if self.is_live() {
            return Ok(());
        }
        if self.conn.take().is_some() {
            warn!("Source connection closed, reconnecting");
        }

        let conn = self.connect_with_backoff().await?;
        self.conn = Some(conn);
        self.reconnects += 1;
        Ok(())
    }

    async fn connect_with_backoff(&self) -> Result<C::Conn> {
        let mut attempt: u32 = 1;
        loop {
            let result = self.connector.connect().await;
            metrics::record_reconnect(result.is_ok());
            match result {
                Ok(conn) => {
                    if attempt > 1 {
                        info!(attempt, "Source connection restored after retry");
                    }
                    return Ok(conn);
                }
                Err(e) => self.policy.back_off("connect", attempt, e).await?,
            }
            attempt = attempt.saturating_add(1);
        }
    }

    /// Run `op` against a live connection, reconnecting and retrying on
    /// connection-class failures.
    ///
    /// Reconnect exhaustion propagates immediately; it already went through
    /// the full backoff schedule.
    pub async fn run<T, F>(&mut self, operation: &str, mut op: F) -> Result<T>
    where
        F: for<'c> FnMut(&'c mut C::Conn) -> BoxFuture<'c, T>,
    {
        let mut attempt: u32 = 1;
        loop {
            self.ensure_live().await?;
            match self.call(operation, &mut op).await {
                Ok(value) => return Ok(value),
                Err(e) => self.policy.back_off(operation, attempt, e).await?,
            }
            attempt = attempt.saturating_add(1);
        }
    }

    async fn call<T, F>(&mut self, operation: &str, op: &mut F) -> Result<T>
    where
        F: for<'c> FnMut(&'c mut C::Conn) -> BoxFuture<'c, T>,
    {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| SyncError::connection(operation, "no source connection"))?;
        let result = op(conn).await;
        if let Err(SyncError::TransientConnection { .. }) = &result {
            debug!(operation, "Dropping source connection after connection error");
            self.conn = None;
        }
        result
    }
}
