// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! PostgreSQL source over a single `sqlx` connection.
//!
//! All queries are parameterized; batch membership uses `= ANY($1)`.
//! A connection-class error marks the connection closed so the
//! [`SourceSession`](super::SourceSession) replaces it before the next call.

use super::{BoxFuture, ChangedRow, DependentKind, EntityKind, SourceConnection, SourceConnector};
use crate::aggregator::{FilmRow, FILMS_QUERY};
use crate::error::{Result, SyncError};
use crate::model::FilmRecord;
use chrono::{DateTime, Utc};
use sqlx::{Connection, PgConnection};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Opens [`PgSource`] connections.
#[derive(Debug, Clone)]
pub struct PgConnector {
    url: String,
    connect_timeout: Duration,
}

impl PgConnector {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }

    pub fn from_config(config: &crate::config::PostgresConfig) -> Self {
        Self::new(config.url.clone(), config.connect_timeout_duration())
    }
}

impl SourceConnector for PgConnector {
    type Conn = PgSource;

    fn connect(&self) -> BoxFuture<'_, PgSource> {
        Box::pin(async move {
            debug!(timeout_ms = self.connect_timeout.as_millis() as u64, "Connecting to source");
            let conn = tokio::time::timeout(self.connect_timeout, PgConnection::connect(&self.url))
                .await
                .map_err(|_| SyncError::connection("connect", "connect timed out"))?
                .map_err(|e| SyncError::from_sqlx("connect", e))?;
            info!("Source connection established");
            Ok(PgSource { conn, closed: false })
        })
    }
}

/// Detect query for one table.
pub fn changed_since_query(kind: EntityKind) -> String {
    format!(
        "SELECT id, updated_at FROM content.{} WHERE updated_at > $1 ORDER BY updated_at LIMIT $2",
        kind.table()
    )
}

/// Resolve query for one dependent link table.
pub fn films_referencing_query(kind: DependentKind) -> String {
    let (link, column) = kind.link();
    format!(
        "SELECT fw.id, fw.updated_at \
         FROM content.film_work fw \
         JOIN content.{link} x ON x.film_work_id = fw.id \
         WHERE x.{column} = ANY($1) \
         GROUP BY fw.id \
         ORDER BY fw.updated_at"
    )
}

/// An open source connection.
pub struct PgSource {
    conn: PgConnection,
    closed: bool,
}

impl PgSource {
    fn classify<T>(&mut self, operation: &str, result: std::result::Result<T, sqlx::Error>) -> Result<T> {
        result.map_err(|e| {
            let err = SyncError::from_sqlx(operation, e);
            if matches!(err, SyncError::TransientConnection { .. }) {
                self.closed = true;
            }
            err
        })
    }
}

impl SourceConnection for PgSource {
    fn is_closed(&self) -> bool {
        self.closed
    }

    fn changed_since(
        &mut self,
        kind: EntityKind,
        watermark: DateTime<Utc>,
        limit: usize,
    ) -> BoxFuture<'_, Vec<ChangedRow>> {
        Box::pin(async move {
            let sql = changed_since_query(kind);
            let result = sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(&sql)
                .bind(watermark)
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .fetch_all(&mut self.conn)
                .await;
            let rows = self.classify("detect", result)?;
            Ok(rows
                .into_iter()
                .map(|(id, updated_at)| ChangedRow { id, updated_at })
                .collect())
        })
    }

    fn films_referencing(&mut self, kind: DependentKind, ids: Vec<Uuid>) -> BoxFuture<'_, Vec<Uuid>> {
        Box::pin(async move {
            let sql = films_referencing_query(kind);
            let result = sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(&sql)
                .bind(&ids)
                .fetch_all(&mut self.conn)
                .await;
            let rows = self.classify("resolve", result)?;
            Ok(rows.into_iter().map(|(id, _)| id).collect())
        })
    }

    fn fetch_films(&mut self, ids: Vec<Uuid>) -> BoxFuture<'_, Vec<FilmRecord>> {
        Box::pin(async move {
            let result = sqlx::query_as::<_, FilmRow>(FILMS_QUERY)
                .bind(&ids)
                .fetch_all(&mut self.conn)
                .await;
            let rows = self.classify("aggregate", result)?;
            Ok(rows.into_iter().map(FilmRow::into_record).collect())
        })
    }
}
