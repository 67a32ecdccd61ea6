// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Source database integration traits.
//!
//! Defines the interface the pipeline needs from the relational source.
//! [`postgres`] implements it with `sqlx`; tests provide an in-memory mock.
//!
//! # Example
//!
//! ```rust,no_run
//! use search_sync::source::{BoxFuture, ChangedRow, DependentKind, EntityKind, SourceConnection};
//! use search_sync::FilmRecord;
//! use chrono::{DateTime, Utc};
//! use uuid::Uuid;
//!
//! struct Empty;
//!
//! impl SourceConnection for Empty {
//!     fn is_closed(&self) -> bool {
//!         false
//!     }
//!
//!     fn changed_since(&mut self, _: EntityKind, _: DateTime<Utc>, _: usize) -> BoxFuture<'_, Vec<ChangedRow>> {
//!         Box::pin(async { Ok(vec![]) })
//!     }
//!
//!     fn films_referencing(&mut self, _: DependentKind, _: Vec<Uuid>) -> BoxFuture<'_, Vec<Uuid>> {
//!         Box::pin(async { Ok(vec![]) })
//!     }
//!
//!     fn fetch_films(&mut self, _: Vec<Uuid>) -> BoxFuture<'_, Vec<FilmRecord>> {
//!         Box::pin(async { Ok(vec![]) })
//!     }
//! }
//! ```

pub mod postgres;
pub mod recovery;

use crate::error::Result;
use crate::model::FilmRecord;
use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

pub use postgres::{PgConnector, PgSource};
pub use recovery::SourceSession;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A source table with an `updated_at` column that can be polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Person,
    Genre,
    FilmWork,
}

impl EntityKind {
    /// Table name inside the `content` schema.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Person => "person",
            EntityKind::Genre => "genre",
            EntityKind::FilmWork => "film_work",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// An entity whose changes propagate to the films that reference it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependentKind {
    Person,
    Genre,
}

impl DependentKind {
    /// Link table joining this entity to `film_work`, and its foreign key column.
    pub fn link(&self) -> (&'static str, &'static str) {
        match self {
            DependentKind::Person => ("person_film_work", "person_id"),
            DependentKind::Genre => ("genre_film_work", "genre_id"),
        }
    }
}

impl From<DependentKind> for EntityKind {
    fn from(kind: DependentKind) -> Self {
        match kind {
            DependentKind::Person => EntityKind::Person,
            DependentKind::Genre => EntityKind::Genre,
        }
    }
}

/// A row whose `updated_at` passed a stream's watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedRow {
    pub id: Uuid,
    pub updated_at: DateTime<Utc>,
}

/// One open connection to the source.
///
/// Methods take owned arguments so callers can build the future from a
/// closure that only borrows the connection.
pub trait SourceConnection: Send {
    /// Whether the connection is known to be unusable.
    fn is_closed(&self) -> bool;

    /// Rows of `kind` with `updated_at > watermark`, ascending, at most `limit`.
    fn changed_since(
        &mut self,
        kind: EntityKind,
        watermark: DateTime<Utc>,
        limit: usize,
    ) -> BoxFuture<'_, Vec<ChangedRow>>;

    /// Distinct film ids linked to any of `ids`, ordered by film `updated_at`.
    fn films_referencing(&mut self, kind: DependentKind, ids: Vec<Uuid>) -> BoxFuture<'_, Vec<Uuid>>;

    /// Aggregated records for the films in `ids` that still exist.
    fn fetch_films(&mut self, ids: Vec<Uuid>) -> BoxFuture<'_, Vec<FilmRecord>>;
}

/// Opens source connections.
pub trait SourceConnector: Send + Sync {
    type Conn: SourceConnection;

    fn connect(&self) -> BoxFuture<'_, Self::Conn>;
}
