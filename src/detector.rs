//! Change detection and dependency resolution.
//!
//! [`poll`] finds rows changed since a watermark; [`resolve`] maps those rows
//! to the films that must be republished. Both run through the
//! [`SourceSession`], so a dropped connection is recovered transparently.

use crate::error::Result;
use crate::metrics;
use crate::source::{ChangedRow, DependentKind, EntityKind, SourceConnection, SourceConnector, SourceSession};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, warn};
use uuid::Uuid;

/// How a stream's changed rows become film ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolver {
    /// The rows are films already.
    Identity,
    /// The rows are persons or genres; look up the films linking them.
    Dependent(DependentKind),
}

/// Rows of `kind` changed after `watermark`, ascending by `updated_at`,
/// never more than `page_size`. `stream` labels logs and metrics.
pub async fn poll<C: SourceConnector>(
    session: &mut SourceSession<C>,
    stream: &str,
    kind: EntityKind,
    watermark: DateTime<Utc>,
    page_size: usize,
) -> Result<Vec<ChangedRow>> {
    let mut rows = session
        .run("detect", |conn| conn.changed_since(kind, watermark, page_size))
        .await?;

    if rows.len() > page_size {
        warn!(
            stream,
            table = kind.table(),
            returned = rows.len(),
            page_size,
            "Source returned an over-long page, truncating"
        );
    }
    // Stable, so ties keep source order.
    rows.sort_by_key(|row| row.updated_at);
    rows.truncate(page_size);

    debug!(stream, watermark = %watermark, rows = rows.len(), "Polled changes");
    metrics::record_rows_detected(stream, rows.len());
    Ok(rows)
}

/// Film ids implied by `rows`: distinct, in first-seen order.
///
/// An empty `rows` yields an empty result without touching the source.
pub async fn resolve<C: SourceConnector>(
    session: &mut SourceSession<C>,
    resolver: Resolver,
    rows: &[ChangedRow],
) -> Result<Vec<Uuid>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let films = match resolver {
        Resolver::Identity => rows.iter().map(|row| row.id).collect(),
        Resolver::Dependent(kind) => {
            let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
            let films = session
                .run("resolve", |conn| conn.films_referencing(kind, ids.clone()))
                .await?;
            debug!(dependent = ?kind, changed = ids.len(), films = films.len(), "Resolved dependents");
            films
        }
    };

    Ok(distinct(films))
}

fn distinct(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
