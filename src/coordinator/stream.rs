// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-stream sync loop.
//!
//! Each stream drains its changes page by page:
//!
//! ```text
//! watermark ──► poll ──► (empty? done) ──► resolve ──► claim
//!     ▲                                                  │
//!     │                         ┌── AfterSelect: advance ┤
//!     │                         ▼                        ▼
//!     └──── AfterPublish: advance ◄── aggregate + publish in page_size chunks
//! ```
//!
//! # Checkpoint Ordering
//!
//! With [`CommitPoint::AfterSelect`] the watermark moves as soon as a page is
//! selected, so a publish failure is logged and not revisited (at-most-once
//! for that page). With [`CommitPoint::AfterPublish`] the watermark only moves
//! once every batch of the page was accepted; a failed batch ends the stream
//! for this cycle and the page is retried next cycle (at-least-once).

use super::types::{StreamReport, SyncPhase};
use crate::aggregator;
use crate::checkpoint::{CheckpointStore, CheckpointTracker};
use crate::config::{CommitPoint, StreamConfig, SyncSettings};
use crate::dedup::DedupSet;
use crate::detector::{self, Resolver};
use crate::error::Result;
use crate::metrics;
use crate::publisher::{BulkPublisher, BulkSink, PublishOutcome};
use crate::source::{DependentKind, EntityKind, SourceConnector, SourceSession};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

/// Static description of one change stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub name: &'static str,
    pub checkpoint_key: String,
    pub page_size: usize,
    pub source: EntityKind,
    pub resolver: Resolver,
}

impl StreamDescriptor {
    pub fn persons(config: &StreamConfig) -> Self {
        Self {
            name: "persons",
            checkpoint_key: config.key_for("persons"),
            page_size: config.page_size,
            source: EntityKind::Person,
            resolver: Resolver::Dependent(DependentKind::Person),
        }
    }

    pub fn genres(config: &StreamConfig) -> Self {
        Self {
            name: "genres",
            checkpoint_key: config.key_for("genres"),
            page_size: config.page_size,
            source: EntityKind::Genre,
            resolver: Resolver::Dependent(DependentKind::Genre),
        }
    }

    pub fn films(config: &StreamConfig) -> Self {
        Self {
            name: "films",
            checkpoint_key: config.key_for("films"),
            page_size: config.page_size,
            source: EntityKind::FilmWork,
            resolver: Resolver::Identity,
        }
    }

    /// Streams in cycle order: dependents first, films last.
    pub fn from_settings(settings: &SyncSettings) -> Vec<Self> {
        vec![
            Self::persons(&settings.persons),
            Self::genres(&settings.genres),
            Self::films(&settings.films),
        ]
    }

    pub fn phase(&self) -> SyncPhase {
        match self.source {
            EntityKind::Person => SyncPhase::SyncPersons,
            EntityKind::Genre => SyncPhase::SyncGenres,
            EntityKind::FilmWork => SyncPhase::SyncFilms,
        }
    }
}

/// Drain one stream until a detect page comes back empty.
#[instrument(skip_all, fields(stream = stream.name))]
pub async fn sync_stream<C, K, S>(
    session: &mut SourceSession<C>,
    checkpoints: &CheckpointTracker<K>,
    publisher: &BulkPublisher<S>,
    commit_point: CommitPoint,
    stream: &StreamDescriptor,
    dedup: &mut DedupSet,
) -> Result<StreamReport>
where
    C: SourceConnector,
    K: CheckpointStore,
    S: BulkSink,
{
    let mut report = StreamReport {
        stream: stream.name,
        ..Default::default()
    };

    loop {
        let watermark = checkpoints.watermark(&stream.checkpoint_key).await?;
        let rows = detector::poll(session, stream.name, stream.source, watermark, stream.page_size).await?;
        let Some(last_seen) = rows.last().map(|row| row.updated_at) else {
            debug!(watermark = %watermark, "Stream caught up");
            break;
        };
        report.pages += 1;
        report.rows_detected += rows.len();

        let films = detector::resolve(session, stream.resolver, &rows).await?;
        let candidates = films.len();
        let claimed = dedup.claim(films);
        let duplicates = candidates - claimed.len();
        report.films_claimed += claimed.len();
        report.films_deduplicated += duplicates;
        metrics::record_films_claimed(stream.name, claimed.len(), duplicates);

        debug!(
            rows = rows.len(),
            candidates,
            claimed = claimed.len(),
            duplicates,
            "Page selected"
        );

        if commit_point == CommitPoint::AfterSelect
            && !advance(checkpoints, stream, watermark, last_seen, &mut report).await?
        {
            break;
        }

        let mut all_published = true;
        for batch in claimed.chunks(stream.page_size) {
            let records = aggregator::fetch(session, batch).await?;
            if records.is_empty() {
                continue;
            }

            let result = publisher.publish(&records).await?;
            report.batches += 1;
            match result.outcome {
                PublishOutcome::Published => {
                    report.documents_published += result.documents;
                    metrics::record_batch_published(stream.name, result.documents, result.elapsed);
                }
                PublishOutcome::PartialFailure { failed_items } => {
                    report.failed_batches += 1;
                    all_published = false;
                    metrics::record_publish_failure(stream.name, result.outcome.label(), failed_items);
                }
                PublishOutcome::Rejected { .. } => {
                    report.failed_batches += 1;
                    all_published = false;
                    metrics::record_publish_failure(stream.name, result.outcome.label(), 0);
                }
            }
        }

        if commit_point == CommitPoint::AfterPublish {
            if !all_published {
                warn!(
                    watermark = %watermark,
                    "Publish failed, holding watermark until next cycle"
                );
                break;
            }
            if !advance(checkpoints, stream, watermark, last_seen, &mut report).await? {
                break;
            }
        }
    }

    if report.pages > 0 {
        info!(
            pages = report.pages,
            rows = report.rows_detected,
            claimed = report.films_claimed,
            deduplicated = report.films_deduplicated,
            published = report.documents_published,
            failed_batches = report.failed_batches,
            "Stream synced"
        );
    }
    Ok(report)
}

/// Move the stream's watermark to `to`. Returns `false` when it did not
/// move, which means the source returned rows at or below the watermark and
/// polling again would loop.
async fn advance<K: CheckpointStore>(
    checkpoints: &CheckpointTracker<K>,
    stream: &StreamDescriptor,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    report: &mut StreamReport,
) -> Result<bool> {
    if checkpoints.advance(&stream.checkpoint_key, to).await? {
        report.watermark_advances += 1;
        return Ok(true);
    }
    warn!(
        key = %stream.checkpoint_key,
        from = %from,
        to = %to,
        "Watermark did not advance, ending stream for this cycle"
    );
    Ok(false)
}
