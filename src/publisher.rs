// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bulk publishing to the search index.
//!
//! A batch of films becomes one NDJSON `_bulk` request: an `index` action line
//! followed by the document line, per film, with a trailing newline.
//!
//! ```text
//! {"index":{"_index":"movies","_id":"<uuid>"}}
//! {"id":"<uuid>","imdb_rating":8.5,"genres":[...],"title":"...",...}
//! ...
//! ```
//!
//! # Outcomes
//!
//! | Response | Outcome | Retried |
//! |----------|---------|---------|
//! | Network failure / timeout | `TransientNetwork` error | Yes (backoff) |
//! | 2xx, no item errors | `Published` | - |
//! | 2xx with item errors | `PartialFailure` | No |
//! | Non-2xx status | `Rejected` | No |
//!
//! Index operations are upserts by `_id`, so republishing is idempotent.

use crate::config::ElasticsearchConfig;
use crate::error::{Result, SyncError};
use crate::model::FilmRecord;
use crate::resilience::BackoffPolicy;
use crate::source::BoxFuture;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

/// Content type required by the `_bulk` endpoint.
pub const NDJSON: &str = "application/x-ndjson";

/// Characters of a rejected response body kept in logs.
const LOGGED_BODY_CHARS: usize = 512;

#[derive(Serialize)]
struct BulkAction<'a> {
    index: BulkTarget<'a>,
}

#[derive(Serialize)]
struct BulkTarget<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id")]
    id: Uuid,
}

/// Serialize `records` as a `_bulk` body.
pub fn build_bulk_payload(index: &str, records: &[FilmRecord]) -> Result<String> {
    let mut payload = String::with_capacity(records.len() * 512);
    for record in records {
        let action = BulkAction {
            index: BulkTarget { index, id: record.id },
        };
        payload.push_str(&serde_json::to_string(&action)?);
        payload.push('\n');
        payload.push_str(&serde_json::to_string(&record.document())?);
        payload.push('\n');
    }
    Ok(payload)
}

/// Raw HTTP answer to a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkResponse {
    pub status: u16,
    pub body: String,
}

impl BulkResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Number of failed items when the body reports item errors.
    ///
    /// With `filter_path=items.*.error` a clean response is `{}`; any
    /// remaining `items` entry carries an error. An explicit `"errors": true`
    /// without items counts as a failure of unknown size (0).
    pub fn failed_items(&self) -> Option<usize> {
        let value: serde_json::Value = serde_json::from_str(&self.body).ok()?;
        let items = value
            .get("items")
            .and_then(|items| items.as_array())
            .map_or(0, |items| items.len());
        let flagged = value.get("errors").and_then(|e| e.as_bool()).unwrap_or(false);

        if items > 0 || flagged {
            Some(items)
        } else {
            None
        }
    }

    fn body_excerpt(&self) -> String {
        self.body.chars().take(LOGGED_BODY_CHARS).collect()
    }
}

/// Where bulk payloads go.
pub trait BulkSink: Send + Sync {
    fn send_bulk(&self, payload: String) -> BoxFuture<'_, BulkResponse>;
}

/// Elasticsearch `_bulk` endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct ElasticsearchSink {
    client: Client,
    bulk_url: String,
}

impl ElasticsearchSink {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self> {
        Self::with_timeout(config.bulk_url(), config.request_timeout_duration())
    }

    pub fn with_timeout(bulk_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::from_reqwest("client", e))?;
        Ok(Self {
            client,
            bulk_url: bulk_url.into(),
        })
    }

    pub fn bulk_url(&self) -> &str {
        &self.bulk_url
    }
}

impl BulkSink for ElasticsearchSink {
    fn send_bulk(&self, payload: String) -> BoxFuture<'_, BulkResponse> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.bulk_url)
                .header(CONTENT_TYPE, NDJSON)
                .body(payload)
                .send()
                .await
                .map_err(|e| SyncError::from_reqwest("bulk", e))?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| SyncError::from_reqwest("bulk_body", e))?;
            Ok(BulkResponse { status, body })
        })
    }
}

/// How the index answered a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    PartialFailure { failed_items: usize },
    Rejected { status: u16 },
}

impl PublishOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, PublishOutcome::Published)
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            PublishOutcome::Published => "published",
            PublishOutcome::PartialFailure { .. } => "partial_failure",
            PublishOutcome::Rejected { .. } => "rejected",
        }
    }
}

/// Result of publishing one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishResult {
    pub documents: usize,
    pub outcome: PublishOutcome,
    pub elapsed: Duration,
}

/// Builds payloads and sends them with retry.
pub struct BulkPublisher<S> {
    sink: S,
    index: String,
    policy: BackoffPolicy,
}

impl<S: BulkSink> BulkPublisher<S> {
    pub fn new(sink: S, index: impl Into<String>, policy: BackoffPolicy) -> Self {
        Self {
            sink,
            index: index.into(),
            policy,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Publish one batch. Network failures are retried; item errors and
    /// rejected statuses are reported in the result, not as `Err`.
    #[instrument(skip(self, records), fields(documents = records.len(), index = %self.index))]
    pub async fn publish(&self, records: &[FilmRecord]) -> Result<PublishResult> {
        if records.is_empty() {
            return Ok(PublishResult {
                documents: 0,
                outcome: PublishOutcome::Published,
                elapsed: Duration::ZERO,
            });
        }

        let payload = build_bulk_payload(&self.index, records)?;
        let start = Instant::now();
        let response = self
            .policy
            .retry("bulk", || self.sink.send_bulk(payload.clone()))
            .await?;
        let elapsed = start.elapsed();

        let outcome = if !response.is_success() {
            error!(
                status = response.status,
                body = %response.body_excerpt(),
                "Bulk request rejected"
            );
            PublishOutcome::Rejected { status: response.status }
        } else if let Some(failed_items) = response.failed_items() {
            warn!(failed_items, body = %response.body_excerpt(), "Bulk request had item errors");
            PublishOutcome::PartialFailure { failed_items }
        } else {
            debug!(elapsed_ms = elapsed.as_millis() as u64, "Bulk request accepted");
            PublishOutcome::Published
        };

        Ok(PublishResult {
            documents: records.len(),
            outcome,
            elapsed,
        })
    }
}
