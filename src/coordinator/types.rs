//! Synchronizer phase and report types.
//!
//! # Phase Transitions
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ↓                                              │
//! SyncPersons ──→ SyncGenres ──→ SyncFilms ──→ CycleSleep ──┘
//!                                                 │
//!                                         (shutdown signal)
//!                                                 ↓
//!                                              Stopped
//! ```
//!
//! - **SyncPersons**: changed persons, resolved to the films crediting them.
//! - **SyncGenres**: changed genres, resolved to the films tagged with them.
//! - **SyncFilms**: changed films themselves.
//! - **CycleSleep**: waiting `update_period` before the next cycle.
//! - **Stopped**: a shutdown signal ended the run loop.

use std::time::Duration;

/// Where the synchronizer is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    /// Created, no cycle run yet.
    Idle,
    SyncPersons,
    SyncGenres,
    SyncFilms,
    CycleSleep,
    /// Shutdown observed.
    Stopped,
}

impl SyncPhase {
    /// Snake-case label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::SyncPersons => "sync_persons",
            SyncPhase::SyncGenres => "sync_genres",
            SyncPhase::SyncFilms => "sync_films",
            SyncPhase::CycleSleep => "cycle_sleep",
            SyncPhase::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Idle => write!(f, "Idle"),
            SyncPhase::SyncPersons => write!(f, "SyncPersons"),
            SyncPhase::SyncGenres => write!(f, "SyncGenres"),
            SyncPhase::SyncFilms => write!(f, "SyncFilms"),
            SyncPhase::CycleSleep => write!(f, "CycleSleep"),
            SyncPhase::Stopped => write!(f, "Stopped"),
        }
    }
}

/// What one stream did in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamReport {
    pub stream: &'static str,
    /// Non-empty detect pages processed.
    pub pages: usize,
    /// Changed rows seen across all pages.
    pub rows_detected: usize,
    /// Films newly claimed by this stream.
    pub films_claimed: usize,
    /// Films skipped because an earlier stream claimed them.
    pub films_deduplicated: usize,
    /// Bulk requests sent.
    pub batches: usize,
    /// Documents in accepted bulk requests.
    pub documents_published: usize,
    /// Bulk requests with item errors or a rejected status.
    pub failed_batches: usize,
    /// Times the watermark moved.
    pub watermark_advances: usize,
}

/// What one full cycle did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub streams: Vec<StreamReport>,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn documents_published(&self) -> usize {
        self.streams.iter().map(|s| s.documents_published).sum()
    }

    pub fn failed_batches(&self) -> usize {
        self.streams.iter().map(|s| s.failed_batches).sum()
    }

    pub fn stream(&self, name: &str) -> Option<&StreamReport> {
        self.streams.iter().find(|s| s.stream == name)
    }
}
