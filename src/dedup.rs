//! Per-cycle film deduplication.
//!
//! A film touched by a changed person, a changed genre and its own row in the
//! same cycle is published once. The orchestrator creates a fresh [`DedupSet`]
//! at the start of every cycle and lends it to each stream.

use std::collections::HashSet;
use uuid::Uuid;

/// Film ids already claimed in the current cycle.
#[derive(Debug, Default, Clone)]
pub struct DedupSet {
    claimed: HashSet<Uuid>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the candidates not claimed yet, in input order, and claim them.
    ///
    /// Repeats inside `candidates` collapse to their first occurrence.
    pub fn claim<I>(&mut self, candidates: I) -> Vec<Uuid>
    where
        I: IntoIterator<Item = Uuid>,
    {
        candidates
            .into_iter()
            .filter(|id| self.claimed.insert(*id))
            .collect()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.claimed.contains(id)
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}
