//! In-memory source database for pipeline tests.
//!
//! Holds persons, genres, films and their links, answers the same queries the
//! PostgreSQL source does, and records every call for assertions. Connections
//! can be killed or made to fail to exercise recovery.

use chrono::{DateTime, TimeZone, Utc};
use search_sync::source::{BoxFuture, ChangedRow, DependentKind, EntityKind, SourceConnection, SourceConnector};
use search_sync::{FilmRecord, PersonRef, SyncError};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Timestamp `secs` seconds after a fixed base instant.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

/// A recorded source call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect,
    Detect { kind: EntityKind, returned: usize },
    Resolve { kind: DependentKind, ids: usize },
    Aggregate { ids: Vec<Uuid> },
}

#[derive(Default)]
struct DbState {
    persons: BTreeMap<Uuid, (String, DateTime<Utc>)>,
    genres: BTreeMap<Uuid, (String, DateTime<Utc>)>,
    films: BTreeMap<Uuid, FilmRecord>,
    person_links: Vec<(Uuid, Uuid, &'static str)>,
    genre_links: Vec<(Uuid, Uuid)>,
    calls: Vec<Call>,
    connections: Vec<Arc<AtomicBool>>,
    failing_connects: u32,
    drop_next_query: bool,
    permanent_aggregate_failures: u32,
    ignore_watermark: bool,
}

/// Shared handle to the in-memory database.
#[derive(Clone, Default)]
pub struct MockDb {
    state: Arc<Mutex<DbState>>,
}

impl MockDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector { db: self.clone() }
    }

    pub fn add_film(&self, title: &str, updated_at: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        self.state
            .lock()
            .unwrap()
            .films
            .insert(id, FilmRecord::bare(id, title, updated_at));
        id
    }

    pub fn add_person(&self, name: &str, updated_at: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().persons.insert(id, (name.to_string(), updated_at));
        id
    }

    pub fn add_genre(&self, name: &str, updated_at: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().genres.insert(id, (name.to_string(), updated_at));
        id
    }

    pub fn credit(&self, person: Uuid, film: Uuid, role: &'static str) {
        self.state.lock().unwrap().person_links.push((person, film, role));
    }

    pub fn tag(&self, genre: Uuid, film: Uuid) {
        self.state.lock().unwrap().genre_links.push((genre, film));
    }

    pub fn touch_film(&self, film: Uuid, updated_at: DateTime<Utc>) {
        if let Some(record) = self.state.lock().unwrap().films.get_mut(&film) {
            record.updated_at = updated_at;
        }
    }

    pub fn touch_person(&self, person: Uuid, updated_at: DateTime<Utc>) {
        if let Some(entry) = self.state.lock().unwrap().persons.get_mut(&person) {
            entry.1 = updated_at;
        }
    }

    pub fn remove_film(&self, film: Uuid) {
        self.state.lock().unwrap().films.remove(&film);
    }

    /// Close every open connection, as a server restart would.
    pub fn kill_connections(&self) {
        for conn in &self.state.lock().unwrap().connections {
            conn.store(false, Ordering::SeqCst);
        }
    }

    /// Refuse the next `n` connection attempts.
    pub fn fail_connects(&self, n: u32) {
        self.state.lock().unwrap().failing_connects = n;
    }

    /// Fail the next query with a connection error and close its connection.
    pub fn drop_next_query(&self) {
        self.state.lock().unwrap().drop_next_query = true;
    }

    /// Fail the next `n` aggregate queries with a permanent error.
    pub fn fail_aggregates(&self, n: u32) {
        self.state.lock().unwrap().permanent_aggregate_failures = n;
    }

    /// Answer change queries with rows at or below the watermark too.
    pub fn replay_stale(&self) {
        self.state.lock().unwrap().ignore_watermark = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn connects(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Connect)).count()
    }

    /// Id batches passed to the aggregate query, in call order.
    pub fn aggregate_calls(&self) -> Vec<Vec<Uuid>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Aggregate { ids } => Some(ids),
                _ => None,
            })
            .collect()
    }
}

/// Opens [`MockConn`]s against a [`MockDb`].
pub struct MockConnector {
    db: MockDb,
}

impl SourceConnector for MockConnector {
    type Conn = MockConn;

    fn connect(&self) -> BoxFuture<'_, MockConn> {
        let result = {
            let mut state = self.db.state.lock().unwrap();
            state.calls.push(Call::Connect);
            if state.failing_connects > 0 {
                state.failing_connects -= 1;
                Err(SyncError::connection("connect", "connection refused"))
            } else {
                let alive = Arc::new(AtomicBool::new(true));
                state.connections.push(alive.clone());
                Ok(MockConn {
                    db: self.db.clone(),
                    alive,
                })
            }
        };
        Box::pin(async move { result })
    }
}

/// One connection to the mock database.
pub struct MockConn {
    db: MockDb,
    alive: Arc<AtomicBool>,
}

impl MockConn {
    /// Common pre-query checks; returns the locked state on success.
    fn begin(&self, operation: &str) -> Result<std::sync::MutexGuard<'_, DbState>, SyncError> {
        let mut state = self.db.state.lock().unwrap();
        if !self.alive.load(Ordering::SeqCst) {
            return Err(SyncError::connection(operation, "connection already closed"));
        }
        if state.drop_next_query {
            state.drop_next_query = false;
            self.alive.store(false, Ordering::SeqCst);
            return Err(SyncError::connection(operation, "server closed the connection unexpectedly"));
        }
        Ok(state)
    }
}

fn page(mut rows: Vec<ChangedRow>, watermark: Option<DateTime<Utc>>, limit: usize) -> Vec<ChangedRow> {
    if let Some(watermark) = watermark {
        rows.retain(|r| r.updated_at > watermark);
    }
    rows.sort_by_key(|r| r.updated_at);
    rows.truncate(limit);
    rows
}

impl SourceConnection for MockConn {
    fn is_closed(&self) -> bool {
        !self.alive.load(Ordering::SeqCst)
    }

    fn changed_since(
        &mut self,
        kind: EntityKind,
        watermark: DateTime<Utc>,
        limit: usize,
    ) -> BoxFuture<'_, Vec<ChangedRow>> {
        let result = self.begin("detect").map(|mut state| {
            let rows: Vec<ChangedRow> = match kind {
                EntityKind::Person => state
                    .persons
                    .iter()
                    .map(|(id, (_, at))| ChangedRow { id: *id, updated_at: *at })
                    .collect(),
                EntityKind::Genre => state
                    .genres
                    .iter()
                    .map(|(id, (_, at))| ChangedRow { id: *id, updated_at: *at })
                    .collect(),
                EntityKind::FilmWork => state
                    .films
                    .values()
                    .map(|f| ChangedRow { id: f.id, updated_at: f.updated_at })
                    .collect(),
            };
            let floor = (!state.ignore_watermark).then_some(watermark);
            let rows = page(rows, floor, limit);
            state.calls.push(Call::Detect { kind, returned: rows.len() });
            rows
        });
        Box::pin(async move { result })
    }

    fn films_referencing(&mut self, kind: DependentKind, ids: Vec<Uuid>) -> BoxFuture<'_, Vec<Uuid>> {
        let result = self.begin("resolve").map(|mut state| {
            let wanted: HashSet<Uuid> = ids.iter().copied().collect();
            let linked: Vec<Uuid> = match kind {
                DependentKind::Person => state
                    .person_links
                    .iter()
                    .filter(|(p, _, _)| wanted.contains(p))
                    .map(|(_, f, _)| *f)
                    .collect(),
                DependentKind::Genre => state
                    .genre_links
                    .iter()
                    .filter(|(g, _)| wanted.contains(g))
                    .map(|(_, f)| *f)
                    .collect(),
            };
            let mut seen = HashSet::new();
            let mut films: Vec<&FilmRecord> = linked
                .into_iter()
                .filter(|f| seen.insert(*f))
                .filter_map(|f| state.films.get(&f))
                .collect();
            films.sort_by_key(|f| f.updated_at);
            let films: Vec<Uuid> = films.into_iter().map(|f| f.id).collect();
            state.calls.push(Call::Resolve { kind, ids: ids.len() });
            films
        });
        Box::pin(async move { result })
    }

    fn fetch_films(&mut self, ids: Vec<Uuid>) -> BoxFuture<'_, Vec<FilmRecord>> {
        let result: Result<Vec<FilmRecord>, SyncError> = self.begin("aggregate").and_then(|mut state| {
            state.calls.push(Call::Aggregate { ids: ids.clone() });
            if state.permanent_aggregate_failures > 0 {
                state.permanent_aggregate_failures -= 1;
                return Err(SyncError::query("aggregate", "column fw.rating does not exist"));
            }
            let state = &*state;
            Ok(ids
                .iter()
                .filter_map(|id| state.films.get(id))
                .map(|film| with_credits(state, film))
                .collect())
        });
        Box::pin(async move { result })
    }
}

/// Attach credits and genres the way the aggregate query would.
fn with_credits(state: &DbState, film: &FilmRecord) -> FilmRecord {
    let mut record = film.clone();
    for (person, linked, role) in &state.person_links {
        if *linked != film.id {
            continue;
        }
        let Some((name, _)) = state.persons.get(person) else { continue };
        let credit = PersonRef { id: *person, name: name.clone() };
        let (names, people) = match *role {
            "actor" => (&mut record.actors_names, &mut record.actors),
            "writer" => (&mut record.writers_names, &mut record.writers),
            _ => (&mut record.directors_names, &mut record.directors),
        };
        names.push(name.clone());
        people.push(credit);
    }
    for (genre, linked) in &state.genre_links {
        if *linked == film.id {
            if let Some((name, _)) = state.genres.get(genre) {
                record.genres.push(name.clone());
            }
        }
    }
    record
}
