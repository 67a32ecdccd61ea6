//! Film aggregation.
//!
//! One query denormalizes a batch of films with their genres and credits.
//! Each role gets two aggregates: the distinct names, and the distinct
//! `{id, name}` objects.

use crate::error::Result;
use crate::model::{FilmRecord, PersonRef};
use crate::source::{SourceConnection, SourceConnector, SourceSession};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// Aggregate query; `$1` is the `uuid[]` of requested film ids.
pub const FILMS_QUERY: &str = r#"
SELECT
    fw.id,
    fw.title,
    fw.description,
    fw.rating AS imdb_rating,
    fw.type AS film_type,
    fw.created_at,
    fw.updated_at,
    array_agg(DISTINCT g.name) FILTER (WHERE g.name IS NOT NULL) AS genres,
    array_agg(DISTINCT p.full_name) FILTER (WHERE pfw.role = 'actor') AS actors_names,
    array_agg(DISTINCT p.full_name) FILTER (WHERE pfw.role = 'writer') AS writers_names,
    array_agg(DISTINCT p.full_name) FILTER (WHERE pfw.role = 'director') AS directors_names,
    json_agg(DISTINCT jsonb_build_object('id', p.id, 'name', p.full_name))
        FILTER (WHERE pfw.role = 'actor') AS actors,
    json_agg(DISTINCT jsonb_build_object('id', p.id, 'name', p.full_name))
        FILTER (WHERE pfw.role = 'writer') AS writers,
    json_agg(DISTINCT jsonb_build_object('id', p.id, 'name', p.full_name))
        FILTER (WHERE pfw.role = 'director') AS directors
FROM content.film_work fw
LEFT JOIN content.person_film_work pfw ON pfw.film_work_id = fw.id
LEFT JOIN content.person p ON p.id = pfw.person_id
LEFT JOIN content.genre_film_work gfw ON gfw.film_work_id = fw.id
LEFT JOIN content.genre g ON g.id = gfw.genre_id
WHERE fw.id = ANY($1)
GROUP BY fw.id
"#;

/// Raw row of [`FILMS_QUERY`]. Aggregates are NULL when nothing matched.
#[derive(Debug, sqlx::FromRow)]
pub struct FilmRow {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub imdb_rating: Option<f64>,
    pub film_type: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub genres: Option<Vec<String>>,
    pub actors_names: Option<Vec<String>>,
    pub writers_names: Option<Vec<String>>,
    pub directors_names: Option<Vec<String>>,
    pub actors: Option<Json<Vec<PersonRef>>>,
    pub writers: Option<Json<Vec<PersonRef>>>,
    pub directors: Option<Json<Vec<PersonRef>>>,
}

impl FilmRow {
    pub fn into_record(self) -> FilmRecord {
        fn people(list: Option<Json<Vec<PersonRef>>>) -> Vec<PersonRef> {
            let mut people = list.map(|Json(v)| v).unwrap_or_default();
            people.sort();
            people
        }

        FilmRecord {
            id: self.id,
            title: self.title,
            description: self.description.filter(|d| !d.is_empty()),
            imdb_rating: self.imdb_rating,
            film_type: self.film_type,
            created_at: self.created_at,
            updated_at: self.updated_at,
            genres: self.genres.unwrap_or_default(),
            actors_names: self.actors_names.unwrap_or_default(),
            writers_names: self.writers_names.unwrap_or_default(),
            directors_names: self.directors_names.unwrap_or_default(),
            actors: people(self.actors),
            writers: people(self.writers),
            directors: people(self.directors),
        }
    }
}

/// Fetch aggregated records for `ids`, in request order.
///
/// Ids that no longer exist are omitted. An empty request issues no query.
pub async fn fetch<C: SourceConnector>(session: &mut SourceSession<C>, ids: &[Uuid]) -> Result<Vec<FilmRecord>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let request = ids.to_vec();
    let records = session
        .run("aggregate", |conn| conn.fetch_films(request.clone()))
        .await?;

    let mut by_id: HashMap<Uuid, FilmRecord> = records.into_iter().map(|r| (r.id, r)).collect();
    let ordered: Vec<FilmRecord> = ids.iter().filter_map(|id| by_id.remove(id)).collect();

    if ordered.len() < ids.len() {
        warn!(
            requested = ids.len(),
            found = ordered.len(),
            "Some films vanished before aggregation"
        );
    }
    debug!(films = ordered.len(), "Aggregated films");
    Ok(ordered)
}
