//! Film records and their search-index document shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder indexed when a film has no description.
pub const DESCRIPTION_PLACEHOLDER: &str = "Description in progress...";

/// A person credited on a film, as indexed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonRef {
    pub id: Uuid,
    pub name: String,
}

/// A fully aggregated film, ready to publish.
///
/// Aggregate lists are never null: a film without writers has an empty
/// `writers` and `writers_names`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilmRecord {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub imdb_rating: Option<f64>,
    pub film_type: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub genres: Vec<String>,
    pub actors_names: Vec<String>,
    pub writers_names: Vec<String>,
    pub directors_names: Vec<String>,
    pub actors: Vec<PersonRef>,
    pub writers: Vec<PersonRef>,
    pub directors: Vec<PersonRef>,
}

impl FilmRecord {
    /// A film with no credits or genres. Used by tests and mocks.
    pub fn bare(id: Uuid, title: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            description: None,
            imdb_rating: None,
            film_type: "movie".to_string(),
            created_at: None,
            updated_at,
            genres: Vec::new(),
            actors_names: Vec::new(),
            writers_names: Vec::new(),
            directors_names: Vec::new(),
            actors: Vec::new(),
            writers: Vec::new(),
            directors: Vec::new(),
        }
    }

    /// The JSON document body sent to the index.
    pub fn document(&self) -> FilmDocument<'_> {
        FilmDocument {
            id: self.id,
            imdb_rating: self.imdb_rating,
            genres: &self.genres,
            title: &self.title,
            description: self.description.as_deref().unwrap_or(DESCRIPTION_PLACEHOLDER),
            directors_names: &self.directors_names,
            actors_names: &self.actors_names,
            writers_names: &self.writers_names,
            directors: &self.directors,
            actors: &self.actors,
            writers: &self.writers,
        }
    }
}

/// Borrowed view of a [`FilmRecord`] with the index field names.
#[derive(Debug, Serialize)]
pub struct FilmDocument<'a> {
    pub id: Uuid,
    pub imdb_rating: Option<f64>,
    pub genres: &'a [String],
    pub title: &'a str,
    pub description: &'a str,
    pub directors_names: &'a [String],
    pub actors_names: &'a [String],
    pub writers_names: &'a [String],
    pub directors: &'a [PersonRef],
    pub actors: &'a [PersonRef],
    pub writers: &'a [PersonRef],
}
