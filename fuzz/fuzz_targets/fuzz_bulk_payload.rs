//! Fuzz target for bulk payload serialization.
//!
//! Arbitrary titles, descriptions and names must always yield one action
//! line and one document line per film.

#![no_main]

use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;
use search_sync::publisher::build_bulk_payload;
use search_sync::{FilmRecord, PersonRef};
use uuid::Uuid;

fuzz_target!(|data: (Vec<(String, Option<String>, Vec<String>)>, i64)| {
    let (films, secs) = data;
    let Some(updated_at) = Utc.timestamp_opt(secs, 0).single() else {
        return;
    };

    let records: Vec<FilmRecord> = films
        .into_iter()
        .map(|(title, description, names)| {
            let mut record = FilmRecord::bare(Uuid::from_u128(secs as u128), title, updated_at);
            record.description = description;
            record.actors = names
                .iter()
                .map(|name| PersonRef { id: Uuid::nil(), name: name.clone() })
                .collect();
            record.actors_names = names;
            record
        })
        .collect();

    let payload = build_bulk_payload("movies", &records).expect("film records always serialize");
    assert_eq!(payload.lines().count(), records.len() * 2);
    assert!(records.is_empty() || payload.ends_with('\n'));
});
