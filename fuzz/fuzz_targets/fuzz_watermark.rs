//! Fuzz target for stored watermark parsing.
//!
//! Checkpoint values may be written by other tools, so parsing must never
//! panic, and anything that parses must survive a format/parse round trip.

#![no_main]

use chrono::Datelike;
use libfuzzer_sys::fuzz_target;
use search_sync::checkpoint::{format_watermark, parse_watermark};

fuzz_target!(|raw: &str| {
    // Should never panic
    let Ok(ts) = parse_watermark("fuzz", raw) else {
        return;
    };

    // RFC 3339 only covers four-digit years.
    if !(0..=9999).contains(&ts.year()) {
        return;
    }

    let formatted = format_watermark(ts);
    let reparsed = parse_watermark("fuzz", &formatted).expect("formatted watermark must parse");

    // Formatting keeps microseconds; anything finer is dropped.
    assert!(reparsed <= ts);
    assert!(ts - reparsed < chrono::Duration::microseconds(1));
});
