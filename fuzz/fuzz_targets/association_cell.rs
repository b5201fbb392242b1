//! Fuzz target for RELATION_TAG/EVENT_TAG cell parsing.
//!
//! Every cell that parses must render to text that parses back to the
//! same items.

#![no_main]

use libfuzzer_sys::fuzz_target;
use otplc::otpl::association::fuzz_cell_round_trip;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    let Ok(cell) = std::str::from_utf8(data) else {
        return;
    };

    let _ = fuzz_cell_round_trip(cell, "NULL");
});
