//! Fuzz target for OTPL reading and conversion to standoff.
//!
//! Feeds arbitrary UTF-8 through the lenient reader and converter,
//! checking for panics, crashes, or hangs.

#![no_main]

use libfuzzer_sys::fuzz_target;
use otplc::{Configuration, OtplBratConverter};

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(otpl) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(config) = Configuration::builder().colspec("tagged-full").lenient(true).build() else {
        return;
    };
    let _ = OtplBratConverter::new(config).otpl_text_to_brat(otpl, None);
});
