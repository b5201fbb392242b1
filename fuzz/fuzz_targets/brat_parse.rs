//! Fuzz target for brat standoff parsing.
//!
//! Parses arbitrary UTF-8 in both policies and re-serializes whatever
//! the lenient parse accepted.

#![no_main]

use libfuzzer_sys::fuzz_target;
use otplc::brat;
use otplc::Policy;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(ann) = std::str::from_utf8(data) else {
        return;
    };

    let _ = brat::parse(ann, Policy::Strict);
    if let Ok(parsed) = brat::parse(ann, Policy::Lenient) {
        let _ = brat::serialize(&parsed.annotations);
    }
});
