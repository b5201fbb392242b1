//! Fuzz target for colspec guessing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use otplc::{guess_colspec, Configuration};

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    let Ok(otpl) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(guess) = guess_colspec(otpl, &Configuration::default()) {
        assert!(guess.colspec.arity() > 0);
    }
});
