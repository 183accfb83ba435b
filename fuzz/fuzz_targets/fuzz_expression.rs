#![no_main]

use libfuzzer_sys::fuzz_target;
use strata::domain::actions::Expr;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        // Errors are fine, panics are not
        if let Err(e) = Expr::parse(source) {
            assert!(e.offset <= source.len());
        }
    }
});
