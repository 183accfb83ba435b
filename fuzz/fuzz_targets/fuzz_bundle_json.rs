#![no_main]

use libfuzzer_sys::fuzz_target;
use strata::{CompilePipeline, SpecBundle};

fuzz_target!(|data: &[u8]| {
    if let Ok(bundle) = serde_json::from_slice::<SpecBundle>(data) {
        // Any bundle either compiles or fails with a classified error
        let _ = CompilePipeline::default().run(&bundle);
    }
});
