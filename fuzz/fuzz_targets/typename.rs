#![no_main]

use exprscope::typename::TypeStructuralReference;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = TypeStructuralReference::parse(input);
    }
});
