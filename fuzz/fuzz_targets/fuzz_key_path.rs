#![no_main]

use libfuzzer_sys::fuzz_target;
use pathwatch_core::{to_key_path, to_keys};

fuzz_target!(|keys: Vec<String>| {
    if keys.is_empty() {
        return;
    }
    let path = to_key_path(&keys);
    assert_eq!(to_keys(&path), keys);
});
