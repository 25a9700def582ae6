#![no_main]

use dcf_core::event::normalize_event_name;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|name: &str| {
    let once = normalize_event_name(name);
    assert!(once.starts_with("on"));
    assert_eq!(normalize_event_name(&once), once);
});
