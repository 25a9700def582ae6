#![no_main]

use dcf_render::ops::BatchedUpdate;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(batch) = BatchedUpdate::from_json(text) else {
        return;
    };
    // Anything accepted must survive a second trip unchanged.
    let Ok(encoded) = batch.to_json() else {
        return;
    };
    let again = BatchedUpdate::from_json(&encoded).expect("re-encoded batch must parse");
    assert_eq!(again, batch);
});
