//! Fuzz target for SessionQueue::ingest
//!
//! Ingests arbitrary bytes once whole and once split at a fuzzer-chosen
//! point. Both sessions must accept the same messages, reject the same
//! number of lines and hold back the same tail, and neither may buffer a
//! full line's worth of bytes.

#![no_main]

use ircc_core::SessionQueue;
use ircc_proto::MAX_LINE_LEN;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&cut, rest)) = data.split_first() else {
        return;
    };
    let at = usize::from(cut).min(rest.len());

    let whole = SessionQueue::new();
    let once = whole.ingest(rest);

    let split = SessionQueue::new();
    let first = split.ingest(&rest[..at]);
    let second = split.ingest(&rest[at..]);

    assert_eq!(once.accepted, first.accepted + second.accepted);
    assert_eq!(once.rejected.len(), first.rejected.len() + second.rejected.len());
    assert_eq!(whole.leftover_len(), split.leftover_len());
    assert!(whole.leftover_len() < MAX_LINE_LEN);

    while let Some(msg) = whole.pop_inbound() {
        assert_eq!(Some(msg), split.pop_inbound());
    }
    assert_eq!(split.inbound_len(), 0);
});
