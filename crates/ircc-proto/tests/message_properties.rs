//! Property-based tests for message parsing and serialization
//!
//! These cover the wire guarantees the rest of the client leans on: framing
//! survives arbitrary read boundaries, canonical lines reproduce
//! byte-for-byte, and oversize messages are rejected instead of truncated.

use bytes::BytesMut;
use ircc_proto::{MAX_LINE_LEN, Message, ProtocolError};
use proptest::prelude::*;

/// Strategy for a middle parameter: one token, no leading colon
fn middle_param() -> impl Strategy<Value = String> {
    "[!-9;-~][!-~]{0,15}"
}

/// Strategy for arbitrary well-formed messages well under the size limit
fn arbitrary_message() -> impl Strategy<Value = Message> {
    (
        proptest::option::of("[a-z]{1,9}![a-z]{1,9}@[a-z.]{1,20}"),
        prop_oneof!["[A-Za-z]{1,10}", "[0-9]{3}"],
        prop::collection::vec(middle_param(), 0..4),
        proptest::option::of("[ -~]{0,80}"),
    )
        .prop_map(|(prefix, command, middle, last)| {
            let msg = Message::new(command, middle.into_iter().chain(last));
            match prefix {
                Some(prefix) => msg.with_prefix(prefix),
                None => msg,
            }
        })
}

/// Split `bytes` at the given (sorted, deduplicated) cut points
fn split_at_cuts(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for &cut in cuts {
        let cut = cut.min(bytes.len());
        if cut > start {
            chunks.push(bytes[start..cut].to_vec());
            start = cut;
        }
    }
    chunks.push(bytes[start..].to_vec());
    chunks
}

#[test]
fn prop_parse_is_independent_of_read_boundaries() {
    proptest!(|(
        messages in prop::collection::vec(arbitrary_message(), 1..8),
        mut cuts in prop::collection::vec(0usize..2048, 0..12),
    )| {
        let mut wire = Vec::new();
        for msg in &messages {
            wire.extend_from_slice(&msg.to_wire().expect("encode should succeed"));
        }
        cuts.sort_unstable();
        cuts.dedup();

        let mut leftover = BytesMut::new();
        let mut parsed = Vec::new();
        for chunk in split_at_cuts(&wire, &cuts) {
            leftover.extend_from_slice(&chunk);
            loop {
                match Message::parse(&mut leftover) {
                    Ok(msg) => parsed.push(msg),
                    Err(ProtocolError::Incomplete { .. }) => break,
                    Err(e) => return Err(TestCaseError::fail(format!("unexpected error: {e}"))),
                }
            }
        }

        // PROPERTY: same messages, same order, nothing left over
        prop_assert_eq!(parsed, messages);
        prop_assert!(leftover.is_empty());
    });
}

#[test]
fn prop_canonical_line_reproduces_exactly() {
    proptest!(|(msg in arbitrary_message())| {
        let canonical = msg.to_wire().expect("encode should succeed");

        let mut buf = BytesMut::from(&canonical[..]);
        let parsed = Message::parse(&mut buf).expect("parse should succeed");
        let reencoded = parsed.to_wire().expect("re-encode should succeed");

        // PROPERTY: serialize(parse(line)) == line for canonical lines
        prop_assert_eq!(&reencoded[..], &canonical[..]);
    });
}

#[test]
fn prop_round_trip_preserves_fields() {
    proptest!(|(msg in arbitrary_message())| {
        let mut buf = BytesMut::from(&msg.to_wire().expect("encode should succeed")[..]);
        let parsed = Message::parse(&mut buf).expect("parse should succeed");

        prop_assert_eq!(parsed.prefix(), msg.prefix());
        prop_assert_eq!(parsed.command(), msg.command());
        prop_assert_eq!(parsed.params(), msg.params());
    });
}

#[test]
fn prop_oversize_always_rejected() {
    proptest!(|(extra in 1usize..1024, command in "[A-Z]{1,8}")| {
        // "<command> :<text>\r\n"
        let text = "a".repeat(MAX_LINE_LEN - command.len() - 4 + extra);
        let msg = Message::new(command, [text]);

        prop_assert!(msg.encoded_len() > MAX_LINE_LEN);

        let mut out = Vec::new();
        let result = msg.encode(&mut out);

        // PROPERTY: never truncates, never writes a partial line
        prop_assert!(matches!(result, Err(ProtocolError::MessageTooLong { .. })), "got {:?}", result);
        prop_assert!(out.is_empty());
    });
}

#[test]
fn ping_pong_end_to_end() {
    let mut buf = BytesMut::from(&b"PING :abc\r\n"[..]);
    let ping = Message::parse(&mut buf).expect("parse should succeed");

    assert_eq!(ping.prefix(), None);
    assert_eq!(ping.command(), "PING");
    assert_eq!(ping.params(), ["abc"]);

    let pong = Message::new("PONG", ping.params().iter().take(1).cloned());
    assert_eq!(&pong.to_wire().expect("encode should succeed")[..], b"PONG :abc\r\n");
}

#[test]
fn command_case_is_preserved() {
    let mut buf = BytesMut::from(&b"foo bar\r\nPRIVMSG #x :hi there\r\n"[..]);

    let first = Message::parse(&mut buf).expect("first should parse");
    let second = Message::parse(&mut buf).expect("second should parse");

    assert_eq!(first.command(), "foo");
    assert_eq!(first.params(), ["bar"]);
    assert_eq!(second.command(), "PRIVMSG");
    assert_eq!(second.params(), ["#x", "hi there"]);
    assert!(buf.is_empty());
}
