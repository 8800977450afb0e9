//! Fuzz target for Message::parse
//!
//! Feeds arbitrary bytes through the streaming parser to find:
//! - Panics on malformed prefixes, commands or parameters
//! - Buffers that stop shrinking while complete lines remain
//! - Parsed messages that cannot be re-encoded after validation
//!
//! The parser should NEVER panic. Bad lines return an error and are consumed.

#![no_main]

use bytes::BytesMut;
use ircc_proto::Message;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    loop {
        let before = buf.len();
        match Message::parse(&mut buf) {
            Ok(msg) => {
                if msg.validate().is_ok() {
                    let wire = msg.to_wire().expect("validated message must encode");
                    let reparsed = Message::parse(&mut BytesMut::from(&wire[..]))
                        .expect("encoded message must parse");
                    assert_eq!(msg, reparsed);
                }
            },
            Err(e) if e.is_incomplete() => break,
            Err(_) => {},
        }
        assert!(buf.len() < before, "parse must consume a complete line");
    }
});
