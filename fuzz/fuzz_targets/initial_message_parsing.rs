//! Fuzz target for initial handshake message parsing

#![no_main]

use axon_protocol::InitialMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = InitialMessage::from_bytes(data) {
        let serialized = message.to_bytes();
        assert_eq!(serialized, data);
    }
});
