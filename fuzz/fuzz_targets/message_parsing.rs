//! Fuzz target for ratchet message parsing

#![no_main]

use axon_protocol::RatchetMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = RatchetMessage::from_bytes(data) {
        let serialized = message.to_bytes();
        let roundtrip = RatchetMessage::from_bytes(&serialized).expect("roundtrip should succeed");

        assert_eq!(message, roundtrip);
        assert_eq!(serialized, data);
    }
});
