//! Fuzz target for ratchet header parsing

#![no_main]

use axon_protocol::RatchetHeader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Parsing arbitrary bytes must never panic.
    if let Ok(header) = RatchetHeader::from_bytes(data) {
        let serialized = header.to_bytes();
        let roundtrip = RatchetHeader::from_bytes(&serialized).expect("roundtrip should succeed");

        assert_eq!(header, roundtrip);
    }
});
