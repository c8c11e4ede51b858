//! Fuzz target for prekey bundle parsing and signature verification

#![no_main]

use axon_protocol::PreKeyBundle;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(bundle) = PreKeyBundle::from_bytes(data) {
        let serialized = bundle.to_bytes();
        assert_eq!(serialized, data);

        // Verification of an arbitrary bundle must not panic; it almost
        // always fails, and that is fine.
        let _ = bundle.verify_signature();
    }
});
