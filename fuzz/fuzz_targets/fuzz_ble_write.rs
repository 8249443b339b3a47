//! Fuzz target: BLE write path
//!
//! Drives arbitrary bytes through the bridge frame decoder and the
//! credential payload parser, asserting neither panics and that anything
//! accepted satisfies the credential rule.
//!
//! cargo fuzz run fuzz_ble_write

#![no_main]

use framekeeper::adapters::ble_transport::{BridgeRequest, decode_request};
use framekeeper::credentials::{Credentials, validate};
use libfuzzer_sys::fuzz_target;

fn check_payload(bytes: &[u8]) {
    if let Ok(Ok(creds)) = Credentials::from_ble_payload(bytes) {
        assert!(
            validate(creds.network_id(), creds.secret()).is_ok(),
            "accepted credentials must be non-blank"
        );
    }
}

fuzz_target!(|data: &[u8]| {
    // As a raw characteristic value.
    check_payload(data);

    // As a bridge frame; a decoded write carries its own value.
    if let Ok(BridgeRequest::Write { value, .. }) = decode_request(data) {
        check_payload(value.as_bytes());
    }
});
