//! Fuzz target for sync message decoding.
//!
//! # Safety Properties Tested
//! - No panics on arbitrary input
//! - No unbounded memory allocation
//! - Anything that decodes re-encodes

#![no_main]

use libfuzzer_sys::fuzz_target;
use whack_sync::__internal::{decode_message, encode_message};

fuzz_target!(|data: &[u8]| {
    if let Ok(envelope) = decode_message(data) {
        let encoded = encode_message(&envelope).expect("decoded message re-encodes");
        let again = decode_message(&encoded).expect("re-encoded message decodes");
        // Compared as bytes: poses may carry NaN.
        assert_eq!(encode_message(&again).expect("re-encodes"), encoded);
    }
});
