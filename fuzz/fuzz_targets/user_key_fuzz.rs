//! Fuzz test for the user-scoped store key codec
//!
//! This fuzz target tests key decoding with arbitrary byte sequences to find:
//! - Panics or crashes
//! - Keys that decode but do not re-encode to the same bytes
//! - Accepted keys whose prefix does not match their user
//!
//! Run with: cargo +nightly fuzz run user_key_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use saldo_storage::UserScopedKey;

fuzz_target!(|data: &[u8]| {
    // Decoding should never panic - it returns Some or None
    match UserScopedKey::decode(data) {
        Some(key) => {
            // Anything that decodes must re-encode to the exact input bytes
            let encoded = key.encode();
            assert_eq!(&encoded[..], data, "decoded key should re-encode to the input");

            // The user prefix covers everything but the kind byte
            let prefix = UserScopedKey::user_prefix(key.user_id());
            assert_eq!(&encoded[0..17], &prefix[..],
                "key should start with its user prefix");

            // A second pass through the codec is stable
            assert_eq!(UserScopedKey::decode(&encoded), Some(key),
                "re-decoding should be stable");
        }
        None => {
            // Rejection is fine; it just must not panic
        }
    }

    // Also force the frame bytes into shape, so the accepting path sees
    // arbitrary user ids instead of only well-formed corpus entries
    if data.len() >= 18 {
        let mut framed = [0u8; 18];
        framed.copy_from_slice(&data[0..18]);
        framed[16] = 0xFF;
        framed[17] &= 1;

        let key = UserScopedKey::decode(&framed).expect("framed key should decode");
        assert_eq!(key.encode(), framed, "framed key should roundtrip");
    }
});
