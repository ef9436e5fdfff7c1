//! Fuzz test for decimal amount formatting
//!
//! This fuzz target tests the amount formatter with arbitrary byte sequences
//! to find:
//! - Panics or crashes
//! - Non-canonical output shapes
//! - Inputs where reformatting the output changes it
//!
//! Run with: cargo +nightly fuzz run amount_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use saldo_core::amount::{format_amount, DECIMALS};

fuzz_target!(|data: &[u8]| {
    // Try to interpret the bytes as UTF-8
    // Amounts arrive as strings, so invalid UTF-8 never reaches the formatter
    if let Ok(input) = std::str::from_utf8(data) {
        // The formatter should never panic - it returns Some or None
        let result = format_amount(input);

        match result {
            Some(formatted) => {
                // If formatting succeeded, verify the canonical shape
                let body = formatted.strip_prefix('-').unwrap_or(&formatted);
                let (int_part, frac_part) = body
                    .split_once('.')
                    .expect("formatted amount should contain a scale separator");

                assert_eq!(frac_part.len(), DECIMALS, "fraction should be full scale");
                assert!(!int_part.is_empty(), "integer part should not be empty");
                assert!(int_part.bytes().all(|b| b.is_ascii_digit()),
                    "integer part should be digits only");
                assert!(frac_part.bytes().all(|b| b.is_ascii_digit()),
                    "fraction should be digits only");
                assert!(int_part == "0" || !int_part.starts_with('0'),
                    "integer part should not keep leading zeros");

                // Canonical output must reformat to itself
                assert_eq!(format_amount(&formatted).as_deref(), Some(formatted.as_str()),
                    "canonical output should reformat unchanged");
            }
            None => {
                // Rejection is fine; it just must not panic
            }
        }
    }
});
