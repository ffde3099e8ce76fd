#![no_main]

//! Fuzz target for App Attest object verification
//!
//! Feeds arbitrary bytes through CBOR decoding, authenticator data parsing,
//! certificate decoding and chain validation. Every input must be rejected
//! without panicking.
//!
//! Run with: cargo +nightly fuzz run fuzz_attestation

use std::sync::OnceLock;

use attestrace_core::test_support::{test_challenges, TestPki, TEST_APP_ID};
use attestrace_core::{Challenge, TrustRoot, VerificationContext};
use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;

fn fixture() -> &'static (TrustRoot, Challenge) {
    static FIXTURE: OnceLock<(TrustRoot, Challenge)> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        let pki = TestPki::generate();
        let challenge = test_challenges().generate_challenge("fuzz-key").unwrap();
        (pki.trust_root(), challenge)
    })
}

fuzz_target!(|data: &[u8]| {
    let (root, challenge) = fixture();
    let context = VerificationContext {
        key_id: b"fuzz-key",
        app_id: TEST_APP_ID,
        production: false,
        trust_root: root,
    };
    let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let _ = context.verify(data, challenge, at);
});
