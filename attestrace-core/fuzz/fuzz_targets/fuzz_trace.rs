#![no_main]

//! Fuzz target for ConversationTrace::from_json()
//!
//! Accepted traces must serialize and produce object keys without panicking.
//!
//! Run with: cargo +nightly fuzz run fuzz_trace

use attestrace_core::ConversationTrace;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(trace) = ConversationTrace::from_json(text) {
        let _ = trace.to_json();
        let _ = trace.log_key("logs");
        let _ = trace.share_key("share");
    }
});
