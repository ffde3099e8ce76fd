//! Request routing
//!
//! Both operations share one endpoint; the body decides which one runs.

use serde_json::{Map, Value};

pub const ATTESTATION_OBJECT_FIELD: &str = "attestation_object";
pub const KEY_ID_FIELD: &str = "key_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Derive and return the challenge for `key_id`
    IssueChallenge,
    /// Verify the attestation, then persist and render the trace
    SubmitTrace,
}

impl Route {
    /// `SubmitTrace` iff the body carries an `attestation_object` field,
    /// whatever its value.
    pub fn for_body(body: &Map<String, Value>) -> Self {
        if body.contains_key(ATTESTATION_OBJECT_FIELD) {
            Self::SubmitTrace
        } else {
            Self::IssueChallenge
        }
    }
}
