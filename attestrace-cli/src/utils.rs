//! Common utility functions shared across CLI commands.

use std::path::Path;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Read a file, naming it in the error.
pub fn read_input(path: &Path, what: &str) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}: {}", what, path.display()))
}

/// Normalise an attestation file to the base64 text a client would send.
///
/// Files holding base64 (optionally wrapped) are used as-is; anything else is
/// treated as raw CBOR and encoded.
pub fn attestation_base64(contents: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(contents) {
        let compact: String = text.split_whitespace().collect();
        if !compact.is_empty() && STANDARD.decode(&compact).is_ok() {
            debug!(format = "base64", "Read attestation");
            return compact;
        }
    }
    debug!(format = "cbor", "Read attestation");
    STANDARD.encode(contents)
}

/// Resolve an optional Unix timestamp to a UTC instant, defaulting to now.
pub fn resolve_time(at: Option<i64>) -> Result<DateTime<Utc>> {
    match at {
        Some(secs) => DateTime::<Utc>::from_timestamp(secs, 0)
            .with_context(|| format!("Invalid argument: --at {} is out of range", secs)),
        None => Ok(Utc::now()),
    }
}

/// Format a UTC instant as a human-readable string.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
