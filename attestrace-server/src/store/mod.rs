//! Blob storage for persisted traces and share pages
//!
//! One `put` per object, no retries; a failed write fails the request.

mod fs;
mod http;
mod memory;

pub use fs::FsBlobStore;
pub use http::HttpBlobStore;
pub use memory::{MemoryBlobStore, StoredObject};

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::config::{Config, StoreBackend};

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid object key {key:?}")]
    InvalidKey { key: String },

    #[error("I/O error writing {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP request for {key} failed: {source}")]
    Http {
        key: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Store returned status {status} for {key}")]
    Status { key: String, status: u16 },

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

/// Object store the dispatcher writes traces and share pages to
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `body` under `key`, replacing any existing object.
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StoreError>;

    /// URL under which `key` is served.
    fn public_url(&self, key: &str) -> String;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Build the store selected by configuration.
pub fn from_config(config: &Config) -> Result<Arc<dyn BlobStore>, StoreError> {
    let base = config.public_base_url.clone();
    let store: Arc<dyn BlobStore> = match &config.store {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory blob store - traces will be lost on restart!");
            Arc::new(MemoryBlobStore::new(base))
        }
        StoreBackend::Fs { root } => Arc::new(FsBlobStore::new(root.clone(), base)),
        StoreBackend::Http { endpoint } => {
            Arc::new(HttpBlobStore::new(endpoint, &config.bucket, base)?)
        }
    };
    tracing::info!(backend = store.name(), "Blob store configured");
    Ok(store)
}

/// Reject keys that are empty, absolute or contain empty, `.` or `..` segments.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && !key.contains('\\')
        && key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey {
            key: key.to_string(),
        })
    }
}

/// Append the segments of `key` to the path of `base`, percent-encoding
/// each segment.
pub(crate) fn join_url(base: &str, key: &str) -> String {
    let Ok(mut url) = Url::parse(base) else {
        return format!("{}/{}", base.trim_end_matches('/'), key);
    };
    match url.path_segments_mut() {
        Ok(mut segments) => {
            segments.pop_if_empty().extend(key.split('/'));
        }
        Err(()) => return format!("{}/{}", base.trim_end_matches('/'), key),
    }
    url.into()
}
