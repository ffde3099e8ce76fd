//! HTTP blob store for S3-compatible gateways
//!
//! Issues `PUT {endpoint}/{bucket}/{key}` with the object's content type.
//! Request signing is left to the gateway.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{header, Client};

use super::{join_url, validate_key, BlobStore, StoreError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: Client,
    bucket_url: String,
    public_base_url: String,
}

impl HttpBlobStore {
    pub fn new(
        endpoint: &str,
        bucket: &str,
        public_base_url: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Client(e.to_string()))?;

        Ok(Self {
            client,
            bucket_url: join_url(endpoint, bucket),
            public_base_url: public_base_url.into(),
        })
    }

    pub fn object_url(&self, key: &str) -> String {
        join_url(&self.bucket_url, key)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        let start = Instant::now();

        let response = self
            .client
            .put(self.object_url(key))
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|source| StoreError::Http {
                key: key.to_string(),
                source,
            })?;

        let status = response.status();
        let latency_ms = start.elapsed().as_millis() as u64;
        if !status.is_success() {
            tracing::warn!(status = %status, latency_ms, key, "Object store rejected write");
            return Err(StoreError::Status {
                key: key.to_string(),
                status: status.as_u16(),
            });
        }

        tracing::debug!(status = %status, latency_ms, key, "Object written");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base_url, key)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url() {
        let store = HttpBlobStore::new("http://localhost:9000/", "traces", "https://cdn").unwrap();
        assert_eq!(
            store.object_url("logs/m/20240101/1.json"),
            "http://localhost:9000/traces/logs/m/20240101/1.json"
        );
        assert_eq!(store.public_url("share/x.html"), "https://cdn/share/x.html");
    }

    #[test]
    fn test_object_url_keeps_fragment_characters_in_path() {
        let store = HttpBlobStore::new("http://localhost:9000", "traces", "https://cdn").unwrap();
        let url = url::Url::parse(&store.object_url("logs/m/20240101/a#b.json")).unwrap();
        assert_eq!(url.path(), "/traces/logs/m/20240101/a%23b.json");
        assert_eq!(url.fragment(), None);
    }
}
