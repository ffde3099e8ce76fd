//! Application state module
//!
//! Immutable state built once from [`Config`] and shared by every request.

use std::sync::Arc;

use attestrace_core::{AttestationVerifier, ChallengeGenerator, DeploymentTier, ShareTemplate};

use crate::config::{Config, ConfigError};
use crate::store::{self, BlobStore};

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Challenge derivation keyed by the server secret
    pub challenges: ChallengeGenerator,
    /// App Attest verifier for the configured app and tier
    pub verifier: Arc<AttestationVerifier>,
    /// Destination for trace JSON and share pages
    pub store: Arc<dyn BlobStore>,
    /// Share-page template
    pub template: ShareTemplate,
    pub log_prefix: Arc<str>,
    pub share_prefix: Arc<str>,
    /// Request size ceiling in bytes
    pub max_request_size_bytes: usize,
}

impl AppState {
    /// Build state from configuration, creating the configured store and
    /// loading the share template.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let store = store::from_config(config).map_err(|e| ConfigError::Invalid {
            name: "STORE_BACKEND",
            reason: e.to_string(),
        })?;
        let template = match &config.template_path {
            Some(path) => {
                let source =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Template {
                        path: path.clone(),
                        source,
                    })?;
                tracing::info!(path = %path.display(), "Loaded share template");
                ShareTemplate::new(source)
            }
            None => ShareTemplate::builtin(),
        };
        Ok(Self::with_store(config, store, template))
    }

    /// Build state around an existing store.
    pub fn with_store(config: &Config, store: Arc<dyn BlobStore>, template: ShareTemplate) -> Self {
        let challenges = ChallengeGenerator::new(config.secret.clone());
        let verifier = AttestationVerifier::new(
            challenges.clone(),
            config.app_id.clone(),
            config.tier,
            Arc::clone(&config.trust_root),
        );

        Self {
            challenges,
            verifier: Arc::new(verifier),
            store,
            template,
            log_prefix: config.log_prefix.as_str().into(),
            share_prefix: config.share_prefix.as_str().into(),
            max_request_size_bytes: config.max_request_size_bytes,
        }
    }

    pub fn tier(&self) -> DeploymentTier {
        self.verifier.tier()
    }
}
