//! Server configuration module
//!
//! Loads configuration from environment variables once at startup. Missing
//! required values abort startup with a [`ConfigError`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use attestrace_core::{DeploymentTier, ServerSecret, TrustRoot, TrustRootError};
use thiserror::Error;
use url::Url;

pub const DEFAULT_MAX_REQUEST_SIZE_BYTES: usize = 51_200;

/// Fatal startup configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("Invalid trust root in CERTIFICATE_AS_BYTES: {0}")]
    TrustRoot(#[from] TrustRootError),

    #[error("Failed to read share template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where traces and share pages are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process map, lost on restart
    Memory,
    /// Files under a root directory
    Fs { root: PathBuf },
    /// `PUT {endpoint}/{bucket}/{key}` against an S3-compatible gateway
    Http { endpoint: String },
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Pinned App Attest root certificate
    pub trust_root: Arc<TrustRoot>,
    /// `<TeamID>.<bundle id>` the attestations must be bound to
    pub app_id: String,
    /// HMAC key for challenge derivation
    pub secret: ServerSecret,
    /// Deployment tier (default: production)
    pub tier: DeploymentTier,
    /// Object-store bucket
    pub bucket: String,
    /// Key prefix for trace JSON (default: logs)
    pub log_prefix: String,
    /// Key prefix for share pages (default: share)
    pub share_prefix: String,
    /// Request size ceiling in bytes (default: 51200)
    pub max_request_size_bytes: usize,
    /// Blob store backend (default: fs under ./data)
    pub store: StoreBackend,
    /// Base of returned share URLs (default: https://<bucket>.s3.amazonaws.com)
    pub public_base_url: String,
    /// Share-page template file (default: built-in template)
    pub template_path: Option<PathBuf>,
    /// Server host (default: 127.0.0.1)
    pub host: IpAddr,
    /// Server port (default: 3000)
    pub port: u16,
    /// Allowed CORS origins, comma-separated (default: allow all)
    pub allowed_origins: Option<Vec<String>>,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
}

impl Config {
    /// Configuration with the required values and defaults for everything else.
    pub fn new(
        trust_root: Arc<TrustRoot>,
        app_id: impl Into<String>,
        secret: ServerSecret,
        bucket: impl Into<String>,
    ) -> Self {
        let bucket = bucket.into();
        Self {
            trust_root,
            app_id: app_id.into(),
            secret,
            tier: DeploymentTier::default(),
            public_base_url: default_public_base_url(&bucket),
            bucket,
            log_prefix: "logs".to_string(),
            share_prefix: "share".to_string(),
            max_request_size_bytes: DEFAULT_MAX_REQUEST_SIZE_BYTES,
            store: StoreBackend::Fs {
                root: PathBuf::from("./data"),
            },
            template_path: None,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            allowed_origins: None,
            timeout_secs: 30,
            rate_limit_enabled: false,
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let trust_root = TrustRoot::from_base64(&required("CERTIFICATE_AS_BYTES")?)?;
        let app_id = required("APP_ID")?;
        let secret = ServerSecret::new(required("HMAC_SHA_KEY")?);
        let bucket = required("BUCKET_NAME")?;

        let mut config = Self::new(Arc::new(trust_root), app_id, secret, bucket);

        if let Some(tier) = lookup("ENV") {
            config.tier = DeploymentTier::from_config_value(&tier);
        }
        if let Some(prefix) = lookup("S3_LOG_PREFIX") {
            config.log_prefix = key_prefix("S3_LOG_PREFIX", &prefix)?;
        }
        if let Some(prefix) = lookup("S3_SHARE_PREFIX") {
            config.share_prefix = key_prefix("S3_SHARE_PREFIX", &prefix)?;
        }
        if let Some(size) = lookup("MAX_REQUEST_SIZE_BYTES") {
            config.max_request_size_bytes = parse("MAX_REQUEST_SIZE_BYTES", &size)?;
        }

        config.store = match lookup("STORE_BACKEND")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("fs") => StoreBackend::Fs {
                root: lookup("STORE_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./data")),
            },
            Some("memory") => StoreBackend::Memory,
            Some("http") => StoreBackend::Http {
                endpoint: base_url("STORE_ENDPOINT", &required("STORE_ENDPOINT")?)?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    reason: format!("unknown backend {:?}", other),
                })
            }
        };

        if let Some(url) = lookup("PUBLIC_BASE_URL") {
            config.public_base_url = base_url("PUBLIC_BASE_URL", &url)?;
        }
        config.template_path = lookup("CHAT_TEMPLATE_PATH").map(PathBuf::from);

        if let Some(host) = lookup("HOST") {
            config.host = parse("HOST", &host)?;
        }
        if let Some(port) = lookup("PORT") {
            config.port = parse("PORT", &port)?;
        }

        config.allowed_origins = lookup("ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        config.timeout_secs = lookup("REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        config.rate_limit_enabled = lookup("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        config.rate_limit_per_sec = lookup("RATE_LIMIT_PER_SEC")
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        config.rate_limit_burst = lookup("RATE_LIMIT_BURST")
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        Ok(config)
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn default_public_base_url(bucket: &str) -> String {
    format!("https://{}.s3.amazonaws.com", bucket)
}

/// Object-key prefix without surrounding slashes; must not be empty.
fn key_prefix(name: &'static str, value: &str) -> Result<String, ConfigError> {
    let prefix = value.trim().trim_matches('/');
    if prefix.is_empty() {
        return Err(ConfigError::Invalid {
            name,
            reason: "prefix is empty".to_string(),
        });
    }
    if prefix
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("prefix {:?} has an empty, '.' or '..' segment", prefix),
        });
    }
    Ok(prefix.to_string())
}

/// Absolute http(s) URL that object keys can be appended to, without a
/// trailing slash.
fn base_url(name: &'static str, value: &str) -> Result<String, ConfigError> {
    let value = value.trim().trim_end_matches('/');
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("{:?} is not an http(s) base URL", value),
        });
    }
    Ok(value.to_string())
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}
