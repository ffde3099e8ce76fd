//! Deployment tier

use serde::{Deserialize, Serialize};

/// Which attestation environment the service accepts.
///
/// Production and development attestations are issued by the same root but
/// carry different AAGUIDs, so a verifier accepts exactly one of them.
/// `Test` skips verification at the dispatcher and otherwise behaves like
/// development.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentTier {
    #[default]
    Production,
    Development,
    Test,
}

impl DeploymentTier {
    /// Parse a configuration value, falling back to production for anything
    /// unrecognised.
    pub fn from_config_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "dev" | "development" => Self::Development,
            "test" => Self::Test,
            other => {
                tracing::warn!(value = other, "Unknown deployment tier, using production");
                Self::Production
            }
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
            Self::Test => "test",
        }
    }
}

impl std::fmt::Display for DeploymentTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
