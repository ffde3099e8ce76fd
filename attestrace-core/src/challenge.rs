//! Deterministic, stateless challenge derivation.
//!
//! A challenge is a pure function of the key identifier and the server
//! secret, so any replica can re-derive it at verification time without
//! storing issued challenges:
//!
//! ```text
//! seed      = HMAC-SHA256(secret, key_id)
//! message   = key_id ":" hex(seed)
//! challenge = base64(HMAC-SHA256(secret, message))
//! ```
//!
//! ```
//! use attestrace_core::{ChallengeGenerator, ServerSecret};
//!
//! let generator = ChallengeGenerator::new(ServerSecret::new("s3cr3t"));
//! let challenge = generator.generate_challenge("abc123").unwrap();
//! assert_eq!(challenge.as_base64(), "VOPwwDSqrE43n87c9vfxB1QVDL1JOuB8e7tjt70lYJ4=");
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::ChallengeError;

type HmacSha256 = Hmac<Sha256>;

/// Process-wide HMAC key. Wiped on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ServerSecret(Vec<u8>);

impl ServerSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for ServerSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ServerSecret([REDACTED])")
    }
}

/// A derived challenge (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Challenge([u8; 32]);

impl Challenge {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Standard base64 with padding, the form handed to clients.
    pub fn as_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// SHA-256 over the base64 text, which is what the device signs as its
    /// client data hash.
    pub fn client_data_hash(&self) -> [u8; 32] {
        Sha256::digest(self.as_base64().as_bytes()).into()
    }
}

/// Derives per-key challenges from the server secret.
#[derive(Debug, Clone)]
pub struct ChallengeGenerator {
    secret: ServerSecret,
}

impl ChallengeGenerator {
    pub fn new(secret: ServerSecret) -> Self {
        Self { secret }
    }

    /// Derive the challenge for `key_id` (the client's textual key identifier).
    pub fn generate_challenge(&self, key_id: &str) -> Result<Challenge, ChallengeError> {
        if key_id.is_empty() {
            return Err(ChallengeError::EmptyKeyId);
        }

        let seed = self.mac(key_id.as_bytes())?;
        let message = format!("{}:{}", key_id, hex::encode(seed));
        let challenge = self.mac(message.as_bytes())?;

        tracing::debug!(key_id_len = key_id.len(), "Derived challenge");
        Ok(Challenge(challenge))
    }

    fn mac(&self, message: &[u8]) -> Result<[u8; 32], ChallengeError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| ChallengeError::InvalidSecret(e.to_string()))?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().into())
    }
}
