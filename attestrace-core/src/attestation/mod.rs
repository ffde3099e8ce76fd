//! Apple App Attest verification
//!
//! The verifier re-derives the expected challenge from the key identifier,
//! so nothing about an issued challenge is kept between requests. A replayed
//! attestation object only verifies for the key it was produced for, and an
//! object produced against a different secret never verifies.

mod object;
pub mod x509;


use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::challenge::{Challenge, ChallengeGenerator};
use crate::error::{AttestationCheckReason, VerifyError};
use crate::tier::DeploymentTier;

use self::object::AttestationObject;
pub use self::x509::TrustRoot;

pub(crate) const AAGUID_PRODUCTION: &[u8; 16] = b"appattest\0\0\0\0\0\0\0";
pub(crate) const AAGUID_DEVELOPMENT: &[u8; 16] = b"appattestdevelop";

/// Everything one verification needs besides the attestation itself.
#[derive(Debug, Clone, Copy)]
pub struct VerificationContext<'a> {
    pub key_id: &'a [u8],
    pub app_id: &'a str,
    pub production: bool,
    pub trust_root: &'a TrustRoot,
}

impl VerificationContext<'_> {
    /// Check a raw attestation object against `challenge` at time `at`.
    pub fn verify(
        &self,
        attestation: &[u8],
        challenge: &Challenge,
        at: DateTime<Utc>,
    ) -> Result<(), VerifyError> {
        let object = AttestationObject::from_cbor(attestation)?;
        self.check(&object, challenge, at)
    }

    fn check(
        &self,
        object: &AttestationObject,
        challenge: &Challenge,
        at: DateTime<Utc>,
    ) -> Result<(), VerifyError> {
        let leaf = object.credential_certificate();
        let auth = &object.auth_data;

        x509::validate_chain(&object.x5c, self.trust_root, at)?;

        let mut hasher = Sha256::new();
        hasher.update(&object.auth_data_raw);
        hasher.update(challenge.client_data_hash());
        let expected_nonce = hasher.finalize();

        let nonce = x509::extract_app_attest_nonce(&leaf.cert)?
            .ok_or(AttestationCheckReason::NonceExtensionMissing)?;
        if nonce.as_slice() != expected_nonce.as_slice() {
            return Err(AttestationCheckReason::NonceMismatch.into());
        }

        let leaf_key = leaf.public_key()?;
        if Sha256::digest(leaf_key).as_slice() != self.key_id {
            return Err(AttestationCheckReason::KeyIdMismatch.into());
        }

        if Sha256::digest(self.app_id.as_bytes()).as_slice() != auth.rp_id_hash.as_slice() {
            return Err(AttestationCheckReason::AppIdMismatch.into());
        }

        if auth.sign_count != 0 {
            return Err(AttestationCheckReason::NonZeroCounter {
                count: auth.sign_count,
            }
            .into());
        }

        let (expected_aaguid, environment) = if self.production {
            (AAGUID_PRODUCTION, "production")
        } else {
            (AAGUID_DEVELOPMENT, "development")
        };
        if &auth.aaguid != expected_aaguid {
            return Err(AttestationCheckReason::AaguidMismatch {
                expected: environment,
            }
            .into());
        }

        if auth.credential_id != self.key_id {
            return Err(AttestationCheckReason::CredentialIdMismatch.into());
        }

        if auth.credential_key.to_sec1_uncompressed() != leaf_key {
            return Err(AttestationCheckReason::CredentialKeyMismatch.into());
        }

        tracing::debug!(
            flags = auth.flags,
            chain_len = object.x5c.len(),
            "Attestation checks passed"
        );
        Ok(())
    }
}

/// Verifies App Attest attestation objects for one app and tier.
#[derive(Debug, Clone)]
pub struct AttestationVerifier {
    challenges: ChallengeGenerator,
    app_id: String,
    tier: DeploymentTier,
    trust_root: Arc<TrustRoot>,
}

impl AttestationVerifier {
    pub fn new(
        challenges: ChallengeGenerator,
        app_id: impl Into<String>,
        tier: DeploymentTier,
        trust_root: Arc<TrustRoot>,
    ) -> Self {
        Self {
            challenges,
            app_id: app_id.into(),
            tier,
            trust_root,
        }
    }

    pub fn tier(&self) -> DeploymentTier {
        self.tier
    }

    /// `true` only if every check passes. Failures are logged, never returned.
    pub fn verify(&self, key_id: &str, attestation_object: &str) -> bool {
        match self.verify_at(key_id, attestation_object, Utc::now()) {
            Ok(()) => {
                tracing::info!(tier = %self.tier, "Attestation verified");
                true
            }
            Err(e) if e.is_parse_failure() => {
                tracing::warn!(error = %e, "Error while parsing attestation object");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error verifying attestation");
                false
            }
        }
    }

    /// Typed verification at an explicit point in time.
    ///
    /// `key_id` and `attestation_object` are base64 as received from the
    /// client. The challenge is derived from the textual `key_id`; the
    /// decoded bytes are what the credential is bound to.
    pub fn verify_at(
        &self,
        key_id: &str,
        attestation_object: &str,
        at: DateTime<Utc>,
    ) -> Result<(), VerifyError> {
        let key_id_bytes = STANDARD
            .decode(key_id)
            .map_err(|source| VerifyError::Encoding {
                field: "key_id",
                source,
            })?;
        let attestation = STANDARD
            .decode(attestation_object)
            .map_err(|source| VerifyError::Encoding {
                field: "attestation_object",
                source,
            })?;

        let challenge = self.challenges.generate_challenge(key_id)?;

        let context = VerificationContext {
            key_id: &key_id_bytes,
            app_id: &self.app_id,
            production: self.tier.is_production(),
            trust_root: &self.trust_root,
        };
        context.verify(&attestation, &challenge, at)
    }
}
