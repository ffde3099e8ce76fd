//! Attestrace Core - attested conversation traces
//!
//! This crate provides the primitives behind the attestrace service:
//!
//! - Stateless, deterministic challenges derived from a key identifier and a
//!   server secret (HMAC-SHA256)
//! - Apple App Attest verification against a pinned trust root, including
//!   X.509 chain validation with ECDSA P-256/P-384
//! - The conversation trace model with its persisted JSON shape and object keys
//! - Share-page rendering
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use attestrace_core::{
//!     AttestationVerifier, ChallengeGenerator, DeploymentTier, ServerSecret, TrustRoot,
//! };
//!
//! # fn example(root_b64: &str, key_id: &str, attestation_b64: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let challenges = ChallengeGenerator::new(ServerSecret::new("server-secret"));
//!
//! // Handed to the client, which has its key attested against it
//! let challenge = challenges.generate_challenge(key_id)?;
//! println!("challenge: {}", challenge.as_base64());
//!
//! let root = Arc::new(TrustRoot::from_base64(root_b64)?);
//! let verifier = AttestationVerifier::new(
//!     challenges,
//!     "TEAMID.org.example.app",
//!     DeploymentTier::Production,
//!     root,
//! );
//! assert!(verifier.verify(key_id, attestation_b64));
//! # Ok(())
//! # }
//! ```

pub mod attestation;
pub mod challenge;
pub mod error;
pub mod render;
pub mod tier;
pub mod trace;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

// Re-export main types for convenience
pub use attestation::{AttestationVerifier, TrustRoot, VerificationContext};
pub use challenge::{Challenge, ChallengeGenerator, ServerSecret};
pub use error::{
    AttestationCheckReason, AttestationParseReason, CertificateParseReason,
    ChainValidationReason, ChallengeError, TraceError, TrustRootError, VerifyError,
};
pub use render::{ShareTemplate, JSON_PLACEHOLDER};
pub use tier::DeploymentTier;
pub use trace::{ConversationTrace, Message, Role, DEFAULT_TRACE_OBJECT};
