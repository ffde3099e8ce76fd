//! Error types for challenge derivation, attestation verification and trace validation

use thiserror::Error;

/// Errors raised while deriving a challenge.
#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("Key identifier is empty")]
    EmptyKeyId,

    #[error("HMAC key rejected: {0}")]
    InvalidSecret(String),
}

/// Errors raised while loading the trust root from configuration.
#[derive(Debug, Error)]
pub enum TrustRootError {
    #[error("Trust root is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Trust root PEM is malformed: {0}")]
    Pem(#[from] CertificateParseReason),

    #[error("Trust root is not a CA certificate")]
    NotCa,

    #[error("Trust root is not self-signed: {0}")]
    NotSelfSigned(ChainValidationReason),
}

/// Errors that can occur during attestation verification.
///
/// Every variant collapses to `false` at the verifier boundary; the split
/// only decides which diagnostic gets logged.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Invalid base64 in {field}: {source}")]
    Encoding {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Malformed attestation object: {0}")]
    Parse(#[from] AttestationParseReason),

    #[error("Certificate parsing failed: {0}")]
    CertificateParse(#[from] CertificateParseReason),

    #[error("Certificate chain validation failed: {0}")]
    ChainValidation(#[from] ChainValidationReason),

    #[error("Attestation check failed: {0}")]
    Check(#[from] AttestationCheckReason),

    #[error("Challenge derivation failed: {0}")]
    Challenge(#[from] ChallengeError),
}

impl VerifyError {
    /// Whether the input was malformed, as opposed to well-formed but invalid.
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            Self::Encoding { .. } | Self::Parse(_) | Self::CertificateParse(_)
        )
    }
}

// =============================================================================
// AttestationParseReason
// =============================================================================

#[derive(Debug, Error)]
pub enum AttestationParseReason {
    #[error("CBOR decoding failed: {0}")]
    Cbor(String),

    #[error("Attestation object is not a map")]
    NotAMap,

    #[error("Missing field: {field}")]
    MissingField { field: &'static str },

    #[error("Field {field} has the wrong CBOR type")]
    WrongType { field: &'static str },

    #[error("Unsupported attestation format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Certificate chain (x5c) is empty")]
    EmptyX5c,

    #[error("Authenticator data truncated at {field}: need {needed} bytes, have {actual}")]
    AuthDataTruncated {
        field: &'static str,
        needed: usize,
        actual: usize,
    },

    #[error("Authenticator data carries no attested credential data")]
    MissingAttestedCredential,

    #[error("Credential public key is not a valid COSE key: {0}")]
    CredentialKey(String),
}

// =============================================================================
// CertificateParseReason
// =============================================================================

#[derive(Debug, Error)]
pub enum CertificateParseReason {
    #[error("Line {line}: Unexpected BEGIN marker inside certificate block")]
    NestedBeginMarker { line: usize },

    #[error("Line {line}: END marker without matching BEGIN")]
    EndWithoutBegin { line: usize },

    #[error("Line {line}: Empty certificate content")]
    EmptyCertContent { line: usize },

    #[error("Line {line}: Invalid base64 character in certificate")]
    InvalidBase64 { line: usize },

    #[error("Line {line}: Unexpected content outside certificate block")]
    UnexpectedContent { line: usize },

    #[error("Unclosed certificate block (missing END marker)")]
    UnclosedBlock,

    #[error("No certificates found in PEM")]
    NoCertificates,

    #[error("Certificate {index}: invalid DER: {reason}")]
    InvalidDer { index: usize, reason: String },

    #[error("Public key has unused bits")]
    PublicKeyUnusedBits,

    #[error("Nonce extension is malformed: {0}")]
    NonceExtension(String),
}

// =============================================================================
// ChainValidationReason
// =============================================================================

#[derive(Debug, Error)]
pub enum ChainValidationReason {
    #[error("Certificate chain too deep: {depth} certificates (max {max})")]
    ChainTooDeep { depth: usize, max: usize },

    #[error("Leaf certificate has CA:TRUE - must be CA:FALSE")]
    LeafIsCa,

    #[error("Certificate {index} (intermediate/root) must have CA:TRUE")]
    CaMissingCaFlag { index: usize },

    #[error("Certificate {index} pathLenConstraint violated: allows {allowed} CAs below, but {actual} exist")]
    PathLenViolated {
        index: usize,
        allowed: u8,
        actual: usize,
    },

    #[error("Certificate {index} (intermediate/root) missing Basic Constraints extension")]
    MissingBasicConstraints { index: usize },

    #[error("Certificate {index} (CA) missing keyCertSign key usage")]
    CaMissingKeyCertSign { index: usize },

    #[error("Leaf certificate missing digitalSignature key usage")]
    LeafMissingDigitalSignature,

    #[error("Certificate {index} issuer does not match parent subject")]
    IssuerMismatch { index: usize },

    #[error("Certificate {index} signature verification failed")]
    SignatureVerificationFailed { index: usize },

    #[error("Unsupported signature algorithm: {oid}")]
    UnsupportedAlgorithm { oid: String },

    #[error("Certificate {index} signature algorithm differs from its TBS signature field")]
    SignatureAlgorithmMismatch { index: usize },

    #[error("Certificate {index} carries unhandled critical extension {oid}")]
    UnhandledCriticalExtension { index: usize, oid: String },

    #[error("Certificate {index} has an unsupported public key ({len} bytes)")]
    UnsupportedKey { index: usize, len: usize },

    #[error("Certificate {index} is not yet valid")]
    CertNotYetValid { index: usize },

    #[error("Certificate {index} has expired")]
    CertExpired { index: usize },

    #[error("{0}")]
    CryptoError(String),
}

// =============================================================================
// AttestationCheckReason
// =============================================================================

#[derive(Debug, Error)]
pub enum AttestationCheckReason {
    #[error("Credential certificate lacks the App Attest nonce extension")]
    NonceExtensionMissing,

    #[error("Nonce does not match the expected challenge")]
    NonceMismatch,

    #[error("Credential public key hash does not match key identifier")]
    KeyIdMismatch,

    #[error("RP ID hash does not match app identifier")]
    AppIdMismatch,

    #[error("Sign counter must be 0 for a fresh attestation, got {count}")]
    NonZeroCounter { count: u32 },

    #[error("AAGUID does not match the {expected} environment")]
    AaguidMismatch { expected: &'static str },

    #[error("Credential ID does not match key identifier")]
    CredentialIdMismatch,

    #[error("Credential public key does not match certificate subject key")]
    CredentialKeyMismatch,
}

// =============================================================================
// TraceError
// =============================================================================

/// Validation failures for a submitted conversation trace.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Trace body is malformed: {0}")]
    Malformed(String),

    #[error("Trace must contain at least one message")]
    EmptyMessages,

    #[error("Message {index} has invalid role {role:?}")]
    InvalidRole { index: usize, role: String },

    #[error("Message {index} is missing content")]
    MissingContent { index: usize },

    #[error("Timestamp {created} is out of range")]
    InvalidTimestamp { created: i64 },

    #[error("Field {field} cannot be used as a storage key segment: {value:?}")]
    InvalidKeySegment { field: &'static str, value: String },
}

impl TraceError {
    /// Whether the failure is confined to a single message.
    pub fn is_message_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRole { .. } | Self::MissingContent { .. }
        )
    }
}

impl From<serde_json::Error> for TraceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}
