//! X.509 certificate chain validation against a pinned trust root

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use der::asn1::OctetString;
use der::oid::{AssociatedOid, ObjectIdentifier};
use der::{Decode, Encode, Sequence};
use ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::{Signature as P256Signature, VerifyingKey as P256VerifyingKey};
use p384::ecdsa::{Signature as P384Signature, VerifyingKey as P384VerifyingKey};
use sha2::{Digest, Sha256, Sha384};
use x509_cert::ext::pkix::{BasicConstraints, ExtendedKeyUsage, KeyUsage};
use x509_cert::Certificate;

use crate::error::{CertificateParseReason, ChainValidationReason, TrustRootError};

/// App Attest nonce extension carried by the credential certificate
pub(crate) const OID_APP_ATTEST_NONCE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113635.100.8.2");

const OID_ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const OID_ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");

/// Maximum allowed certificate chain depth, root included
pub(crate) const MAX_CHAIN_DEPTH: usize = 10;

const PEM_CERT_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_CERT_END: &str = "-----END CERTIFICATE-----";

/// `SEQUENCE { nonce [1] EXPLICIT OCTET STRING }`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct AppAttestNonce {
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT")]
    pub nonce: OctetString,
}

/// A certificate together with the DER it was decoded from.
#[derive(Debug, Clone)]
pub(crate) struct ParsedCertificate {
    pub der: Vec<u8>,
    pub cert: Certificate,
}

impl ParsedCertificate {
    pub fn from_der(index: usize, der: Vec<u8>) -> Result<Self, CertificateParseReason> {
        let cert = Certificate::from_der(&der).map_err(|e| CertificateParseReason::InvalidDer {
            index,
            reason: e.to_string(),
        })?;
        Ok(Self { der, cert })
    }

    /// Raw SubjectPublicKeyInfo key bits (SEC1 point for EC keys)
    pub fn public_key(&self) -> Result<&[u8], CertificateParseReason> {
        self.cert
            .tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .as_bytes()
            .ok_or(CertificateParseReason::PublicKeyUnusedBits)
    }
}

/// The pinned root every attestation chain must terminate in.
#[derive(Debug, Clone)]
pub struct TrustRoot {
    root: ParsedCertificate,
}

impl TrustRoot {
    /// Load from the configuration form: base64 of a PEM document or of raw DER.
    pub fn from_base64(encoded: &str) -> Result<Self, TrustRootError> {
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD.decode(compact)?;
        Self::from_bytes(&bytes)
    }

    /// Load from PEM text or DER bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TrustRootError> {
        let pem = std::str::from_utf8(bytes)
            .ok()
            .filter(|text| text.trim_start().starts_with(PEM_CERT_BEGIN));

        match pem {
            Some(text) => {
                let mut certs = parse_pem_certificates(text)?;
                if certs.len() > 1 {
                    tracing::warn!(
                        count = certs.len(),
                        "Trust root PEM holds several certificates, pinning the first"
                    );
                }
                Self::from_parsed(certs.swap_remove(0))
            }
            None => Self::from_der(bytes.to_vec()),
        }
    }

    pub fn from_der(der: Vec<u8>) -> Result<Self, TrustRootError> {
        Self::from_parsed(ParsedCertificate::from_der(0, der)?)
    }

    fn from_parsed(root: ParsedCertificate) -> Result<Self, TrustRootError> {
        match extract_basic_constraints(&root.cert) {
            Some(bc) if bc.ca => {}
            _ => return Err(TrustRootError::NotCa),
        }
        verify_issued_by(&root.cert, &root, 0).map_err(TrustRootError::NotSelfSigned)?;
        Ok(Self { root })
    }

    /// SHA-256 of the root DER, hex encoded
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.root.der))
    }

    pub fn subject(&self) -> String {
        self.root.cert.tbs_certificate.subject.to_string()
    }

    pub fn der(&self) -> &[u8] {
        &self.root.der
    }
}

/// Parse X.509 certificates from PEM text.
///
/// Strict about exact BEGIN/END markers, content outside blocks and the
/// base64 alphabet inside them.
pub(crate) fn parse_pem_certificates(
    pem: &str,
) -> Result<Vec<ParsedCertificate>, CertificateParseReason> {
    let mut certs = Vec::new();
    let mut current = String::new();
    let mut in_cert = false;

    for (idx, line) in pem.lines().enumerate() {
        let line_number = idx + 1;
        let trimmed = line.trim();

        if trimmed == PEM_CERT_BEGIN {
            if in_cert {
                return Err(CertificateParseReason::NestedBeginMarker { line: line_number });
            }
            in_cert = true;
            current.clear();
            continue;
        }

        if trimmed == PEM_CERT_END {
            if !in_cert {
                return Err(CertificateParseReason::EndWithoutBegin { line: line_number });
            }
            in_cert = false;
            if current.is_empty() {
                return Err(CertificateParseReason::EmptyCertContent { line: line_number });
            }
            let der = STANDARD
                .decode(&current)
                .map_err(|_| CertificateParseReason::InvalidBase64 { line: line_number })?;
            certs.push(ParsedCertificate::from_der(certs.len(), der)?);
            continue;
        }

        if in_cert {
            if !trimmed.is_empty() && !is_valid_base64_line(trimmed) {
                return Err(CertificateParseReason::InvalidBase64 { line: line_number });
            }
            current.push_str(trimmed);
            continue;
        }

        if !trimmed.is_empty() {
            return Err(CertificateParseReason::UnexpectedContent { line: line_number });
        }
    }

    if in_cert {
        return Err(CertificateParseReason::UnclosedBlock);
    }
    if certs.is_empty() {
        return Err(CertificateParseReason::NoCertificates);
    }

    Ok(certs)
}

fn is_valid_base64_line(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
}

/// Extensions this validator understands; any other critical extension
/// rejects the chain.
fn is_handled_extension(oid: &ObjectIdentifier) -> bool {
    *oid == BasicConstraints::OID
        || *oid == KeyUsage::OID
        || *oid == ExtendedKeyUsage::OID
        || *oid == OID_APP_ATTEST_NONCE
}

fn check_critical_extensions(cert: &Certificate, index: usize) -> Result<(), ChainValidationReason> {
    let Some(extensions) = cert.tbs_certificate.extensions.as_ref() else {
        return Ok(());
    };
    match extensions
        .iter()
        .find(|ext| ext.critical && !is_handled_extension(&ext.extn_id))
    {
        Some(ext) => Err(ChainValidationReason::UnhandledCriticalExtension {
            index,
            oid: ext.extn_id.to_string(),
        }),
        None => Ok(()),
    }
}

fn find_extension<'a>(cert: &'a Certificate, oid: &ObjectIdentifier) -> Option<&'a [u8]> {
    cert.tbs_certificate
        .extensions
        .as_ref()?
        .iter()
        .find(|ext| ext.extn_id == *oid)
        .map(|ext| ext.extn_value.as_bytes())
}

/// Basic Constraints (2.5.29.19), `None` when absent or undecodable.
pub(crate) fn extract_basic_constraints(cert: &Certificate) -> Option<BasicConstraints> {
    find_extension(cert, &BasicConstraints::OID).and_then(|v| BasicConstraints::from_der(v).ok())
}

/// Key Usage (2.5.29.15), `None` when absent or undecodable.
pub(crate) fn extract_key_usage(cert: &Certificate) -> Option<KeyUsage> {
    find_extension(cert, &KeyUsage::OID).and_then(|v| KeyUsage::from_der(v).ok())
}

/// Read the App Attest nonce from the credential certificate.
///
/// Returns `Ok(None)` when the extension is absent.
pub(crate) fn extract_app_attest_nonce(
    cert: &Certificate,
) -> Result<Option<Vec<u8>>, CertificateParseReason> {
    let Some(value) = find_extension(cert, &OID_APP_ATTEST_NONCE) else {
        return Ok(None);
    };
    let parsed = AppAttestNonce::from_der(value)
        .map_err(|e| CertificateParseReason::NonceExtension(e.to_string()))?;
    Ok(Some(parsed.nonce.as_bytes().to_vec()))
}

/// Check that `cert` names `issuer` as its issuer and carries a valid
/// signature from the issuer's key.
fn verify_issued_by(
    cert: &Certificate,
    issuer: &ParsedCertificate,
    index: usize,
) -> Result<(), ChainValidationReason> {
    if cert.tbs_certificate.issuer != issuer.cert.tbs_certificate.subject {
        return Err(ChainValidationReason::IssuerMismatch { index });
    }
    if cert.tbs_certificate.signature != cert.signature_algorithm {
        return Err(ChainValidationReason::SignatureAlgorithmMismatch { index });
    }

    let tbs_der = cert
        .tbs_certificate
        .to_der()
        .map_err(|e| ChainValidationReason::CryptoError(e.to_string()))?;
    let sig_bytes = cert.signature.raw_bytes();

    let alg = cert.signature_algorithm.oid;
    let digest = if alg == OID_ECDSA_WITH_SHA256 {
        Sha256::digest(&tbs_der).to_vec()
    } else if alg == OID_ECDSA_WITH_SHA384 {
        Sha384::digest(&tbs_der).to_vec()
    } else {
        return Err(ChainValidationReason::UnsupportedAlgorithm {
            oid: alg.to_string(),
        });
    };

    let issuer_key = issuer
        .public_key()
        .map_err(|e| ChainValidationReason::CryptoError(e.to_string()))?;

    // The hash follows the signature algorithm while the curve follows the
    // issuer key: a P-384 CA may sign with ecdsa-with-SHA256.
    let verified = match issuer_key.len() {
        65 => {
            let key = P256VerifyingKey::from_sec1_bytes(issuer_key)
                .map_err(|e| ChainValidationReason::CryptoError(e.to_string()))?;
            let sig = P256Signature::from_der(sig_bytes)
                .map_err(|e| ChainValidationReason::CryptoError(e.to_string()))?;
            key.verify_prehash(&digest, &sig).is_ok()
        }
        97 => {
            let key = P384VerifyingKey::from_sec1_bytes(issuer_key)
                .map_err(|e| ChainValidationReason::CryptoError(e.to_string()))?;
            let sig = P384Signature::from_der(sig_bytes)
                .map_err(|e| ChainValidationReason::CryptoError(e.to_string()))?;
            key.verify_prehash(&digest, &sig).is_ok()
        }
        len => return Err(ChainValidationReason::UnsupportedKey { index: index + 1, len }),
    };

    if verified {
        Ok(())
    } else {
        Err(ChainValidationReason::SignatureVerificationFailed { index })
    }
}

/// Validate `x5c` (leaf first) up to the pinned root at time `at`.
///
/// The root is appended unless `x5c` already ends with it. Checks, for every
/// link: no unrecognised critical extension, name chaining and signature,
/// Basic Constraints (leaf not a CA, issuers CA with pathLenConstraint
/// honoured), Key Usage when present, and the validity window of every
/// certificate including the root.
pub(crate) fn validate_chain(
    x5c: &[ParsedCertificate],
    root: &TrustRoot,
    at: DateTime<Utc>,
) -> Result<(), ChainValidationReason> {
    let mut chain: Vec<&ParsedCertificate> = x5c.iter().collect();
    if chain.last().map(|last| last.der != root.root.der).unwrap_or(true) {
        chain.push(&root.root);
    }

    if chain.len() > MAX_CHAIN_DEPTH {
        return Err(ChainValidationReason::ChainTooDeep {
            depth: chain.len(),
            max: MAX_CHAIN_DEPTH,
        });
    }

    let last = chain.len() - 1;
    for (i, parsed) in chain.iter().enumerate() {
        let cert = &parsed.cert;
        let is_leaf = i == 0;

        check_critical_extensions(cert, i)?;

        match extract_basic_constraints(cert) {
            Some(bc) if is_leaf && bc.ca => return Err(ChainValidationReason::LeafIsCa),
            Some(bc) if !is_leaf && !bc.ca => {
                return Err(ChainValidationReason::CaMissingCaFlag { index: i })
            }
            Some(bc) if !is_leaf => {
                // Intermediates between this CA and the leaf
                let cas_below = i - 1;
                if let Some(path_len) = bc.path_len_constraint {
                    if cas_below > path_len as usize {
                        return Err(ChainValidationReason::PathLenViolated {
                            index: i,
                            allowed: path_len,
                            actual: cas_below,
                        });
                    }
                }
            }
            None if !is_leaf => {
                return Err(ChainValidationReason::MissingBasicConstraints { index: i })
            }
            _ => {}
        }

        if let Some(ku) = extract_key_usage(cert) {
            if is_leaf && !ku.digital_signature() {
                return Err(ChainValidationReason::LeafMissingDigitalSignature);
            }
            if !is_leaf && !ku.key_cert_sign() {
                return Err(ChainValidationReason::CaMissingKeyCertSign { index: i });
            }
        }

        if i < last {
            verify_issued_by(cert, chain[i + 1], i)?;
        }
    }

    let now = at.timestamp();
    for (i, parsed) in chain.iter().enumerate() {
        let validity = &parsed.cert.tbs_certificate.validity;
        let not_before = validity.not_before.to_unix_duration().as_secs() as i64;
        let not_after = validity.not_after.to_unix_duration().as_secs() as i64;

        if now < not_before {
            return Err(ChainValidationReason::CertNotYetValid { index: i });
        }
        if now > not_after {
            return Err(ChainValidationReason::CertExpired { index: i });
        }
    }

    Ok(())
}
