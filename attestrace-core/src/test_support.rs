//! Test support: ephemeral App Attest PKI and attestation builders.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`. Everything
//! here panics on failure.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ciborium::Value as CborValue;
use coset::{iana, CborSerializable};
use der::asn1::OctetString;
use der::Encode;
use sha2::{Digest, Sha256};

use crate::attestation::x509::AppAttestNonce;
use crate::attestation::{TrustRoot, AAGUID_DEVELOPMENT, AAGUID_PRODUCTION};
use crate::challenge::ChallengeGenerator;

/// OID arcs of the App Attest nonce extension
const NONCE_OID_ARCS: &[u64] = &[1, 2, 840, 113635, 100, 8, 2];

pub const TEST_APP_ID: &str = "TEAMID1234.org.example.chat";
pub const TEST_SECRET: &str = "s3cr3t";

// ============================================================================
// Ephemeral PKI
// ============================================================================

/// Root and intermediate CA standing in for Apple's attestation CAs.
pub struct TestPki {
    root_cert: rcgen::Certificate,
    intermediate_cert: rcgen::Certificate,
    intermediate_key: rcgen::KeyPair,
    /// Optional CA below the intermediate that signs credential certificates
    sub_ca: Option<(rcgen::Certificate, rcgen::KeyPair)>,
}

impl TestPki {
    /// P-384 root and intermediate, both valid 2020..2045.
    pub fn generate() -> Self {
        Self::generate_named("Test App Attestation Root CA")
    }

    /// Same as [`TestPki::generate`] with a distinct root name, for
    /// foreign-root tests.
    pub fn generate_named(root_name: &str) -> Self {
        Self::build(root_name, |_| {})
    }

    /// Same as [`TestPki::generate`], letting the caller alter the
    /// intermediate's parameters before it is signed.
    pub fn generate_with(configure_intermediate: impl FnOnce(&mut rcgen::CertificateParams)) -> Self {
        Self::build("Test App Attestation Root CA", configure_intermediate)
    }

    fn build(
        root_name: &str,
        configure_intermediate: impl FnOnce(&mut rcgen::CertificateParams),
    ) -> Self {
        let mut root_params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
        root_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        root_params.key_usages = vec![
            rcgen::KeyUsagePurpose::KeyCertSign,
            rcgen::KeyUsagePurpose::CrlSign,
        ];
        root_params.distinguished_name = rcgen::DistinguishedName::new();
        root_params
            .distinguished_name
            .push(rcgen::DnType::CommonName, root_name);
        root_params.not_before = rcgen::date_time_ymd(2020, 1, 1);
        root_params.not_after = rcgen::date_time_ymd(2045, 1, 1);
        let root_key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384).unwrap();
        let root_cert = root_params.self_signed(&root_key).unwrap();

        let mut int_params = ca_params("Test App Attestation CA 1", 0);
        configure_intermediate(&mut int_params);
        let intermediate_key =
            rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384).unwrap();
        let intermediate_cert = int_params
            .signed_by(&intermediate_key, &root_cert, &root_key)
            .unwrap();

        Self {
            root_cert,
            intermediate_cert,
            intermediate_key,
            sub_ca: None,
        }
    }

    /// Insert a further CA under the intermediate. The intermediate's
    /// pathLenConstraint of 0 does not allow it.
    pub fn with_sub_ca(mut self) -> Self {
        let params = ca_params("Test App Attestation Sub CA", 0);
        let key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let cert = params
            .signed_by(&key, &self.intermediate_cert, &self.intermediate_key)
            .unwrap();
        self.sub_ca = Some((cert, key));
        self
    }

    /// CA that signs credential certificates
    fn issuer(&self) -> (&rcgen::Certificate, &rcgen::KeyPair) {
        match &self.sub_ca {
            Some((cert, key)) => (cert, key),
            None => (&self.intermediate_cert, &self.intermediate_key),
        }
    }

    /// DER of the CAs between the credential certificate and the root,
    /// nearest first
    fn ca_chain(&self) -> Vec<Vec<u8>> {
        let mut chain = Vec::new();
        if let Some((cert, _)) = &self.sub_ca {
            chain.push(cert.der().to_vec());
        }
        chain.push(self.intermediate_cert.der().to_vec());
        chain
    }

    pub fn root_der(&self) -> Vec<u8> {
        self.root_cert.der().to_vec()
    }

    pub fn root_pem(&self) -> String {
        self.root_cert.pem()
    }

    /// Configuration form of the root: base64 of the PEM document.
    pub fn root_config_value(&self) -> String {
        STANDARD.encode(self.root_pem())
    }

    pub fn trust_root(&self) -> TrustRoot {
        TrustRoot::from_der(self.root_der()).unwrap()
    }

    pub fn attestation(&self) -> AttestationBuilder<'_> {
        AttestationBuilder::new(self)
    }
}

/// CA parameters valid 2020..2040 with keyCertSign and the given
/// pathLenConstraint
fn ca_params(name: &str, path_len: u8) -> rcgen::CertificateParams {
    let mut params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
    params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Constrained(path_len));
    params.key_usages = vec![
        rcgen::KeyUsagePurpose::KeyCertSign,
        rcgen::KeyUsagePurpose::CrlSign,
    ];
    params.distinguished_name = rcgen::DistinguishedName::new();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, name);
    params.not_before = rcgen::date_time_ymd(2020, 1, 1);
    params.not_after = rcgen::date_time_ymd(2040, 1, 1);
    params
}

// ============================================================================
// Attestation builder
// ============================================================================

/// A built attestation with the key identifier it was produced for.
#[derive(Debug, Clone)]
pub struct TestAttestation {
    /// base64 key identifier, as the client sends it
    pub key_id: String,
    pub key_id_bytes: Vec<u8>,
    /// Raw CBOR attestation object
    pub object: Vec<u8>,
}

impl TestAttestation {
    pub fn object_base64(&self) -> String {
        STANDARD.encode(&self.object)
    }
}

/// Builds App Attest objects signed by a [`TestPki`].
///
/// Defaults produce an attestation that passes every check for
/// [`TEST_APP_ID`] in the development environment.
pub struct AttestationBuilder<'a> {
    pki: &'a TestPki,
    app_id: String,
    production: bool,
    sign_count: u32,
    credential_id: Option<Vec<u8>>,
    format: String,
    include_nonce: bool,
    foreign_credential_key: bool,
    leaf_validity: Option<((i32, u8, u8), (i32, u8, u8))>,
    configure_leaf: Option<Box<dyn FnOnce(&mut rcgen::CertificateParams) + 'a>>,
    rewrite_leaf: Option<Box<dyn FnOnce(Vec<u8>) -> Vec<u8> + 'a>>,
    extra_intermediates: usize,
}

impl<'a> AttestationBuilder<'a> {
    fn new(pki: &'a TestPki) -> Self {
        Self {
            pki,
            app_id: TEST_APP_ID.to_string(),
            production: false,
            sign_count: 0,
            credential_id: None,
            format: "apple-appattest".to_string(),
            include_nonce: true,
            foreign_credential_key: false,
            leaf_validity: None,
            configure_leaf: None,
            rewrite_leaf: None,
            extra_intermediates: 0,
        }
    }

    /// App identifier hashed into rpIdHash
    pub fn app_id(mut self, app_id: &str) -> Self {
        self.app_id = app_id.to_string();
        self
    }

    /// Use the production AAGUID
    pub fn production(mut self) -> Self {
        self.production = true;
        self
    }

    pub fn sign_count(mut self, count: u32) -> Self {
        self.sign_count = count;
        self
    }

    /// Override the credential ID (defaults to the key identifier bytes)
    pub fn credential_id(mut self, id: Vec<u8>) -> Self {
        self.credential_id = Some(id);
        self
    }

    pub fn format(mut self, fmt: &str) -> Self {
        self.format = fmt.to_string();
        self
    }

    /// Leave the nonce extension out of the credential certificate
    pub fn without_nonce(mut self) -> Self {
        self.include_nonce = false;
        self
    }

    /// Put an unrelated key into the COSE credential public key
    pub fn foreign_credential_key(mut self) -> Self {
        self.foreign_credential_key = true;
        self
    }

    /// Credential certificate validity as `(year, month, day)` dates
    pub fn leaf_validity(mut self, not_before: (i32, u8, u8), not_after: (i32, u8, u8)) -> Self {
        self.leaf_validity = Some((not_before, not_after));
        self
    }

    /// Alter the credential certificate's parameters before it is signed
    pub fn configure_leaf(mut self, f: impl FnOnce(&mut rcgen::CertificateParams) + 'a) -> Self {
        self.configure_leaf = Some(Box::new(f));
        self
    }

    /// Replace the signed credential certificate DER before it goes into x5c
    pub fn rewrite_leaf(mut self, f: impl FnOnce(Vec<u8>) -> Vec<u8> + 'a) -> Self {
        self.rewrite_leaf = Some(Box::new(f));
        self
    }

    /// Append `count` further copies of the intermediate to x5c
    pub fn extra_intermediates(mut self, count: usize) -> Self {
        self.extra_intermediates = count;
        self
    }

    /// Generate a fresh credential key and attest it against the challenge
    /// `challenges` derives for its key identifier.
    pub fn build(mut self, challenges: &ChallengeGenerator) -> TestAttestation {
        let leaf_key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let leaf_point = leaf_key.public_key_raw().to_vec();

        let key_id_bytes = Sha256::digest(&leaf_point).to_vec();
        let key_id = STANDARD.encode(&key_id_bytes);
        let challenge = challenges.generate_challenge(&key_id).unwrap();

        let cose_point = if self.foreign_credential_key {
            rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)
                .unwrap()
                .public_key_raw()
                .to_vec()
        } else {
            leaf_point
        };
        let auth_data = self.auth_data(&key_id_bytes, &cose_point);

        let mut hasher = Sha256::new();
        hasher.update(&auth_data);
        hasher.update(challenge.client_data_hash());
        let nonce = hasher.finalize();

        let mut leaf_params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
        leaf_params.distinguished_name = rcgen::DistinguishedName::new();
        leaf_params
            .distinguished_name
            .push(rcgen::DnType::CommonName, hex::encode(&key_id_bytes));
        let ((by, bm, bd), (ay, am, ad)) =
            self.leaf_validity.unwrap_or(((2024, 1, 1), (2035, 1, 1)));
        leaf_params.not_before = rcgen::date_time_ymd(by, bm, bd);
        leaf_params.not_after = rcgen::date_time_ymd(ay, am, ad);
        if self.include_nonce {
            let extension = AppAttestNonce {
                nonce: OctetString::new(nonce.to_vec()).unwrap(),
            }
            .to_der()
            .unwrap();
            leaf_params
                .custom_extensions
                .push(rcgen::CustomExtension::from_oid_content(
                    NONCE_OID_ARCS,
                    extension,
                ));
        }
        if let Some(configure) = self.configure_leaf.take() {
            configure(&mut leaf_params);
        }
        let (issuer_cert, issuer_key) = self.pki.issuer();
        let leaf_cert = leaf_params
            .signed_by(&leaf_key, issuer_cert, issuer_key)
            .unwrap();
        let mut leaf_der = leaf_cert.der().to_vec();
        if let Some(rewrite) = self.rewrite_leaf.take() {
            leaf_der = rewrite(leaf_der);
        }

        let mut x5c = vec![CborValue::Bytes(leaf_der)];
        x5c.extend(self.pki.ca_chain().into_iter().map(CborValue::Bytes));
        for _ in 0..self.extra_intermediates {
            x5c.push(CborValue::Bytes(self.pki.intermediate_cert.der().to_vec()));
        }

        let object = CborValue::Map(vec![
            (
                CborValue::Text("fmt".to_string()),
                CborValue::Text(self.format.clone()),
            ),
            (
                CborValue::Text("attStmt".to_string()),
                CborValue::Map(vec![
                    (
                        CborValue::Text("x5c".to_string()),
                        CborValue::Array(x5c),
                    ),
                    (
                        CborValue::Text("receipt".to_string()),
                        CborValue::Bytes(b"test-receipt".to_vec()),
                    ),
                ]),
            ),
            (
                CborValue::Text("authData".to_string()),
                CborValue::Bytes(auth_data),
            ),
        ]);
        let mut encoded = Vec::new();
        ciborium::into_writer(&object, &mut encoded).unwrap();

        TestAttestation {
            key_id,
            key_id_bytes,
            object: encoded,
        }
    }

    fn auth_data(&self, key_id_bytes: &[u8], cose_point: &[u8]) -> Vec<u8> {
        let credential_id = self
            .credential_id
            .clone()
            .unwrap_or_else(|| key_id_bytes.to_vec());
        let aaguid = if self.production {
            AAGUID_PRODUCTION
        } else {
            AAGUID_DEVELOPMENT
        };
        let cose_key = coset::CoseKeyBuilder::new_ec2_pub_key(
            iana::EllipticCurve::P_256,
            cose_point[1..33].to_vec(),
            cose_point[33..65].to_vec(),
        )
        .build()
        .to_vec()
        .unwrap();

        let mut data = Vec::with_capacity(128 + cose_key.len());
        data.extend_from_slice(&Sha256::digest(self.app_id.as_bytes()));
        data.push(0x40);
        data.extend_from_slice(&self.sign_count.to_be_bytes());
        data.extend_from_slice(aaguid);
        data.extend_from_slice(&(credential_id.len() as u16).to_be_bytes());
        data.extend_from_slice(&credential_id);
        data.extend_from_slice(&cose_key);
        data
    }
}

/// Generator keyed with [`TEST_SECRET`]
pub fn test_challenges() -> ChallengeGenerator {
    ChallengeGenerator::new(crate::challenge::ServerSecret::new(TEST_SECRET))
}
