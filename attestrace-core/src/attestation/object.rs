//! App Attest attestation object (CBOR) and authenticator data parsing

use ciborium::value::Value;
use coset::{iana, AsCborValue, CoseKey, KeyType, Label};

use super::x509::ParsedCertificate;
use crate::error::AttestationParseReason;

pub(crate) const APPLE_APPATTEST_FORMAT: &str = "apple-appattest";

/// Attested credential data present (bit 6)
const FLAG_ATTESTED_CREDENTIAL: u8 = 0x40;

const RP_ID_HASH_LEN: usize = 32;
const AAGUID_LEN: usize = 16;

/// Decoded `{fmt, attStmt: {x5c, receipt}, authData}` container.
#[derive(Debug)]
pub(crate) struct AttestationObject {
    pub x5c: Vec<ParsedCertificate>,
    /// authData exactly as transmitted; the nonce is computed over these bytes
    pub auth_data_raw: Vec<u8>,
    pub auth_data: AuthenticatorData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AuthenticatorData {
    pub rp_id_hash: [u8; RP_ID_HASH_LEN],
    pub flags: u8,
    pub sign_count: u32,
    pub aaguid: [u8; AAGUID_LEN],
    pub credential_id: Vec<u8>,
    pub credential_key: CredentialKey,
}

/// EC2 P-256 credential public key coordinates from the COSE_Key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CredentialKey {
    pub x: Vec<u8>,
    pub y: Vec<u8>,
}

impl CredentialKey {
    /// Uncompressed SEC1 encoding (`0x04 || X || Y`)
    pub fn to_sec1_uncompressed(&self) -> Vec<u8> {
        let mut point = Vec::with_capacity(1 + self.x.len() + self.y.len());
        point.push(0x04);
        point.extend_from_slice(&self.x);
        point.extend_from_slice(&self.y);
        point
    }
}

impl AttestationObject {
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, crate::error::VerifyError> {
        let value: Value = ciborium::de::from_reader(bytes)
            .map_err(|e| AttestationParseReason::Cbor(e.to_string()))?;
        let Value::Map(entries) = value else {
            return Err(AttestationParseReason::NotAMap.into());
        };

        let format = text_field(&entries, "fmt")?;
        if format != APPLE_APPATTEST_FORMAT {
            return Err(AttestationParseReason::UnsupportedFormat {
                format: format.to_string(),
            }
            .into());
        }

        let Value::Map(statement) = field(&entries, "attStmt")? else {
            return Err(AttestationParseReason::WrongType { field: "attStmt" }.into());
        };

        let Value::Array(chain) = field(statement, "x5c")? else {
            return Err(AttestationParseReason::WrongType { field: "x5c" }.into());
        };
        if chain.is_empty() {
            return Err(AttestationParseReason::EmptyX5c.into());
        }
        let mut x5c = Vec::with_capacity(chain.len());
        for (index, entry) in chain.iter().enumerate() {
            let Value::Bytes(der) = entry else {
                return Err(AttestationParseReason::WrongType { field: "x5c" }.into());
            };
            x5c.push(ParsedCertificate::from_der(index, der.clone())?);
        }

        // The receipt must be present; its content is not evaluated
        bytes_field(statement, "receipt")?;
        let auth_data_raw = bytes_field(&entries, "authData")?.to_vec();
        let auth_data = AuthenticatorData::parse(&auth_data_raw)?;

        Ok(Self {
            x5c,
            auth_data_raw,
            auth_data,
        })
    }

    pub fn credential_certificate(&self) -> &ParsedCertificate {
        // x5c is checked non-empty at parse time
        &self.x5c[0]
    }
}

impl AuthenticatorData {
    /// Parse `rpIdHash(32) || flags(1) || signCount(4) || aaguid(16) ||
    /// credIdLen(2) || credId || COSE_Key`.
    pub fn parse(data: &[u8]) -> Result<Self, AttestationParseReason> {
        let mut reader = Reader { data, pos: 0 };

        let rp_id_hash = reader.array::<RP_ID_HASH_LEN>("rpIdHash")?;
        let [flags] = reader.array::<1>("flags")?;
        let sign_count = u32::from_be_bytes(reader.array::<4>("signCount")?);

        if flags & FLAG_ATTESTED_CREDENTIAL == 0 {
            return Err(AttestationParseReason::MissingAttestedCredential);
        }

        let aaguid = reader.array::<AAGUID_LEN>("aaguid")?;
        let id_len = u16::from_be_bytes(reader.array::<2>("credentialIdLength")?) as usize;
        let credential_id = reader.take(id_len, "credentialId")?.to_vec();
        let credential_key = parse_credential_key(reader.rest())?;

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            aaguid,
            credential_id,
            credential_key,
        })
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], AttestationParseReason> {
        let remaining = self.data.len() - self.pos;
        if remaining < len {
            return Err(AttestationParseReason::AuthDataTruncated {
                field,
                needed: len,
                actual: remaining,
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], AttestationParseReason> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

/// Decode the leading COSE_Key; trailing extension data is ignored.
fn parse_credential_key(mut bytes: &[u8]) -> Result<CredentialKey, AttestationParseReason> {
    if bytes.is_empty() {
        return Err(AttestationParseReason::AuthDataTruncated {
            field: "credentialPublicKey",
            needed: 1,
            actual: 0,
        });
    }

    let value: Value = ciborium::de::from_reader(&mut bytes)
        .map_err(|e| AttestationParseReason::CredentialKey(e.to_string()))?;
    let key = CoseKey::from_cbor_value(value)
        .map_err(|e| AttestationParseReason::CredentialKey(format!("{:?}", e)))?;

    if key.kty != KeyType::Assigned(iana::KeyType::EC2) {
        return Err(AttestationParseReason::CredentialKey(
            "key type is not EC2".to_string(),
        ));
    }

    let param = |label: iana::Ec2KeyParameter| {
        key.params
            .iter()
            .find(|(l, _)| *l == Label::Int(label as i64))
            .map(|(_, v)| v)
    };

    let curve_is_p256 = matches!(
        param(iana::Ec2KeyParameter::Crv),
        Some(Value::Integer(crv)) if i128::from(*crv) == iana::EllipticCurve::P_256 as i128
    );
    if !curve_is_p256 {
        return Err(AttestationParseReason::CredentialKey(
            "curve is not P-256".to_string(),
        ));
    }

    let coordinate = |label, name: &str| match param(label) {
        Some(Value::Bytes(b)) if b.len() == 32 => Ok(b.clone()),
        _ => Err(AttestationParseReason::CredentialKey(format!(
            "{} coordinate missing or not 32 bytes",
            name
        ))),
    };

    Ok(CredentialKey {
        x: coordinate(iana::Ec2KeyParameter::X, "x")?,
        y: coordinate(iana::Ec2KeyParameter::Y, "y")?,
    })
}

fn field<'a>(
    entries: &'a [(Value, Value)],
    name: &'static str,
) -> Result<&'a Value, AttestationParseReason> {
    entries
        .iter()
        .find(|(k, _)| matches!(k, Value::Text(t) if t == name))
        .map(|(_, v)| v)
        .ok_or(AttestationParseReason::MissingField { field: name })
}

fn text_field<'a>(
    entries: &'a [(Value, Value)],
    name: &'static str,
) -> Result<&'a str, AttestationParseReason> {
    match field(entries, name)? {
        Value::Text(t) => Ok(t),
        _ => Err(AttestationParseReason::WrongType { field: name }),
    }
}

fn bytes_field<'a>(
    entries: &'a [(Value, Value)],
    name: &'static str,
) -> Result<&'a [u8], AttestationParseReason> {
    match field(entries, name)? {
        Value::Bytes(b) => Ok(b),
        _ => Err(AttestationParseReason::WrongType { field: name }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(value, &mut buf).unwrap();
        buf
    }

    fn cose_key_bytes() -> Vec<u8> {
        use coset::CborSerializable;
        coset::CoseKeyBuilder::new_ec2_pub_key(
            iana::EllipticCurve::P_256,
            vec![0x11; 32],
            vec![0x22; 32],
        )
        .build()
        .to_vec()
        .unwrap()
    }

    fn auth_data(flags: u8, cred_id: &[u8]) -> Vec<u8> {
        let mut data = vec![0xAA; 32];
        data.push(flags);
        data.extend_from_slice(&7u32.to_be_bytes());
        data.extend_from_slice(b"appattestdevelop");
        data.extend_from_slice(&(cred_id.len() as u16).to_be_bytes());
        data.extend_from_slice(cred_id);
        data.extend_from_slice(&cose_key_bytes());
        data
    }

    #[test]
    fn test_parse_auth_data_fields() {
        let parsed = AuthenticatorData::parse(&auth_data(0x40, &[9, 8, 7])).unwrap();
        assert_eq!(parsed.rp_id_hash, [0xAA; 32]);
        assert_eq!(parsed.sign_count, 7);
        assert_eq!(&parsed.aaguid, b"appattestdevelop");
        assert_eq!(parsed.credential_id, vec![9, 8, 7]);
        assert_eq!(parsed.credential_key.x, vec![0x11; 32]);

        let point = parsed.credential_key.to_sec1_uncompressed();
        assert_eq!(point.len(), 65);
        assert_eq!(point[0], 0x04);
    }

    #[test]
    fn test_auth_data_without_attested_credential() {
        assert!(matches!(
            AuthenticatorData::parse(&auth_data(0x01, &[1])),
            Err(AttestationParseReason::MissingAttestedCredential)
        ));
    }

    #[test]
    fn test_auth_data_truncated_credential_id() {
        let mut data = vec![0u8; 32];
        data.push(0x40);
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&[0u8; 16]);
        data.extend_from_slice(&64u16.to_be_bytes());
        data.extend_from_slice(&[1, 2, 3]);

        match AuthenticatorData::parse(&data) {
            Err(AttestationParseReason::AuthDataTruncated {
                field,
                needed,
                actual,
            }) => {
                assert_eq!(field, "credentialId");
                assert_eq!(needed, 64);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_auth_data_too_short_for_rp_id_hash() {
        assert!(matches!(
            AuthenticatorData::parse(&[0u8; 10]),
            Err(AttestationParseReason::AuthDataTruncated { field: "rpIdHash", .. })
        ));
    }

    #[test]
    fn test_reject_non_map_object() {
        let bytes = encode(&Value::Array(vec![]));
        assert!(matches!(
            AttestationObject::from_cbor(&bytes),
            Err(crate::error::VerifyError::Parse(AttestationParseReason::NotAMap))
        ));
    }

    #[test]
    fn test_reject_unsupported_format() {
        let bytes = encode(&Value::Map(vec![(
            Value::Text("fmt".into()),
            Value::Text("packed".into()),
        )]));
        assert!(matches!(
            AttestationObject::from_cbor(&bytes),
            Err(crate::error::VerifyError::Parse(
                AttestationParseReason::UnsupportedFormat { .. }
            ))
        ));
    }

    #[test]
    fn test_reject_empty_x5c() {
        let bytes = encode(&Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text(APPLE_APPATTEST_FORMAT.into())),
            (
                Value::Text("attStmt".into()),
                Value::Map(vec![(Value::Text("x5c".into()), Value::Array(vec![]))]),
            ),
        ]));
        assert!(matches!(
            AttestationObject::from_cbor(&bytes),
            Err(crate::error::VerifyError::Parse(AttestationParseReason::EmptyX5c))
        ));
    }

    #[test]
    fn test_reject_missing_receipt() {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let bytes = encode(&Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text(APPLE_APPATTEST_FORMAT.into())),
            (
                Value::Text("attStmt".into()),
                Value::Map(vec![(
                    Value::Text("x5c".into()),
                    Value::Array(vec![Value::Bytes(cert.cert.der().to_vec())]),
                )]),
            ),
            (Value::Text("authData".into()), Value::Bytes(auth_data(0x40, &[1]))),
        ]));
        assert!(matches!(
            AttestationObject::from_cbor(&bytes),
            Err(crate::error::VerifyError::Parse(
                AttestationParseReason::MissingField { field: "receipt" }
            ))
        ));
    }

    #[test]
    fn test_reject_receipt_of_wrong_type() {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let bytes = encode(&Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text(APPLE_APPATTEST_FORMAT.into())),
            (
                Value::Text("attStmt".into()),
                Value::Map(vec![
                    (
                        Value::Text("x5c".into()),
                        Value::Array(vec![Value::Bytes(cert.cert.der().to_vec())]),
                    ),
                    (Value::Text("receipt".into()), Value::Text("receipt".into())),
                ]),
            ),
            (Value::Text("authData".into()), Value::Bytes(auth_data(0x40, &[1]))),
        ]));
        assert!(matches!(
            AttestationObject::from_cbor(&bytes),
            Err(crate::error::VerifyError::Parse(
                AttestationParseReason::WrongType { field: "receipt" }
            ))
        ));
    }

    #[test]
    fn test_reject_truncated_cbor() {
        assert!(matches!(
            AttestationObject::from_cbor(&[0xA3, 0x63]),
            Err(crate::error::VerifyError::Parse(AttestationParseReason::Cbor(_)))
        ));
    }
}
