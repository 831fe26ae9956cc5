//! テスト用のPKIとAttestation Documentを生成するヘルパー。
//!
//! 証明書は `x509-cert`、ペイロードは `ciborium`、COSE Sign1は `coset` で生成する。
//! いずれもNitro Secure Moduleと同じバイト列（最短長のCBORヘッダー、UTCTime）になる。

#![allow(dead_code)]

use std::str::FromStr;
use std::time::Duration;

use der::Encode;
use nitro_attest::{PublicKey, TrustAnchor};
use p384::ecdsa::signature::Signer;
use p384::ecdsa::SigningKey;

pub const ROOT_CN: &str = "test.nitro-enclaves";
pub const MODULE_ID: &str = "i-0123456789abcdef0-enc0123456789abcdef";

/// 2024-01-10T12:00:00Z
pub const NOW: u64 = 1_704_888_000;
pub const TIMESTAMP_MS: u64 = NOW * 1000 - 5_000;

/// 2020-01-01T00:00:00Z
pub const LONG_NOT_BEFORE: u64 = 1_577_836_800;
/// 2049-12-31T23:59:59Z
pub const LONG_NOT_AFTER: u64 = 2_524_607_999;

pub fn random_key() -> SigningKey {
    SigningKey::random(&mut rand::rngs::OsRng)
}

pub fn public_key(key: &SigningKey) -> PublicKey {
    let point = key.verifying_key().to_encoded_point(false);
    point.as_bytes().try_into().unwrap()
}

/// 証明書の発行パラメーター。
pub struct CertParams<'a> {
    pub serial: u8,
    pub issuer_cn: &'a str,
    pub subject_cn: &'a str,
    pub not_before: u64,
    pub not_after: u64,
}

impl<'a> CertParams<'a> {
    pub fn new(serial: u8, issuer_cn: &'a str, subject_cn: &'a str) -> Self {
        Self {
            serial,
            issuer_cn,
            subject_cn,
            not_before: LONG_NOT_BEFORE,
            not_after: LONG_NOT_AFTER,
        }
    }

    pub fn validity(mut self, not_before: u64, not_after: u64) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }
}

fn name(cn: &str) -> x509_cert::name::Name {
    x509_cert::name::Name::from_str(&format!("CN={cn},OU=AWS,O=Amazon,C=US")).unwrap()
}

fn utc_time(secs: u64) -> x509_cert::time::Time {
    x509_cert::time::Time::UtcTime(
        der::asn1::UtcTime::from_unix_duration(Duration::from_secs(secs)).unwrap(),
    )
}

/// `subject_key` の証明書を `issuer_key` で署名して発行する。
pub fn issue_cert(params: &CertParams<'_>, subject_key: &SigningKey, issuer_key: &SigningKey) -> Vec<u8> {
    // id-ecPublicKey / secp384r1
    let spki_oid = der::asn1::ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
    let curve_oid = der::asn1::ObjectIdentifier::new_unwrap("1.3.132.0.34");
    let spki = x509_cert::spki::SubjectPublicKeyInfoOwned {
        algorithm: x509_cert::spki::AlgorithmIdentifierOwned {
            oid: spki_oid,
            parameters: Some(der::asn1::Any::from(&curve_oid)),
        },
        subject_public_key: der::asn1::BitString::from_bytes(&public_key(subject_key)).unwrap(),
    };

    // ecdsa-with-SHA384
    let sig_alg = x509_cert::spki::AlgorithmIdentifierOwned {
        oid: der::asn1::ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3"),
        parameters: None,
    };

    let tbs = x509_cert::TbsCertificate {
        version: x509_cert::certificate::Version::V3,
        serial_number: x509_cert::serial_number::SerialNumber::new(&[params.serial]).unwrap(),
        signature: sig_alg.clone(),
        issuer: name(params.issuer_cn),
        validity: x509_cert::time::Validity {
            not_before: utc_time(params.not_before),
            not_after: utc_time(params.not_after),
        },
        subject: name(params.subject_cn),
        subject_public_key_info: spki,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    };

    let tbs_der = tbs.to_der().unwrap();
    let sig: p384::ecdsa::DerSignature = issuer_key.sign(&tbs_der);

    let cert = x509_cert::Certificate {
        tbs_certificate: tbs,
        signature_algorithm: sig_alg,
        signature: der::asn1::BitString::from_bytes(sig.as_bytes()).unwrap(),
    };
    cert.to_der().unwrap()
}

/// ルート → 中間 → リーフ の3段のPKI。
pub struct Pki {
    pub root_key: SigningKey,
    pub root_der: Vec<u8>,
    pub intermediate_key: SigningKey,
    pub intermediate_der: Vec<u8>,
    pub leaf_key: SigningKey,
    pub leaf_der: Vec<u8>,
}

impl Pki {
    pub fn new() -> Self {
        Self::with_intermediate_validity(LONG_NOT_BEFORE, LONG_NOT_AFTER)
    }

    pub fn with_intermediate_validity(not_before: u64, not_after: u64) -> Self {
        let root_key = random_key();
        let root_der = issue_cert(&CertParams::new(1, ROOT_CN, ROOT_CN), &root_key, &root_key);

        let intermediate_key = random_key();
        let intermediate_der = issue_cert(
            &CertParams::new(2, ROOT_CN, "zonal.test.nitro-enclaves").validity(not_before, not_after),
            &intermediate_key,
            &root_key,
        );

        let leaf_key = random_key();
        let leaf_der = issue_cert(
            &CertParams::new(3, "zonal.test.nitro-enclaves", MODULE_ID),
            &leaf_key,
            &intermediate_key,
        );

        Self {
            root_key,
            root_der,
            intermediate_key,
            intermediate_der,
            leaf_key,
            leaf_der,
        }
    }

    pub fn anchor(&self) -> TrustAnchor {
        TrustAnchor {
            public_key: public_key(&self.root_key),
            common_name: ROOT_CN.to_string(),
            expires_at: LONG_NOT_AFTER,
        }
    }

    /// `cabundle = [root, intermediate]`、`certificate = leaf` のドキュメント。
    ///
    /// `signer` はCOSE署名に使う鍵。
    pub fn document(&self, signer: &SigningKey) -> DocumentBuilder {
        DocumentBuilder::new(
            self.leaf_der.clone(),
            vec![self.root_der.clone(), self.intermediate_der.clone()],
            signer.clone(),
        )
    }
}

/// Attestation Documentの組み立て。
pub struct DocumentBuilder {
    pub module_id: String,
    pub timestamp_ms: u64,
    pub pcrs: [[u8; 48]; 16],
    pub certificate: Vec<u8>,
    pub cabundle: Vec<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
    pub user_data: Option<Vec<u8>>,
    pub nonce: Option<Vec<u8>>,
    pub signer: SigningKey,
}

impl DocumentBuilder {
    pub fn new(certificate: Vec<u8>, cabundle: Vec<Vec<u8>>, signer: SigningKey) -> Self {
        let mut pcrs = [[0u8; 48]; 16];
        for (i, pcr) in pcrs.iter_mut().enumerate() {
            *pcr = [0x10 + i as u8; 48];
        }
        Self {
            module_id: MODULE_ID.to_string(),
            timestamp_ms: TIMESTAMP_MS,
            pcrs,
            certificate,
            cabundle,
            public_key: None,
            user_data: None,
            nonce: None,
            signer,
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        use ciborium::Value;

        let bytes_or_null = |v: &Option<Vec<u8>>| match v {
            Some(b) => Value::Bytes(b.clone()),
            None => Value::Null,
        };
        let pcrs = self
            .pcrs
            .iter()
            .enumerate()
            .map(|(i, pcr)| (Value::Integer((i as u64).into()), Value::Bytes(pcr.to_vec())))
            .collect();
        let cabundle = self.cabundle.iter().cloned().map(Value::Bytes).collect();

        let map = Value::Map(vec![
            (Value::Text("module_id".into()), Value::Text(self.module_id.clone())),
            (Value::Text("digest".into()), Value::Text("SHA384".into())),
            (
                Value::Text("timestamp".into()),
                Value::Integer(self.timestamp_ms.into()),
            ),
            (Value::Text("pcrs".into()), Value::Map(pcrs)),
            (
                Value::Text("certificate".into()),
                Value::Bytes(self.certificate.clone()),
            ),
            (Value::Text("cabundle".into()), Value::Array(cabundle)),
            (Value::Text("public_key".into()), bytes_or_null(&self.public_key)),
            (Value::Text("user_data".into()), bytes_or_null(&self.user_data)),
            (Value::Text("nonce".into()), bytes_or_null(&self.nonce)),
        ]);

        let mut out = Vec::new();
        ciborium::into_writer(&map, &mut out).unwrap();
        out
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with_payload(self.payload())
    }

    /// 任意のペイロードを署名してエンベロープに包む。
    pub fn build_with_payload(&self, payload: Vec<u8>) -> Vec<u8> {
        let mut cose_sign1 = coset::CoseSign1Builder::new()
            .protected(
                coset::HeaderBuilder::new()
                    .algorithm(coset::iana::Algorithm::ES384)
                    .build(),
            )
            .payload(payload)
            .build();

        let tbs = cose_sign1.tbs_data(&[]);
        let sig: p384::ecdsa::Signature = self.signer.sign(&tbs);
        cose_sign1.signature = sig.to_bytes().to_vec();

        use coset::CborSerializable;
        cose_sign1.to_vec().unwrap()
    }
}

/// `haystack` 中の `needle` の最初の出現位置。
pub fn find(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
        .unwrap()
}
