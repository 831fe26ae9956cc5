//! # AWS Nitro Enclaves Attestation Document検証
//!
//! Nitro Secure Moduleが生成するAttestation Documentを、汎用のCBOR/DER/COSE
//! デコーダーを使わずに固定のバイトパターンで検証する。
//! 期待する形式から1バイトでも外れたドキュメントは拒否する。
//!
//! ## アルゴリズム
//! | 用途 | アルゴリズム |
//! |------|------------|
//! | COSE署名 | ECDSA P-384 / SHA-384（ES384） |
//! | 証明書署名（Full） | ECDSA P-384 / SHA-384（DER署名） |
//! | identity hash | SHA-256（CN） |
//!
//! ## 使い方
//! ```no_run
//! use nitro_attest::{AttestationVerifier, VerifierConfig};
//!
//! # fn run(document: &[u8]) -> Result<(), nitro_attest::AttestationError> {
//! let verifier = AttestationVerifier::new(VerifierConfig::default());
//! let verified = verifier.verify(document)?;
//! println!("{} {}", verified.module_id, hex::encode(verified.pcrs.pcr0));
//! # Ok(())
//! # }
//! ```

pub mod cert;
pub mod chain;
pub mod config;
pub mod cose;
pub mod crypto;
mod cursor;
pub mod error;
pub mod payload;
pub mod pcr;
pub mod policy;
pub mod time;
pub mod verifier;

pub use config::{ChainVerification, ConfigError, TrustAnchor, VerifierConfig};
pub use crypto::{P384Verifier, PublicKey, SignatureVerifier};
pub use error::AttestationError;
pub use pcr::{Pcr, Pcrs};
pub use policy::{
    AnyPcrs, AnyTimestamp, Clock, ExpectedPcrs, FixedClock, MaxAge, PcrPolicy, SystemClock,
    TimestampPolicy,
};
pub use verifier::{AttestationVerifier, VerifiedAttestation};
