//! # ハッシュ・署名検証プリミティブ
//!
//! | 用途 | アルゴリズム |
//! |------|------------|
//! | identity hash / シリアル | SHA-256 |
//! | COSE・証明書の署名対象 | SHA-384 |
//! | 署名 | ECDSA P-384 |
//!
//! 署名検証は [`SignatureVerifier`] トレイトで抽象化し、実行環境の
//! プリミティブに差し替えられるようにする。

use p384::ecdsa::signature::hazmat::PrehashVerifier;
use p384::ecdsa::{Signature, VerifyingKey};
use sha2::{Digest, Sha256, Sha384};

/// 非圧縮P-384公開鍵（`0x04 || X || Y`）のバイト長。
pub const P384_PUBLIC_KEY_LEN: usize = 97;
/// raw形式のES384署名（`r || s`）のバイト長。
pub const P384_SIGNATURE_LEN: usize = 96;
/// SHA-384ダイジェストのバイト長。
pub const SHA384_LEN: usize = 48;

/// 非圧縮P-384公開鍵。
pub type PublicKey = [u8; P384_PUBLIC_KEY_LEN];

/// SHA-256ハッシュ計算。
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&Sha256::digest(data));
    hash
}

/// SHA-384ハッシュ計算。
pub fn sha384(data: &[u8]) -> [u8; SHA384_LEN] {
    let mut hash = [0u8; SHA384_LEN];
    hash.copy_from_slice(&Sha384::digest(data));
    hash
}

/// 複数のバイト列を連結した結果のSHA-384。
/// Sig_structureを一度に確保せずにハッシュするために使う。
pub fn sha384_concat(parts: &[&[u8]]) -> [u8; SHA384_LEN] {
    let mut hasher = Sha384::new();
    for part in parts {
        hasher.update(part);
    }
    let mut hash = [0u8; SHA384_LEN];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

/// ECDSA-P384署名検証のトレイト。
pub trait SignatureVerifier: Send + Sync {
    /// raw形式（`r || s`）の署名をSHA-384ダイジェストに対して検証する。
    fn verify_prehash(
        &self,
        public_key: &PublicKey,
        digest: &[u8; SHA384_LEN],
        signature: &[u8; P384_SIGNATURE_LEN],
    ) -> bool;

    /// DER形式（X.509の signatureValue）の署名を検証する。
    fn verify_der_prehash(
        &self,
        public_key: &PublicKey,
        digest: &[u8; SHA384_LEN],
        signature: &[u8],
    ) -> bool;
}

/// `p384` クレートによる [`SignatureVerifier`] 実装。
#[derive(Debug, Default, Clone, Copy)]
pub struct P384Verifier;

impl SignatureVerifier for P384Verifier {
    fn verify_prehash(
        &self,
        public_key: &PublicKey,
        digest: &[u8; SHA384_LEN],
        signature: &[u8; P384_SIGNATURE_LEN],
    ) -> bool {
        let Ok(key) = VerifyingKey::from_sec1_bytes(public_key) else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify_prehash(digest, &sig).is_ok()
    }

    fn verify_der_prehash(
        &self,
        public_key: &PublicKey,
        digest: &[u8; SHA384_LEN],
        signature: &[u8],
    ) -> bool {
        let Ok(key) = VerifyingKey::from_sec1_bytes(public_key) else {
            return false;
        };
        let Ok(sig) = Signature::from_der(signature) else {
            return false;
        };
        key.verify_prehash(digest, &sig).is_ok()
    }
}

/// 公開鍵がP-384曲線上の有効な点か確認する。
pub fn is_valid_public_key(public_key: &PublicKey) -> bool {
    VerifyingKey::from_sec1_bytes(public_key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use p384::ecdsa::signature::Signer;
    use p384::ecdsa::SigningKey;

    fn keypair() -> (SigningKey, PublicKey) {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        let point = signing_key.verifying_key().to_encoded_point(false);
        let public_key: PublicKey = point.as_bytes().try_into().unwrap();
        (signing_key, public_key)
    }

    #[test]
    fn test_sha384_concat_matches_contiguous() {
        assert_eq!(sha384_concat(&[b"Signa", b"ture1", b""]), sha384(b"Signature1"));
    }

    /// 通常の `sign` はSHA-384でハッシュしてから署名するため、
    /// 事前ハッシュ検証と対応する
    #[test]
    fn test_verify_prehash_roundtrip() {
        let (signing_key, public_key) = keypair();
        let message = b"attestation";
        let sig: Signature = signing_key.sign(message);
        let raw: [u8; P384_SIGNATURE_LEN] = sig.to_bytes().as_slice().try_into().unwrap();

        assert!(P384Verifier.verify_prehash(&public_key, &sha384(message), &raw));
        assert!(!P384Verifier.verify_prehash(&public_key, &sha384(b"other"), &raw));

        let der = sig.to_der();
        assert!(P384Verifier.verify_der_prehash(&public_key, &sha384(message), der.as_bytes()));
    }

    #[test]
    fn test_rejects_invalid_point() {
        let mut public_key = [0u8; P384_PUBLIC_KEY_LEN];
        public_key[0] = 0x04;
        assert!(!is_valid_public_key(&public_key));
        assert!(!P384Verifier.verify_prehash(&public_key, &[0u8; 48], &[1u8; 96]));
    }
}
