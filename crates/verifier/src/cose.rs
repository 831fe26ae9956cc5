//! # COSE Sign1エンベロープ
//!
//! Nitro Attestation Documentは常に次のバイト列で始まる（タグなしCOSE_Sign1）。
//!
//! ```text
//! 84                 array(4)
//! 44 A1 01 38 22     protected: bstr(4) = {1: -35 (ES384)}
//! A0                 unprotected: {}
//! 59 LL LL ..        payload: bstr（2バイト長）
//! 58 60 ..           signature: bstr(96) = r || s
//! ```
//!
//! 署名対象（Sig_structure）は元のペイロードのバイト列をそのまま埋め込んで再構築する。
//! 再エンコードはしない。

use crate::crypto::{self, PublicKey, SignatureVerifier, P384_SIGNATURE_LEN, SHA384_LEN};
use crate::cursor::Cursor;
use crate::error::AttestationError;

const ENVELOPE_PREFIX: [u8; 8] = [0x84, 0x44, 0xa1, 0x01, 0x38, 0x22, 0xa0, 0x59];
const SIGNATURE_HEADER: [u8; 2] = [0x58, 0x60];

/// `["Signature1", protected, h'', payload]` のペイロード長の直前まで。
const SIG_STRUCTURE_PROLOGUE: [u8; 19] = [
    0x84, 0x6a, b'S', b'i', b'g', b'n', b'a', b't', b'u', b'r', b'e', b'1', 0x44, 0xa1, 0x01,
    0x38, 0x22, 0x40, 0x59,
];

/// 分解したCOSE Sign1エンベロープ。`split_envelope` でのみ生成される。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub payload: &'a [u8],
    pub signature: &'a [u8; P384_SIGNATURE_LEN],
    /// ドキュメント中のペイロード長ヘッダー
    payload_len: [u8; 2],
}

/// ドキュメントを保護ヘッダー・ペイロード・署名に分解する。
pub fn split_envelope(document: &[u8]) -> Result<Envelope<'_>, AttestationError> {
    use AttestationError::MalformedEnvelope;

    let mut c = Cursor::new(document);
    if !c.eat(&ENVELOPE_PREFIX) {
        return Err(MalformedEnvelope("COSE Sign1 (ES384) のヘッダーと一致しません"));
    }
    let payload_len = *c
        .take_array::<2>()
        .ok_or(MalformedEnvelope("ペイロード長が読めません"))?;
    let payload = c
        .take(u16::from_be_bytes(payload_len) as usize)
        .ok_or(MalformedEnvelope("ペイロードが途中で切れています"))?;
    if !c.eat(&SIGNATURE_HEADER) {
        return Err(MalformedEnvelope("96バイトの署名フィールドがありません"));
    }
    let signature = c
        .take_array::<P384_SIGNATURE_LEN>()
        .ok_or(MalformedEnvelope("署名が途中で切れています"))?;
    if !c.is_empty() {
        return Err(MalformedEnvelope("署名の後に余剰データがあります"));
    }

    Ok(Envelope {
        payload,
        signature,
        payload_len,
    })
}

impl Envelope<'_> {
    /// Sig_structureを組み立てる。長さヘッダーはドキュメントのものをそのまま使う。
    pub fn sig_structure(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SIG_STRUCTURE_PROLOGUE.len() + 2 + self.payload.len());
        out.extend_from_slice(&SIG_STRUCTURE_PROLOGUE);
        out.extend_from_slice(&self.payload_len);
        out.extend_from_slice(self.payload);
        out
    }

    /// Sig_structureのSHA-384。
    pub fn signing_digest(&self) -> [u8; SHA384_LEN] {
        crypto::sha384_concat(&[&SIG_STRUCTURE_PROLOGUE[..], &self.payload_len[..], self.payload])
    }

    /// `public_key` でエンベロープの署名を検証する。
    pub fn verify_signature(
        &self,
        verifier: &dyn SignatureVerifier,
        public_key: &PublicKey,
    ) -> Result<(), AttestationError> {
        let digest = self.signing_digest();
        if !verifier.verify_prehash(public_key, &digest, self.signature) {
            return Err(AttestationError::InvalidSignature);
        }
        Ok(())
    }
}
