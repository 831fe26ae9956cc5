//! # 証明書チェーンの検証
//!
//! cabundleを先頭（ルート）から順に辿り、各証明書のissuerが直前の証明書の
//! subjectと一致すること（CNのidentity hashで比較）と有効期間を検査する。
//! 先頭要素はトラストアンカーとして設定で信頼済みのため、
//! [`ChainVerification::IdentityLinkage`] ではパースせずに読み飛ばす。

use crate::cert::{self, ParsedCertificate};
use crate::config::{ChainVerification, TrustAnchor};
use crate::crypto::{self, PublicKey, SignatureVerifier};
use crate::cursor::Cursor;
use crate::error::AttestationError;

/// cabundleの配列ヘッダー（要素数0〜15）の範囲。
const ARRAY_HEADER_MIN: u8 = 0x80;
const ARRAY_HEADER_MAX: u8 = 0x8f;

/// 2バイト長のバイト列ヘッダー。
const BYTES_U16: u8 = 0x59;

/// チェーン検証のコンテキスト。1回の検証の間だけ使う。
pub struct ChainWalker<'a> {
    pub anchor: &'a TrustAnchor,
    pub mode: ChainVerification,
    pub fuzz_percent: u64,
    /// 現在時刻（Unix秒）
    pub now: u64,
    pub signature_verifier: &'a dyn SignatureVerifier,
}

impl ChainWalker<'_> {
    /// cabundleの配列ヘッダーから始まる `cabundle` を辿り、
    /// COSE署名の検証に使う公開鍵とcabundleの消費バイト数を返す。
    ///
    /// `certificate` はリーフ証明書のDER。[`ChainVerification::Full`] の場合のみ使う。
    pub fn walk(
        &self,
        certificate: &[u8],
        cabundle: &[u8],
    ) -> Result<(PublicKey, usize), AttestationError> {
        let mut c = Cursor::new(cabundle);
        let header = c
            .read_u8()
            .ok_or(AttestationError::MalformedChain("cabundleがありません"))?;
        if !(ARRAY_HEADER_MIN..=ARRAY_HEADER_MAX).contains(&header) {
            return Err(AttestationError::MalformedChain(
                "cabundleが要素数0〜15の配列ではありません",
            ));
        }
        let count = (header - ARRAY_HEADER_MIN) as usize;

        let mut issuer_hash = self.anchor.identity_hash();
        let mut issuer_key = self.anchor.public_key;

        for index in 0..count {
            let der = read_entry(&mut c)?;

            if index == 0 {
                if self.mode == ChainVerification::Full {
                    self.check_root(der)?;
                }
                tracing::debug!("cabundle[0]（ルート）は設定済みのトラストアンカーとして扱います");
                continue;
            }

            let cert = cert::parse_certificate(der)?;
            self.link(index, &cert, &issuer_hash, &issuer_key)?;
            tracing::debug!(index, "中間証明書を連結しました");

            issuer_hash = cert.meta.subject_hash;
            issuer_key = cert.public_key;
        }

        if self.mode == ChainVerification::Full {
            let leaf = cert::parse_certificate(certificate)?;
            self.link(count, &leaf, &issuer_hash, &issuer_key)?;
            tracing::debug!("リーフ証明書を連結しました");
            issuer_key = leaf.public_key;
        }

        Ok((issuer_key, c.position()))
    }

    /// `cert` が `issuer_hash` / `issuer_key` の証明書から発行されたことを検査する。
    fn link(
        &self,
        index: usize,
        cert: &ParsedCertificate<'_>,
        issuer_hash: &[u8; 32],
        issuer_key: &PublicKey,
    ) -> Result<(), AttestationError> {
        if cert.meta.issuer_hash != *issuer_hash {
            return Err(AttestationError::ChainBroken { index });
        }
        cert.meta.validity.check(self.now, self.fuzz_percent)?;

        if self.mode == ChainVerification::Full {
            let digest = crypto::sha384(cert.tbs);
            if !self
                .signature_verifier
                .verify_der_prehash(issuer_key, &digest, cert.signature)
            {
                return Err(AttestationError::ChainBroken { index });
            }
        }
        Ok(())
    }

    /// cabundleの先頭がトラストアンカーそのものであることを検査する。
    fn check_root(&self, der: &[u8]) -> Result<(), AttestationError> {
        let root = cert::parse_certificate(der)?;
        if root.public_key != self.anchor.public_key
            || root.meta.subject_hash != self.anchor.identity_hash()
        {
            return Err(AttestationError::ChainBroken { index: 0 });
        }
        Ok(())
    }
}

/// cabundleの1要素（`0x59 LL LL` + DER）を読む。
fn read_entry<'a>(c: &mut Cursor<'a>) -> Result<&'a [u8], AttestationError> {
    match c.read_u8() {
        Some(BYTES_U16) => {}
        Some(_) => {
            return Err(AttestationError::MalformedChain(
                "cabundleの要素が2バイト長のバイト列ではありません",
            ))
        }
        None => return Err(missing(c)),
    }
    let len = c.read_u16().ok_or_else(|| missing(c))? as usize;
    c.take(len).ok_or_else(|| missing(c))
}

fn missing(c: &Cursor<'_>) -> AttestationError {
    AttestationError::TrailingOrMissingData {
        consumed: c.position(),
        len: c.position() + c.remaining(),
    }
}
