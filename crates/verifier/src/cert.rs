//! # 制限付きDER証明書パーサー
//!
//! Nitro PKIが発行するP-384証明書の固定レイアウトのみを受け付ける。
//! 汎用のX.509パーサーではなく、想定外のタグや長さ形式は全てエラーとする。
//!
//! ```text
//! Certificate          30 82 LL LL
//!   TBSCertificate     30 82 LL LL
//!     version          A0 03 02 01 02
//!     serialNumber     02 LL ..           (ハッシュ化して保持)
//!     signature        30 LL ..           (検査せずスキップ)
//!     issuer           30 LL ..           (CNのハッシュ)
//!     validity         30 1E 17 0D .. 17 0D ..
//!     subject          30 LL ..           (CNのハッシュ)
//!     spki             30 LL .. 04 X Y    (末尾97バイトが公開鍵)
//!     extensions       (スキップ)
//!   signatureAlgorithm 30 LL ..
//!   signatureValue     03 LL 00 ..        (DER形式のECDSA署名)
//! ```

use crate::crypto::{self, PublicKey, P384_PUBLIC_KEY_LEN};
use crate::cursor::Cursor;
use crate::error::AttestationError;
use crate::time::{self, UTC_TIME_LEN};

/// Common NameのOID（2.5.4.3）のTLV。
const CN_OID: [u8; 5] = [0x06, 0x03, 0x55, 0x04, 0x03];
const VERSION_V3: [u8; 5] = [0xa0, 0x03, 0x02, 0x01, 0x02];
const VALIDITY_HEADER: [u8; 4] = [0x30, 0x1e, 0x17, 0x0d];
const UTC_TIME_HEADER: [u8; 2] = [0x17, 0x0d];
const LONG_SEQUENCE: [u8; 2] = [0x30, 0x82];

/// 証明書の有効期間（Unix秒）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    pub not_before: u64,
    pub not_after: u64,
}

impl Validity {
    /// 有効期間の両端を期間長の `fuzz_percent` % だけ広げた上で `now` を検査する。
    pub fn check(&self, now: u64, fuzz_percent: u64) -> Result<(), AttestationError> {
        let fuzz = self
            .not_after
            .saturating_sub(self.not_before)
            .saturating_mul(fuzz_percent)
            / 100;
        if now < self.not_before.saturating_sub(fuzz) {
            return Err(AttestationError::CertNotActive {
                not_before: self.not_before,
                now,
            });
        }
        if now > self.not_after.saturating_add(fuzz) {
            return Err(AttestationError::CertExpired {
                not_after: self.not_after,
                now,
            });
        }
        Ok(())
    }
}

/// TBSCertificateから抽出したメタデータ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TbsMeta {
    /// シリアル番号のSHA-256
    pub serial_hash: [u8; 32],
    /// issuer CNのSHA-256
    pub issuer_hash: [u8; 32],
    /// subject CNのSHA-256
    pub subject_hash: [u8; 32],
    pub validity: Validity,
}

/// パース済みの証明書。チェーン検証の間だけ存在する。
#[derive(Debug, Clone)]
pub struct ParsedCertificate<'a> {
    pub meta: TbsMeta,
    pub public_key: PublicKey,
    /// 署名対象のTBSCertificate（ヘッダー込み）
    pub tbs: &'a [u8],
    /// DER形式のECDSA署名
    pub signature: &'a [u8],
}

/// 証明書1枚をパースする。
pub fn parse_certificate(der: &[u8]) -> Result<ParsedCertificate<'_>, AttestationError> {
    use AttestationError::NotACertificate;

    let mut c = Cursor::new(der);
    if !c.eat(&LONG_SEQUENCE) {
        return Err(NotACertificate("Certificate SEQUENCEではありません"));
    }
    let cert_len = c.read_u16().ok_or(NotACertificate("長さが読めません"))? as usize;
    if cert_len != c.remaining() {
        return Err(NotACertificate("Certificateの長さが一致しません"));
    }

    let tbs_start = c.position();
    if !c.eat(&LONG_SEQUENCE) {
        return Err(NotACertificate("TBSCertificate SEQUENCEではありません"));
    }
    let tbs_len = c.read_u16().ok_or(NotACertificate("TBSの長さが読めません"))? as usize;
    let tbs_body = c.take(tbs_len).ok_or(NotACertificate("TBSが途中で切れています"))?;
    let tbs = &der[tbs_start..c.position()];

    let (meta, public_key) = parse_tbs(tbs_body)?;

    if !c.eat(&[0x30]) {
        return Err(NotACertificate("signatureAlgorithmがありません"));
    }
    let alg_len = read_len(&mut c).ok_or(NotACertificate("signatureAlgorithmの長さが不正です"))?;
    c.skip(alg_len)
        .ok_or(NotACertificate("signatureAlgorithmが途中で切れています"))?;

    if !c.eat(&[0x03]) {
        return Err(NotACertificate("signatureValueがありません"));
    }
    let sig_len = read_len(&mut c).ok_or(NotACertificate("signatureValueの長さが不正です"))?;
    let bits = c
        .take(sig_len)
        .ok_or(NotACertificate("signatureValueが途中で切れています"))?;
    let signature = match bits.split_first() {
        Some((0x00, rest)) => rest,
        _ => return Err(NotACertificate("signatureValueの未使用ビット数が0ではありません")),
    };

    if !c.is_empty() {
        return Err(NotACertificate("証明書の末尾に余剰データがあります"));
    }

    Ok(ParsedCertificate {
        meta,
        public_key,
        tbs,
        signature,
    })
}

fn parse_tbs(body: &[u8]) -> Result<(TbsMeta, PublicKey), AttestationError> {
    use AttestationError::NotACertificate;

    let mut c = Cursor::new(body);
    if !c.eat(&VERSION_V3) {
        return Err(NotACertificate("X.509 v3ではありません"));
    }

    if !c.eat(&[0x02]) {
        return Err(NotACertificate("serialNumberがありません"));
    }
    let serial_len = c
        .read_u8()
        .filter(|&l| l < 0x80)
        .ok_or(NotACertificate("serialNumberの長さが不正です"))?;
    let serial = c
        .take(serial_len as usize)
        .ok_or(NotACertificate("serialNumberが途中で切れています"))?;
    let serial_hash = crypto::sha256(serial);

    // 署名アルゴリズムはECDSA-with-SHA384を前提とし、検査しない
    if !c.eat(&[0x30]) {
        return Err(NotACertificate("signatureがありません"));
    }
    let alg_len = c
        .read_u8()
        .filter(|&l| l < 0x80)
        .ok_or(NotACertificate("signatureの長さが不正です"))?;
    c.skip(alg_len as usize)
        .ok_or(NotACertificate("signatureが途中で切れています"))?;

    let issuer = read_sequence(&mut c, "issuerがありません")?;
    let issuer_hash = crypto::sha256(extract_cn(issuer)?);

    if !c.eat(&VALIDITY_HEADER) {
        return Err(NotACertificate("validityがUTCTimeの組ではありません"));
    }
    let not_before = c
        .take_array::<UTC_TIME_LEN>()
        .ok_or(NotACertificate("notBeforeが途中で切れています"))?;
    if !c.eat(&UTC_TIME_HEADER) {
        return Err(NotACertificate("notAfterがUTCTimeではありません"));
    }
    let not_after = c
        .take_array::<UTC_TIME_LEN>()
        .ok_or(NotACertificate("notAfterが途中で切れています"))?;
    let validity = Validity {
        not_before: time::parse_utc_time(not_before)?,
        not_after: time::parse_utc_time(not_after)?,
    };

    let subject = read_sequence(&mut c, "subjectがありません")?;
    let subject_hash = crypto::sha256(extract_cn(subject)?);

    // SPKIはP-384固定。アルゴリズムOIDは検査せず、末尾97バイトを公開鍵とする
    let spki = read_sequence(&mut c, "subjectPublicKeyInfoがありません")?;
    if spki.len() < P384_PUBLIC_KEY_LEN {
        return Err(NotACertificate("subjectPublicKeyInfoが短すぎます"));
    }
    let mut public_key = [0u8; P384_PUBLIC_KEY_LEN];
    public_key.copy_from_slice(&spki[spki.len() - P384_PUBLIC_KEY_LEN..]);
    if public_key[0] != 0x04 {
        return Err(NotACertificate("公開鍵が非圧縮形式ではありません"));
    }

    let meta = TbsMeta {
        serial_hash,
        issuer_hash,
        subject_hash,
        validity,
    };
    Ok((meta, public_key))
}

/// RDNSequenceからCommon Nameの値を探して返す。
///
/// CN以外のRelativeDistinguishedNameは宣言された長さ分スキップする。
pub fn extract_cn(name: &[u8]) -> Result<&[u8], AttestationError> {
    let mut c = Cursor::new(name);
    while !c.is_empty() {
        if !c.eat(&[0x31]) {
            return Err(AttestationError::NotACertificate(
                "RelativeDistinguishedNameがSETではありません",
            ));
        }
        let rdn_len = read_len(&mut c).ok_or(AttestationError::NotACertificate("RDNの長さが不正です"))?;
        let rdn = c
            .take(rdn_len)
            .ok_or(AttestationError::NotACertificate("RDNが途中で切れています"))?;

        let mut r = Cursor::new(rdn);
        if !r.eat(&[0x30]) || read_len(&mut r).is_none() || !r.eat(&CN_OID) {
            continue;
        }
        // 文字列型（UTF8String / PrintableString 等）は問わない
        r.read_u8()
            .ok_or(AttestationError::NotACertificate("CNの型がありません"))?;
        let cn_len = read_len(&mut r).ok_or(AttestationError::NotACertificate("CNの長さが不正です"))?;
        return r
            .take(cn_len)
            .ok_or(AttestationError::NotACertificate("CNが途中で切れています"));
    }
    Err(AttestationError::CommonNameNotFound)
}

fn read_sequence<'a>(
    c: &mut Cursor<'a>,
    missing: &'static str,
) -> Result<&'a [u8], AttestationError> {
    if !c.eat(&[0x30]) {
        return Err(AttestationError::NotACertificate(missing));
    }
    let len = read_len(c).ok_or(AttestationError::NotACertificate("SEQUENCEの長さが不正です"))?;
    c.take(len)
        .ok_or(AttestationError::NotACertificate("SEQUENCEが途中で切れています"))
}

/// DERの長さ（短形式、`0x81`、`0x82`）を読む。
fn read_len(c: &mut Cursor<'_>) -> Option<usize> {
    match c.read_u8()? {
        n if n < 0x80 => Some(n as usize),
        0x81 => c.read_u8().map(usize::from),
        0x82 => c.read_u16().map(usize::from),
        _ => None,
    }
}
