//! # 検証器の設定
//!
//! ルートCA（トラストアンカー）はコンパイル時定数ではなく、
//! 検証器の構築時に注入する不変の値として扱う。
//! 環境変数から上書きする場合は [`VerifierConfig::from_env`] を使う。

use crate::crypto::{self, PublicKey, P384_PUBLIC_KEY_LEN};

/// AWS Nitro Attestation PKIルートの公開鍵（非圧縮P-384）。
///
/// Subject: CN=aws.nitro-enclaves, O=Amazon, OU=AWS, C=US
/// Validity: 2019-10-28 ~ 2049-10-28
const AWS_NITRO_ROOT_PUBKEY: [u8; P384_PUBLIC_KEY_LEN] = [
    0x04, 0xfc, 0x02, 0x54, 0xeb, 0xa6, 0x08, 0xc1, 0xf3, 0x68, 0x70, 0xe2, 0x9a, 0xda, 0x90,
    0xbe, 0x46, 0x38, 0x32, 0x92, 0x73, 0x6e, 0x89, 0x4b, 0xff, 0xf6, 0x72, 0xd9, 0x89, 0x44,
    0x4b, 0x50, 0x51, 0xe5, 0x34, 0xa4, 0xb1, 0xf6, 0xdb, 0xe3, 0xc0, 0xbc, 0x58, 0x1a, 0x32,
    0xb7, 0xb1, 0x76, 0x07, 0x0e, 0xde, 0x12, 0xd6, 0x9a, 0x3f, 0xea, 0x21, 0x1b, 0x66, 0xe7,
    0x52, 0xcf, 0x7d, 0xd1, 0xdd, 0x09, 0x5f, 0x6f, 0x13, 0x70, 0xf4, 0x17, 0x08, 0x43, 0xd9,
    0xdc, 0x10, 0x01, 0x21, 0xe4, 0xcf, 0x63, 0x01, 0x28, 0x09, 0x66, 0x44, 0x87, 0xc9, 0x79,
    0x62, 0x84, 0x30, 0x4d, 0xc5, 0x3f, 0xf4,
];

const AWS_NITRO_ROOT_CN: &str = "aws.nitro-enclaves";

/// 2049-10-28T14:28:05Z
const AWS_NITRO_ROOT_EXPIRY: u64 = 2_519_044_085;

/// 有効期間ファジング幅のデフォルト（期間長に対する%）。
pub const DEFAULT_VALIDITY_FUZZ_PERCENT: u64 = 30;
/// `NITRO_ATTEST_FUZZ_PERCENT` の上限。
pub const MAX_VALIDITY_FUZZ_PERCENT: u64 = 100;

/// 設定読み込みのエラー型。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 環境変数の値が不正
    #[error("環境変数 {var} が不正です: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

/// 信頼するルートCA。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    /// ルートの公開鍵（非圧縮P-384）
    pub public_key: PublicKey,
    /// ルートのCommon Name
    pub common_name: String,
    /// ルートの有効期限（Unix秒）。これ以降は全ての検証が失敗する
    pub expires_at: u64,
}

impl TrustAnchor {
    /// AWS Nitro Enclavesのルート。
    pub fn aws_nitro() -> Self {
        Self {
            public_key: AWS_NITRO_ROOT_PUBKEY,
            common_name: AWS_NITRO_ROOT_CN.to_string(),
            expires_at: AWS_NITRO_ROOT_EXPIRY,
        }
    }

    /// チェーン連結に使うidentity hash（CNのSHA-256）。
    pub fn identity_hash(&self) -> [u8; 32] {
        crypto::sha256(self.common_name.as_bytes())
    }
}

impl Default for TrustAnchor {
    fn default() -> Self {
        Self::aws_nitro()
    }
}

/// 証明書チェーンの検証範囲。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChainVerification {
    /// issuer/subjectのidentity hashの連結と有効期間のみを検査する。
    ///
    /// cabundleの先頭（ルート）とリーフの `certificate` フィールドは読み飛ばし、
    /// COSE署名はcabundle末尾の証明書の鍵で検証する。
    /// 中間証明書の署名は検証しない。
    #[default]
    IdentityLinkage,
    /// identity hashの連結に加えて、各証明書の署名を発行者の鍵で検証する。
    ///
    /// cabundleの先頭はトラストアンカーと一致しなければならず、
    /// リーフ証明書もパース・検証し、COSE署名はリーフの鍵で検証する。
    Full,
}

/// 検証器の設定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    pub anchor: TrustAnchor,
    pub chain_verification: ChainVerification,
    /// 証明書の有効期間の両端に加える猶予（期間長に対する%）
    pub validity_fuzz_percent: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            anchor: TrustAnchor::aws_nitro(),
            chain_verification: ChainVerification::default(),
            validity_fuzz_percent: DEFAULT_VALIDITY_FUZZ_PERCENT,
        }
    }
}

impl VerifierConfig {
    /// 環境変数から設定を読み込む。未設定の項目はデフォルト値を使う。
    ///
    /// | 環境変数 | 内容 |
    /// |---------|------|
    /// | `NITRO_ATTEST_ROOT_PUBKEY` | ルート公開鍵（16進数、97バイト） |
    /// | `NITRO_ATTEST_ROOT_CN` | ルートのCommon Name |
    /// | `NITRO_ATTEST_ROOT_EXPIRY` | ルートの有効期限（Unix秒） |
    /// | `NITRO_ATTEST_FULL_CHAIN` | `true` で [`ChainVerification::Full`] |
    /// | `NITRO_ATTEST_FUZZ_PERCENT` | 有効期間の猶予（%） |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意のキー参照関数から設定を読み込む。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(key_hex) = lookup("NITRO_ATTEST_ROOT_PUBKEY") {
            let invalid = |reason: String| ConfigError::InvalidValue {
                var: "NITRO_ATTEST_ROOT_PUBKEY",
                reason,
            };
            let bytes = hex::decode(key_hex.trim()).map_err(|e| invalid(e.to_string()))?;
            let public_key: PublicKey = bytes
                .try_into()
                .map_err(|_| invalid("97バイトの非圧縮P-384公開鍵である必要があります".into()))?;
            if !crypto::is_valid_public_key(&public_key) {
                return Err(invalid("P-384曲線上の点ではありません".into()));
            }
            config.anchor.public_key = public_key;
        }

        if let Some(cn) = lookup("NITRO_ATTEST_ROOT_CN") {
            config.anchor.common_name = cn;
        }

        if let Some(expiry) = lookup("NITRO_ATTEST_ROOT_EXPIRY") {
            config.anchor.expires_at =
                expiry
                    .trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                        var: "NITRO_ATTEST_ROOT_EXPIRY",
                        reason: e.to_string(),
                    })?;
        }

        if let Some(full) = lookup("NITRO_ATTEST_FULL_CHAIN") {
            if full == "true" {
                config.chain_verification = ChainVerification::Full;
            }
        }

        if let Some(percent) = lookup("NITRO_ATTEST_FUZZ_PERCENT") {
            let invalid = |reason: String| ConfigError::InvalidValue {
                var: "NITRO_ATTEST_FUZZ_PERCENT",
                reason,
            };
            let percent: u64 = percent
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| invalid(e.to_string()))?;
            if percent > MAX_VALIDITY_FUZZ_PERCENT {
                return Err(invalid(format!(
                    "{MAX_VALIDITY_FUZZ_PERCENT}以下である必要があります（{percent}）"
                )));
            }
            config.validity_fuzz_percent = percent;
        }

        Ok(config)
    }
}
