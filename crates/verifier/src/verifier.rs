//! # Attestation Document検証器
//!
//! 検証手順:
//! 1. 現在時刻がルートCAの有効期限より前であることを確認
//! 2. COSE Sign1エンベロープを分解
//! 3. ペイロードをパースし、証明書チェーンから署名検証用の公開鍵を得る
//! 4. Sig_structureを再構築し、その公開鍵でCOSE署名を検証
//! 5. PCR値をポリシーで判定

use serde::{Serialize, Serializer};

use crate::chain::ChainWalker;
use crate::config::{ChainVerification, VerifierConfig};
use crate::cose;
use crate::crypto::{P384Verifier, PublicKey, SignatureVerifier};
use crate::error::AttestationError;
use crate::payload::PayloadParser;
use crate::pcr::Pcrs;
use crate::policy::{AnyPcrs, AnyTimestamp, Clock, PcrPolicy, SystemClock, TimestampPolicy};

/// 検証済みAttestation Documentの内容。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedAttestation {
    /// Enclaveモジュール識別子
    pub module_id: String,
    /// Attestation生成時のタイムスタンプ（Unix ms）
    pub timestamp: u64,
    pub pcrs: Pcrs,
    /// COSE署名を検証した公開鍵（チェーンから導出）
    #[serde(with = "hex::serde")]
    pub enclave_key: PublicKey,
    /// リクエスト時に指定した公開鍵
    #[serde(serialize_with = "serialize_hex_opt")]
    pub public_key: Option<Vec<u8>>,
    /// リクエスト時に指定したユーザーデータ
    #[serde(serialize_with = "serialize_hex_opt")]
    pub user_data: Option<Vec<u8>>,
    /// リクエスト時に指定したノンス
    #[serde(serialize_with = "serialize_hex_opt")]
    pub nonce: Option<Vec<u8>>,
}

fn serialize_hex_opt<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(bytes) => s.serialize_some(&hex::encode(bytes)),
        None => s.serialize_none(),
    }
}

/// Attestation Document検証器。
///
/// 状態を持たず、`verify` は入力のバイト列だけから結果を計算する。
/// 複数スレッドから同時に呼び出してよい。
pub struct AttestationVerifier {
    config: VerifierConfig,
    clock: Box<dyn Clock>,
    signature_verifier: Box<dyn SignatureVerifier>,
    timestamp_policy: Box<dyn TimestampPolicy>,
    pcr_policy: Box<dyn PcrPolicy>,
}

impl AttestationVerifier {
    /// システム時計・`p384` 署名検証・全受理ポリシーで検証器を作る。
    pub fn new(config: VerifierConfig) -> Self {
        if config.chain_verification == ChainVerification::IdentityLinkage {
            tracing::warn!(
                "証明書チェーンはidentity hashの連結のみを検査します（中間証明書の署名は検証しません）"
            );
        }
        Self {
            config,
            clock: Box::new(SystemClock),
            signature_verifier: Box::new(P384Verifier),
            timestamp_policy: Box::new(AnyTimestamp),
            pcr_policy: Box::new(AnyPcrs),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_signature_verifier(mut self, verifier: impl SignatureVerifier + 'static) -> Self {
        self.signature_verifier = Box::new(verifier);
        self
    }

    pub fn with_timestamp_policy(mut self, policy: impl TimestampPolicy + 'static) -> Self {
        self.timestamp_policy = Box::new(policy);
        self
    }

    pub fn with_pcr_policy(mut self, policy: impl PcrPolicy + 'static) -> Self {
        self.pcr_policy = Box::new(policy);
        self
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// 構築時に設定したポリシーでAttestation Documentを検証する。
    pub fn verify(&self, document: &[u8]) -> Result<VerifiedAttestation, AttestationError> {
        self.verify_with(
            document,
            self.timestamp_policy.as_ref(),
            self.pcr_policy.as_ref(),
        )
    }

    /// 呼び出しごとのポリシーでAttestation Documentを検証する。
    pub fn verify_with(
        &self,
        document: &[u8],
        timestamp_policy: &dyn TimestampPolicy,
        pcr_policy: &dyn PcrPolicy,
    ) -> Result<VerifiedAttestation, AttestationError> {
        let anchor = &self.config.anchor;
        let now = self.clock.now();
        if now >= anchor.expires_at {
            return Err(AttestationError::RootExpired {
                now,
                expires_at: anchor.expires_at,
            });
        }

        let envelope = cose::split_envelope(document)?;

        let parser = PayloadParser {
            chain: ChainWalker {
                anchor,
                mode: self.config.chain_verification,
                fuzz_percent: self.config.validity_fuzz_percent,
                now,
                signature_verifier: self.signature_verifier.as_ref(),
            },
            timestamp_policy,
        };
        let payload = parser.parse(envelope.payload)?;

        envelope.verify_signature(self.signature_verifier.as_ref(), &payload.enclave_key)?;

        if !pcr_policy.accept(&payload.pcrs) {
            return Err(AttestationError::PcrRejected);
        }

        tracing::debug!(module_id = payload.module_id, "Attestation Documentを検証しました");
        Ok(VerifiedAttestation {
            module_id: payload.module_id.to_string(),
            timestamp: payload.timestamp,
            pcrs: payload.pcrs,
            enclave_key: payload.enclave_key,
            public_key: payload.public_key.map(<[u8]>::to_vec),
            user_data: payload.user_data.map(<[u8]>::to_vec),
            nonce: payload.nonce.map(<[u8]>::to_vec),
        })
    }
}

impl Default for AttestationVerifier {
    fn default() -> Self {
        Self::new(VerifierConfig::default())
    }
}
