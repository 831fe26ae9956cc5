//! # Attestation検証エラー
//!
//! 検証は全か無か。どの段階で失敗しても検証全体を中断し、
//! 部分的な結果は返さない。

/// Attestation Document検証のエラー型。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttestationError {
    /// ルートCAの有効期限切れ（ドキュメント内容に関係なく失敗）
    #[error("ルートCAの有効期限が切れています: now={now}, expires_at={expires_at}")]
    RootExpired { now: u64, expires_at: u64 },
    /// COSE Sign1エンベロープが期待するバイト列と一致しない
    #[error("COSE Sign1エンベロープが不正です: {0}")]
    MalformedEnvelope(&'static str),
    /// COSE署名の検証に失敗
    #[error("署名検証に失敗")]
    InvalidSignature,
    /// ペイロードのフィールドが期待する位置・形式にない
    #[error("想定外のフィールド: {0} を期待していました")]
    UnexpectedField(&'static str),
    /// タイムスタンプがポリシーで拒否された
    #[error("タイムスタンプがポリシー外です: timestamp={timestamp_ms}ms, now={now}s")]
    StaleTimestamp { timestamp_ms: u64, now: u64 },
    /// ペイロード末尾に余剰データがある、またはデータが不足している
    #[error("ペイロード長が一致しません: 消費={consumed}, 全長={len}")]
    TrailingOrMissingData { consumed: usize, len: usize },
    /// cabundleの配列ヘッダーが不正
    #[error("cabundleが不正です: {0}")]
    MalformedChain(&'static str),
    /// issuerのidentity hashが直前の証明書のsubjectと一致しない
    #[error("証明書チェーンが途切れています: index={index}")]
    ChainBroken { index: usize },
    /// 証明書のDER構造が期待する形式と一致しない
    #[error("証明書のパースに失敗: {0}")]
    NotACertificate(&'static str),
    /// issuer/subjectにCommon Nameが存在しない
    #[error("Common Nameが見つかりません")]
    CommonNameNotFound,
    /// UTCTimeの形式が不正
    #[error("不正なタイムスタンプ: {0}")]
    InvalidTimestamp(&'static str),
    /// 証明書の有効期限切れ（ファジング幅込み）
    #[error("証明書の有効期限切れ: not_after={not_after}, now={now}")]
    CertExpired { not_after: u64, now: u64 },
    /// 証明書がまだ有効になっていない（ファジング幅込み）
    #[error("証明書がまだ有効ではありません: not_before={not_before}, now={now}")]
    CertNotActive { not_before: u64, now: u64 },
    /// PCRポリシーで拒否された
    #[error("PCR値がポリシーで拒否されました")]
    PcrRejected,
}
