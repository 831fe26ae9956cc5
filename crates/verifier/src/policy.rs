//! # 検証ポリシーと時刻源
//!
//! タイムスタンプの鮮度とPCR値の受理判定は呼び出し側の方針に依存するため、
//! 検証器には判定そのものを持たせず、トレイト（またはクロージャ）として注入する。

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::pcr::{Pcr, Pcrs};

/// 現在時刻（Unix秒）の取得元。
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// システム時計。
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// 固定時刻を返す時計（テスト・再検証用）。
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

/// Attestation Documentのタイムスタンプを受理するかの判定。
pub trait TimestampPolicy: Send + Sync {
    /// `timestamp_ms` はドキュメント内のUnixミリ秒、`now` は現在のUnix秒。
    fn accept(&self, timestamp_ms: u64, now: u64) -> bool;
}

impl<F> TimestampPolicy for F
where
    F: Fn(u64, u64) -> bool + Send + Sync,
{
    fn accept(&self, timestamp_ms: u64, now: u64) -> bool {
        self(timestamp_ms, now)
    }
}

/// 全てのタイムスタンプを受理する。
#[derive(Debug, Default, Clone, Copy)]
pub struct AnyTimestamp;

impl TimestampPolicy for AnyTimestamp {
    fn accept(&self, _timestamp_ms: u64, _now: u64) -> bool {
        true
    }
}

/// 生成からの経過時間で鮮度を判定する。
#[derive(Debug, Clone, Copy)]
pub struct MaxAge {
    /// 許容する最大経過時間（ミリ秒）
    pub max_age_ms: u64,
    /// 未来方向に許容する時計のずれ（ミリ秒）
    pub max_skew_ms: u64,
}

impl TimestampPolicy for MaxAge {
    fn accept(&self, timestamp_ms: u64, now: u64) -> bool {
        let now_ms = now.saturating_mul(1000);
        if timestamp_ms > now_ms {
            return timestamp_ms - now_ms <= self.max_skew_ms;
        }
        now_ms - timestamp_ms <= self.max_age_ms
    }
}

/// PCR値を受理するかの判定。
pub trait PcrPolicy: Send + Sync {
    fn accept(&self, pcrs: &Pcrs) -> bool;
}

impl<F> PcrPolicy for F
where
    F: Fn(&Pcrs) -> bool + Send + Sync,
{
    fn accept(&self, pcrs: &Pcrs) -> bool {
        self(pcrs)
    }
}

/// 全てのPCR値を受理する。判定は呼び出し側で行う。
#[derive(Debug, Default, Clone, Copy)]
pub struct AnyPcrs;

impl PcrPolicy for AnyPcrs {
    fn accept(&self, _pcrs: &Pcrs) -> bool {
        true
    }
}

/// 指定したインデックスのPCR値が全て期待値と一致する場合のみ受理する。
///
/// 抽出対象外のインデックス（0〜4, 8 以外）を指定した場合は常に拒否する。
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExpectedPcrs(pub BTreeMap<u8, Pcr>);

impl ExpectedPcrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, index: u8, value: Pcr) -> Self {
        self.0.insert(index, value);
        self
    }
}

impl PcrPolicy for ExpectedPcrs {
    fn accept(&self, pcrs: &Pcrs) -> bool {
        self.0
            .iter()
            .all(|(idx, expected)| pcrs.get(*idx).map_or(false, |actual| actual == expected))
    }
}
