//! # PCR抽出
//!
//! `pcrs` フィールドは常に16エントリ（キー 0〜15、値は48バイトのバイト列）。
//! 各エントリは `キー(1) || 0x58 0x30` の3バイトヘッダーと48バイトの値で、
//! 51バイト間隔で並ぶ。先頭ヘッダーが一致すれば各スロットの位置は
//! `index * 51` で決まるため、全エントリを走査せずに必要なスロットだけ取り出す。

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::AttestationError;

/// PCR値のバイト長（SHA-384）。
pub const PCR_LEN: usize = 48;
/// `pcrs` マップのエントリ数。
pub const PCR_COUNT: usize = 16;

const ENTRY_STRIDE: usize = 3 + PCR_LEN;

/// `"pcrs"` キー、16エントリのマップヘッダー、PCR0のエントリヘッダー。
const PCRS_PREFIX: [u8; 9] = [0x64, b'p', b'c', b'r', b's', 0xb0, 0x00, 0x58, 0x30];

/// `pcrs` フィールド全体（キーを含む）のバイト長。
pub const PCRS_FIELD_LEN: usize = (PCR_COUNT - 1) * ENTRY_STRIDE + PCR_LEN + PCRS_PREFIX.len();

/// 抽出対象のPCRインデックス。
pub const EXTRACTED_SLOTS: [u8; 6] = [0, 1, 2, 3, 4, 8];

/// 1つのPCR値。
pub type Pcr = [u8; PCR_LEN];

/// Attestation Documentから抽出したPCR値。
///
/// - PCR0: Enclaveイメージ
/// - PCR1: Linuxカーネル・ブートストラップ
/// - PCR2: アプリケーション
/// - PCR3: 親インスタンスのIAMロール
/// - PCR4: 親インスタンスID
/// - PCR8: Enclaveイメージ署名証明書
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pcrs {
    #[serde(with = "hex::serde")]
    pub pcr0: Pcr,
    #[serde(with = "hex::serde")]
    pub pcr1: Pcr,
    #[serde(with = "hex::serde")]
    pub pcr2: Pcr,
    #[serde(with = "hex::serde")]
    pub pcr3: Pcr,
    #[serde(with = "hex::serde")]
    pub pcr4: Pcr,
    #[serde(with = "hex::serde")]
    pub pcr8: Pcr,
}

impl Pcrs {
    /// インデックス指定でPCR値を取得する。抽出対象外のインデックスは `None`。
    pub fn get(&self, index: u8) -> Option<&Pcr> {
        match index {
            0 => Some(&self.pcr0),
            1 => Some(&self.pcr1),
            2 => Some(&self.pcr2),
            3 => Some(&self.pcr3),
            4 => Some(&self.pcr4),
            8 => Some(&self.pcr8),
            _ => None,
        }
    }

    /// インデックス → 測定値 のマップに変換する。
    pub fn to_map(&self) -> BTreeMap<u8, Vec<u8>> {
        EXTRACTED_SLOTS
            .iter()
            .filter_map(|&idx| self.get(idx).map(|pcr| (idx, pcr.to_vec())))
            .collect()
    }
}

/// `"pcrs"` キーから始まる `input` からPCR値を抽出し、消費バイト数を返す。
///
/// 消費バイト数は使用するスロットに関係なく常に [`PCRS_FIELD_LEN`]。
pub fn extract_pcrs(input: &[u8]) -> Result<(Pcrs, usize), AttestationError> {
    if !input.starts_with(&PCRS_PREFIX) {
        return Err(AttestationError::UnexpectedField("pcrs"));
    }
    if input.len() < PCRS_FIELD_LEN {
        return Err(AttestationError::TrailingOrMissingData {
            consumed: PCRS_FIELD_LEN,
            len: input.len(),
        });
    }

    let slot = |index: usize| -> Pcr {
        let start = PCRS_PREFIX.len() + index * ENTRY_STRIDE;
        let mut pcr = [0u8; PCR_LEN];
        pcr.copy_from_slice(&input[start..start + PCR_LEN]);
        pcr
    };

    let pcrs = Pcrs {
        pcr0: slot(0),
        pcr1: slot(1),
        pcr2: slot(2),
        pcr3: slot(3),
        pcr4: slot(4),
        pcr8: slot(8),
    };
    Ok((pcrs, PCRS_FIELD_LEN))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_pcrs(fill: impl Fn(u8) -> u8) -> Vec<u8> {
        let mut out = vec![0x64, b'p', b'c', b'r', b's', 0xb0];
        for i in 0..PCR_COUNT as u8 {
            out.extend_from_slice(&[i, 0x58, 0x30]);
            out.extend_from_slice(&[fill(i); PCR_LEN]);
        }
        out
    }

    #[test]
    fn test_field_len() {
        assert_eq!(PCRS_FIELD_LEN, 15 * 51 + 48 + 9);
        assert_eq!(encode_pcrs(|i| i).len(), PCRS_FIELD_LEN);
    }

    #[test]
    fn test_extracts_selected_slots() {
        let mut input = encode_pcrs(|i| i + 0x10);
        input.extend_from_slice(b"trailing");

        let (pcrs, consumed) = extract_pcrs(&input).unwrap();
        assert_eq!(consumed, PCRS_FIELD_LEN);
        assert_eq!(pcrs.pcr0, [0x10; PCR_LEN]);
        assert_eq!(pcrs.pcr4, [0x14; PCR_LEN]);
        assert_eq!(pcrs.pcr8, [0x18; PCR_LEN]);
        assert_eq!(pcrs.get(3), Some(&[0x13; PCR_LEN]));
        assert_eq!(pcrs.get(5), None);
        assert_eq!(pcrs.to_map().keys().copied().collect::<Vec<_>>(), EXTRACTED_SLOTS);
    }

    #[test]
    fn test_rejects_wrong_header() {
        let mut input = encode_pcrs(|_| 0);
        // 15エントリのマップ
        input[5] = 0xaf;
        assert_eq!(
            extract_pcrs(&input).unwrap_err(),
            AttestationError::UnexpectedField("pcrs")
        );
    }

    #[test]
    fn test_rejects_truncated_map() {
        let input = encode_pcrs(|_| 0);
        assert!(matches!(
            extract_pcrs(&input[..PCRS_FIELD_LEN - 1]),
            Err(AttestationError::TrailingOrMissingData { .. })
        ));
    }
}
