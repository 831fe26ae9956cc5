//! # 制限付きCBORペイロードパーサー
//!
//! Nitro Secure Moduleが生成するペイロードは9要素のマップで、
//! キーの順序・値の型は常に同じ。汎用CBORデコーダーは使わず、
//! [`FIELDS`] の記述子テーブルに沿って先頭から完全一致で読み進める。
//!
//! | キー | 値 |
//! |------|----|
//! | `module_id` | text（1バイト長） |
//! | `digest` | text `"SHA384"` |
//! | `timestamp` | uint64（Unixミリ秒） |
//! | `pcrs` | map(16) int → bytes(48) |
//! | `certificate` | bytes（2バイト長） |
//! | `cabundle` | array(0〜15) of bytes（2バイト長） |
//! | `public_key` | bytes / null |
//! | `user_data` | bytes / null |
//! | `nonce` | bytes / null |
//!
//! 最後のフィールドの直後でペイロードがちょうど終わることを要求する。

use crate::chain::ChainWalker;
use crate::crypto::PublicKey;
use crate::cursor::Cursor;
use crate::error::AttestationError;
use crate::pcr::{self, Pcrs};
use crate::policy::TimestampPolicy;

/// 9要素のマップ。
const PAYLOAD_MAP_HEADER: u8 = 0xa9;

const CBOR_NULL: u8 = 0xf6;

/// フィールド値の読み方。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Value {
    /// 1バイト長のtext（プレフィックスに `0x78` を含む）
    Text8,
    /// プレフィックスだけで値まで確定している
    Fixed,
    /// 8バイトのuint（プレフィックスに `0x1b` を含む）
    Uint64,
    /// PCRマップ（キーを含めて [`pcr::extract_pcrs`] が読む）
    Pcrs,
    /// 2バイト長のbytes（プレフィックスに `0x59` を含む）
    Bytes16,
    /// cabundle配列（[`ChainWalker`] が読む）
    Chain,
    /// null またはbytes
    OptionalBytes,
}

/// フィールド記述子。`prefix` はキーのエンコードと、固定の場合は値の型ヘッダー。
#[derive(Debug)]
struct FieldSpec {
    name: &'static str,
    prefix: &'static [u8],
    value: Value,
}

const FIELDS: [FieldSpec; 9] = [
    FieldSpec {
        name: "module_id",
        prefix: b"\x69module_id\x78",
        value: Value::Text8,
    },
    FieldSpec {
        name: "digest",
        prefix: b"\x66digest\x66SHA384",
        value: Value::Fixed,
    },
    FieldSpec {
        name: "timestamp",
        prefix: b"\x69timestamp\x1b",
        value: Value::Uint64,
    },
    FieldSpec {
        name: "pcrs",
        prefix: b"",
        value: Value::Pcrs,
    },
    FieldSpec {
        name: "certificate",
        prefix: b"\x6bcertificate\x59",
        value: Value::Bytes16,
    },
    FieldSpec {
        name: "cabundle",
        prefix: b"\x68cabundle",
        value: Value::Chain,
    },
    FieldSpec {
        name: "public_key",
        prefix: b"\x6apublic_key",
        value: Value::OptionalBytes,
    },
    FieldSpec {
        name: "user_data",
        prefix: b"\x69user_data",
        value: Value::OptionalBytes,
    },
    FieldSpec {
        name: "nonce",
        prefix: b"\x65nonce",
        value: Value::OptionalBytes,
    },
];

/// パース済みペイロード。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPayload<'a> {
    pub module_id: &'a str,
    /// Unixミリ秒
    pub timestamp: u64,
    pub pcrs: Pcrs,
    /// チェーン検証で得たCOSE署名検証用の公開鍵
    pub enclave_key: PublicKey,
    pub public_key: Option<&'a [u8]>,
    pub user_data: Option<&'a [u8]>,
    pub nonce: Option<&'a [u8]>,
}

/// ペイロードパーサー。
pub struct PayloadParser<'a> {
    pub chain: ChainWalker<'a>,
    pub timestamp_policy: &'a dyn TimestampPolicy,
}

impl PayloadParser<'_> {
    /// ペイロードを先頭から最後までパースする。
    pub fn parse<'p>(&self, payload: &'p [u8]) -> Result<ParsedPayload<'p>, AttestationError> {
        let mut c = Cursor::new(payload);
        if !c.eat(&[PAYLOAD_MAP_HEADER]) {
            return Err(AttestationError::UnexpectedField("9要素のマップ"));
        }

        let mut module_id = "";
        let mut timestamp = 0;
        let mut pcrs = None;
        let mut certificate: &[u8] = &[];
        let mut enclave_key = None;
        let mut optional = [None; 3];
        let mut next_optional = optional.iter_mut();

        for field in &FIELDS {
            if !c.eat(field.prefix) {
                // 途中で切れている場合は長さ不足として扱う
                if c.remaining() < field.prefix.len() && field.prefix.starts_with(c.rest()) {
                    return Err(missing(&c));
                }
                return Err(AttestationError::UnexpectedField(field.name));
            }
            match field.value {
                Value::Fixed => {}
                Value::Text8 => {
                    let len = c.read_u8().ok_or_else(|| missing(&c))?;
                    let raw = c.take(len as usize).ok_or_else(|| missing(&c))?;
                    module_id = std::str::from_utf8(raw)
                        .map_err(|_| AttestationError::UnexpectedField(field.name))?;
                }
                Value::Uint64 => {
                    timestamp = c.read_u64().ok_or_else(|| missing(&c))?;
                    let now = self.chain.now;
                    if !self.timestamp_policy.accept(timestamp, now) {
                        return Err(AttestationError::StaleTimestamp {
                            timestamp_ms: timestamp,
                            now,
                        });
                    }
                }
                Value::Pcrs => {
                    let (extracted, consumed) = pcr::extract_pcrs(c.rest())?;
                    c.skip(consumed).ok_or_else(|| missing(&c))?;
                    pcrs = Some(extracted);
                }
                Value::Bytes16 => {
                    let len = c.read_u16().ok_or_else(|| missing(&c))?;
                    certificate = c.take(len as usize).ok_or_else(|| missing(&c))?;
                }
                Value::Chain => {
                    let (key, consumed) = self.chain.walk(certificate, c.rest())?;
                    c.skip(consumed).ok_or_else(|| missing(&c))?;
                    enclave_key = Some(key);
                }
                Value::OptionalBytes => {
                    let value = read_optional_bytes(&mut c, field.name)?;
                    if let Some(slot) = next_optional.next() {
                        *slot = value;
                    }
                }
            }
            tracing::debug!(field = field.name, offset = c.position(), "フィールドを読みました");
        }

        if !c.is_empty() {
            return Err(AttestationError::TrailingOrMissingData {
                consumed: c.position(),
                len: payload.len(),
            });
        }

        let (Some(pcrs), Some(enclave_key)) = (pcrs, enclave_key) else {
            return Err(missing(&c));
        };
        let [public_key, user_data, nonce] = optional;

        tracing::debug!(module_id, timestamp, "ペイロードをパースしました");
        Ok(ParsedPayload {
            module_id,
            timestamp,
            pcrs,
            enclave_key,
            public_key,
            user_data,
            nonce,
        })
    }
}

/// `null`（1バイト）またはbytes（inline / 1バイト長 / 2バイト長）を読む。
fn read_optional_bytes<'a>(
    c: &mut Cursor<'a>,
    name: &'static str,
) -> Result<Option<&'a [u8]>, AttestationError> {
    let header = c.read_u8().ok_or_else(|| missing(c))?;
    let len = match header {
        CBOR_NULL => return Ok(None),
        0x40..=0x57 => (header - 0x40) as usize,
        0x58 => c.read_u8().ok_or_else(|| missing(c))? as usize,
        0x59 => c.read_u16().ok_or_else(|| missing(c))? as usize,
        _ => return Err(AttestationError::UnexpectedField(name)),
    };
    c.take(len).map(Some).ok_or_else(|| missing(c))
}

fn missing(c: &Cursor<'_>) -> AttestationError {
    AttestationError::TrailingOrMissingData {
        consumed: c.position(),
        len: c.position() + c.remaining(),
    }
}
