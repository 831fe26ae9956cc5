//! 境界チェック付きのバイト列カーソル。
//!
//! 読み出しが範囲外になった場合は `None` を返し、
//! 呼び出し側が文脈に応じたエラーに変換する。

#[derive(Debug, Clone)]
pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// 未読部分のスライス。
    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }

    /// 次の1バイトを読まずに返す。
    pub(crate) fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub(crate) fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    pub(crate) fn take_array<const N: usize>(&mut self) -> Option<&'a [u8; N]> {
        self.take(N)?.try_into().ok()
    }

    pub(crate) fn read_u8(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    pub(crate) fn read_u16(&mut self) -> Option<u16> {
        self.take_array::<2>().map(|b| u16::from_be_bytes(*b))
    }

    pub(crate) fn read_u64(&mut self) -> Option<u64> {
        self.take_array::<8>().map(|b| u64::from_be_bytes(*b))
    }

    /// 先頭が `prefix` と完全一致する場合のみ消費して `true` を返す。
    /// 一致しない場合はカーソルを動かさない。
    pub(crate) fn eat(&mut self, prefix: &[u8]) -> bool {
        match self.data.get(self.pos..self.pos + prefix.len()) {
            Some(head) if head == prefix => {
                self.pos += prefix.len();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn skip(&mut self, n: usize) -> Option<()> {
        self.take(n).map(|_| ())
    }
}
