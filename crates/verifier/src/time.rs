//! # UTCTime → Unix秒 変換
//!
//! X.509のUTCTime（`YYMMDDHHMMSSZ`、13バイト）をUnix秒に変換する。
//! 2000-01-01T00:00:00Z を起点とした日数計算の閉形式で求める。
//!
//! 2桁年は 2000〜2049 年として解釈する。RFC 5280 で 19YY を意味する
//! `50`〜`99` は起点より前になるため [`AttestationError::InvalidTimestamp`] とする。

use crate::error::AttestationError;

/// 2000-01-01T00:00:00Z のUnix秒。
pub const EPOCH_2000: u64 = 946_684_800;

/// UTCTimeのバイト長。
pub const UTC_TIME_LEN: usize = 13;

const SECONDS_PER_DAY: u64 = 86_400;

/// 各月1日時点の年初からの累積日数（平年）。
const CUMULATIVE_DAYS: [u64; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

const DAYS_IN_MONTH: [u64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// グレゴリオ暦の閏年判定。
pub fn is_leap_year(year: u64) -> bool {
    (year % 4 == 0) && (year % 100 != 0 || year % 400 == 0)
}

fn days_in_month(year: u64, month: u64) -> u64 {
    if month == 2 && is_leap_year(year) {
        29
    } else {
        DAYS_IN_MONTH[(month - 1) as usize]
    }
}

/// 2000年1月1日から `year` 年1月1日までの日数。
fn days_before_year(year: u64) -> u64 {
    let y = year - 2000;
    // 2000年自体が閏年なので、起点からの閏日は切り上げで数える
    y * 365 + (y + 3) / 4 - (y + 99) / 100 + (y + 399) / 400
}

/// 日時成分をUnix秒に変換する。
///
/// 呼び出し側で `year >= 2000` かつ各成分が範囲内であることを保証すること。
pub fn to_epoch(year: u64, month: u64, day: u64, hour: u64, minute: u64, second: u64) -> u64 {
    let mut days = days_before_year(year) + CUMULATIVE_DAYS[(month - 1) as usize] + (day - 1);
    if month > 2 && is_leap_year(year) {
        days += 1;
    }
    EPOCH_2000 + days * SECONDS_PER_DAY + hour * 3600 + minute * 60 + second
}

/// UTCTime（`YYMMDDHHMMSSZ`）をパースしてUnix秒を返す。
pub fn parse_utc_time(raw: &[u8; UTC_TIME_LEN]) -> Result<u64, AttestationError> {
    if raw[12] != b'Z' {
        return Err(AttestationError::InvalidTimestamp("タイムゾーンが 'Z' ではありません"));
    }

    let mut fields = [0u64; 6];
    for (i, field) in fields.iter_mut().enumerate() {
        let hi = digit(raw[2 * i])?;
        let lo = digit(raw[2 * i + 1])?;
        *field = hi * 10 + lo;
    }
    let [yy, month, day, hour, minute, second] = fields;

    if yy >= 50 {
        return Err(AttestationError::InvalidTimestamp("2000年より前の日時は扱えません"));
    }
    let year = 2000 + yy;

    if !(1..=12).contains(&month) {
        return Err(AttestationError::InvalidTimestamp("月が範囲外です"));
    }
    if day == 0 || day > days_in_month(year, month) {
        return Err(AttestationError::InvalidTimestamp("日が範囲外です"));
    }
    if hour > 23 || minute > 59 || second > 59 {
        return Err(AttestationError::InvalidTimestamp("時刻が範囲外です"));
    }

    Ok(to_epoch(year, month, day, hour, minute, second))
}

fn digit(b: u8) -> Result<u64, AttestationError> {
    let d = b.wrapping_sub(b'0');
    if d > 9 {
        return Err(AttestationError::InvalidTimestamp("数字以外の文字が含まれています"));
    }
    Ok(d as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> [u8; UTC_TIME_LEN] {
        s.as_bytes().try_into().unwrap()
    }

    #[test]
    fn test_known_instants() {
        assert_eq!(parse_utc_time(&utc("000101000000Z")).unwrap(), 946_684_800);
        // AWS Nitroルート証明書のnotBefore / notAfter
        assert_eq!(parse_utc_time(&utc("191028132805Z")).unwrap(), 1_572_269_285);
        assert_eq!(parse_utc_time(&utc("491028142805Z")).unwrap(), 2_519_044_085);
        assert_eq!(parse_utc_time(&utc("240229120000Z")).unwrap(), 1_709_208_000);
        assert_eq!(parse_utc_time(&utc("491231235959Z")).unwrap(), 2_524_607_999);
    }

    #[test]
    fn test_leap_years() {
        assert!(is_leap_year(2000));
        assert!(is_leap_year(2024));
        assert!(!is_leap_year(2023));
        assert!(!is_leap_year(2100));
        assert!(is_leap_year(2400));
    }

    #[test]
    fn test_matches_reference_calendar() {
        for year in 2000..2050u16 {
            for month in 1..=12u8 {
                for day in [1u8, 15, 28] {
                    let reference = der::DateTime::new(year, month, day, 13, 7, 59)
                        .unwrap()
                        .unix_duration()
                        .as_secs();
                    let ours = to_epoch(year as u64, month as u64, day as u64, 13, 7, 59);
                    assert_eq!(ours, reference, "{year}-{month}-{day}");
                }
            }
            let feb_end = if is_leap_year(year as u64) { 29 } else { 28 };
            let reference = der::DateTime::new(year, 2, feb_end, 23, 59, 59)
                .unwrap()
                .unix_duration()
                .as_secs();
            assert_eq!(to_epoch(year as u64, 2, feb_end as u64, 23, 59, 59), reference);
        }
    }

    #[test]
    fn test_rejects_non_utc_zone() {
        assert_eq!(
            parse_utc_time(&utc("240101000000+")),
            Err(AttestationError::InvalidTimestamp("タイムゾーンが 'Z' ではありません"))
        );
    }

    #[test]
    fn test_rejects_out_of_range_fields() {
        assert!(parse_utc_time(&utc("241301000000Z")).is_err());
        assert!(parse_utc_time(&utc("230229000000Z")).is_err());
        assert!(parse_utc_time(&utc("240229000000Z")).is_ok());
        assert!(parse_utc_time(&utc("240101240000Z")).is_err());
        assert!(parse_utc_time(&utc("24010100a000Z")).is_err());
        assert!(parse_utc_time(&utc("990101000000Z")).is_err());
    }
}
