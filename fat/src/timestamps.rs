// MS-DOS date/time encoding used by directory entries.
// Date: bits 15-9 year since 1980, bits 8-5 month, bits 4-0 day.
// Time: bits 15-11 hours, bits 10-5 minutes, bits 4-0 seconds/2.
// All stamps are taken and reported in UTC.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};

fn fat_epoch() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1980, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Decode an on-disk date/time pair. Out-of-range fields decode to the
/// FAT epoch (1980-01-01) rather than failing; stale media carries them.
pub fn decode_datetime(date: u16, time: u16) -> DateTime<Utc> {
    let year = ((date >> 9) & 0x7F) as i32 + 1980;
    let month = ((date >> 5) & 0x0F) as u32;
    let day = (date & 0x1F) as u32;

    let hour = ((time >> 11) & 0x1F) as u32;
    let minute = ((time >> 5) & 0x3F) as u32;
    let second = ((time & 0x1F) * 2) as u32;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .map(|dt| dt.and_utc())
        .unwrap_or_else(fat_epoch)
}

/// Encode a timestamp as an on-disk (date, time) pair. The year is clamped
/// to the representable 1980..=2107 window; seconds round down to the
/// two-second granularity of the format.
pub fn encode_datetime(when: DateTime<Utc>) -> (u16, u16) {
    let year = when.year().clamp(1980, 2107) - 1980;
    let date = ((year as u16) << 9) | ((when.month() as u16) << 5) | when.day() as u16;
    let time =
        ((when.hour() as u16) << 11) | ((when.minute() as u16) << 5) | (when.second() as u16 / 2);
    (date, time)
}

/// Tenths-of-a-second refinement stored alongside the create time (0..=199).
pub fn encode_tenths(when: DateTime<Utc>) -> u8 {
    ((when.second() % 2) * 100 + when.timestamp_subsec_millis() / 10) as u8
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_datetime_round_trip() {
        // 2024-01-15 14:30:06 UTC; even seconds survive the /2 encoding
        let when = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 6).unwrap();
        let (date, time) = encode_datetime(when);
        assert_eq!(decode_datetime(date, time), when);
    }

    #[test]
    fn test_known_encoding() {
        let when = Utc.with_ymd_and_hms(1980, 1, 1, 0, 0, 0).unwrap();
        let (date, time) = encode_datetime(when);
        assert_eq!(date, (1 << 5) | 1);
        assert_eq!(time, 0);
    }

    #[test]
    fn test_year_clamped() {
        let early = Utc.with_ymd_and_hms(1970, 6, 1, 0, 0, 0).unwrap();
        let (date, _) = encode_datetime(early);
        assert_eq!((date >> 9) & 0x7F, 0);
    }

    #[test]
    fn test_invalid_date_decodes_to_epoch() {
        // month 15, day 0
        let got = decode_datetime(0x1E0F | (15 << 5), 0);
        assert_eq!(got.year(), 1980);
    }

    #[test]
    fn test_tenths_in_range() {
        let t = encode_tenths(now());
        assert!(t < 200);
    }
}
