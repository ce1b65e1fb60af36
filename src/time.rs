//! Wall-clock helpers for session naming, frame stamps and sample records.
//!
//! Everything here is UTC derived from the system clock. The epoch-to-civil
//! conversion is done by hand; the rig only ever formats the current time and
//! never parses or converts zones, so a calendar crate would be dead weight.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch as `f64`, written into every sample record.
pub fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

struct Civil {
    year: i64,
    month: u64,
    day: i64,
    hour: u64,
    minute: u64,
    second: u64,
}

fn civil_from_epoch(secs: u64) -> Civil {
    let secs_per_day = 86400u64;
    let days = secs / secs_per_day;
    let time_of_day = secs % secs_per_day;
    let hour = time_of_day / 3600;
    let minute = (time_of_day % 3600) / 60;
    let second = time_of_day % 60;

    let mut year = 1970i64;
    let mut remaining_days = days as i64;
    loop {
        let days_in_year = if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) {
            366
        } else {
            365
        };
        if remaining_days < days_in_year {
            break;
        }
        remaining_days -= days_in_year;
        year += 1;
    }
    let leap = year % 4 == 0 && (year % 100 != 0 || year % 400 == 0);
    let days_in_months = [
        31,
        if leap { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ];
    let mut month = 0u64;
    for &dim in &days_in_months {
        if remaining_days < dim {
            break;
        }
        remaining_days -= dim;
        month += 1;
    }
    Civil {
        year,
        month: month + 1,
        day: remaining_days + 1,
        hour,
        minute,
        second,
    }
}

fn format_session(secs: u64) -> String {
    let c = civil_from_epoch(secs);
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        c.year, c.month, c.day, c.hour, c.minute, c.second
    )
}

fn format_clock(secs: u64) -> String {
    let c = civil_from_epoch(secs);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        c.year, c.month, c.day, c.hour, c.minute, c.second
    )
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// `YYYYMMDD_HHMMSS` — the shared suffix for every file of one session.
pub fn session_timestamp() -> String {
    format_session(epoch_secs())
}

/// `YYYY-MM-DD HH:MM:SS` — the string stamped onto recorded frames.
pub fn clock_text() -> String {
    format_clock(epoch_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_start() {
        assert_eq!(format_session(0), "19700101_000000");
        assert_eq!(format_clock(0), "1970-01-01 00:00:00");
    }

    #[test]
    fn test_known_instant() {
        // 2023-11-14 22:13:20 UTC
        assert_eq!(format_session(1_700_000_000), "20231114_221320");
        assert_eq!(format_clock(1_700_000_000), "2023-11-14 22:13:20");
    }

    #[test]
    fn test_leap_day() {
        // 2024-02-29 00:00:00 UTC
        assert_eq!(format_session(1_709_164_800), "20240229_000000");
    }

    #[test]
    fn test_end_of_year() {
        // 2023-12-31 23:59:59 UTC
        assert_eq!(format_session(1_704_067_199), "20231231_235959");
    }

    #[test]
    fn test_unix_time_is_recent() {
        // Anything after 2020 proves the clock plumbing works.
        assert!(unix_time() > 1.577e9);
    }
}
