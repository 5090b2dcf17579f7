use chrono::{DateTime, FixedOffset, NaiveTime, Offset, Utc};

pub fn time_millis() -> i64 {
    let time: DateTime<chrono::Utc> = Utc::now();
    time.timestamp_millis()
}

/// Shift a utc instant into a tenant's local time.
pub fn local_time(
    now: DateTime<Utc>,
    utc_offset_minutes: i32,
) -> DateTime<FixedOffset> {
    // out of range offsets fall back to utc
    let offset = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix());
    now.with_timezone(&offset)
}

/// Parse a 24h `HH:MM` clock value.
pub fn parse_hhmm(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M").ok()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike, Utc};

    use super::{local_time, parse_hhmm};

    #[test]
    fn test_local_time_applies_offset() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 2, 30, 0).unwrap();
        let local = local_time(now, -180);
        assert_eq!(local.hour(), 23);
        assert_eq!(local.minute(), 30);
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("08:05").map(|t| (t.hour(), t.minute())), Some((8, 5)));
        assert_eq!(parse_hhmm(" 23:59 ").map(|t| t.hour()), Some(23));
        assert!(parse_hhmm("24:00").is_none());
        assert!(parse_hhmm("8h").is_none());
    }
}
