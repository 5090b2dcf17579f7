use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::utils::time::{local_time, parse_hhmm};

/// Opening hours of one weekday, `HH:MM` in tenant local time.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DayWindow {
    pub active: bool,
    pub start: String,
    pub end: String,
}

/// Weekly business hours referenced by schedule nodes.
///
/// Days are keyed by name. English (`monday`, `mon`) and Portuguese
/// (`segunda`, `sábado`) names are accepted in any case.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// falls back to the engine setting when absent
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    #[serde(default)]
    pub days: HashMap<String, DayWindow>,
}

impl Schedule {
    fn window(
        &self,
        day: Weekday,
    ) -> Option<(NaiveTime, NaiveTime)> {
        self.days.iter().find(|(name, _)| weekday_from_name(name) == Some(day)).and_then(|(_, w)| {
            if !w.active {
                return None;
            }
            Some((parse_hhmm(&w.start)?, parse_hhmm(&w.end)?))
        })
    }

    /// Whether `now` falls inside an active window.
    ///
    /// Bounds are inclusive. A window whose end is before its start runs past
    /// midnight into the following day.
    pub fn is_open(
        &self,
        now: DateTime<Utc>,
        default_offset_minutes: i32,
    ) -> bool {
        let local = local_time(now, self.utc_offset_minutes.unwrap_or(default_offset_minutes));
        let t = local.time();
        let today = local.weekday();

        if let Some((start, end)) = self.window(today) {
            if start <= end {
                if start <= t && t <= end {
                    return true;
                }
            } else if t >= start {
                return true;
            }
        }

        // overnight spill from yesterday
        if let Some((start, end)) = self.window(today.pred())
            && start > end
            && t <= end
        {
            return true;
        }

        false
    }
}

pub fn weekday_from_name(name: &str) -> Option<Weekday> {
    let day = match name.trim().to_lowercase().as_str() {
        "monday" | "mon" | "segunda" | "segunda-feira" | "seg" => Weekday::Mon,
        "tuesday" | "tue" | "terca" | "terça" | "terça-feira" | "terca-feira" | "ter" => Weekday::Tue,
        "wednesday" | "wed" | "quarta" | "quarta-feira" | "qua" => Weekday::Wed,
        "thursday" | "thu" | "quinta" | "quinta-feira" | "qui" => Weekday::Thu,
        "friday" | "fri" | "sexta" | "sexta-feira" | "sex" => Weekday::Fri,
        "saturday" | "sat" | "sabado" | "sábado" | "sab" | "sáb" => Weekday::Sat,
        "sunday" | "sun" | "domingo" | "dom" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::Schedule;

    fn schedule(days: serde_json::Value) -> Schedule {
        serde_json::from_value(json!({ "id": "s1", "name": "office", "days": days })).unwrap()
    }

    #[test]
    fn test_inside_and_outside_day_window() {
        let s = schedule(json!({
            "monday": { "active": true, "start": "08:00", "end": "18:00" },
            "tuesday": { "active": false, "start": "08:00", "end": "18:00" }
        }));
        // 2024-03-04 is a monday
        assert!(s.is_open(Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap(), 0));
        assert!(s.is_open(Utc.with_ymd_and_hms(2024, 3, 4, 18, 0, 0).unwrap(), 0));
        assert!(!s.is_open(Utc.with_ymd_and_hms(2024, 3, 4, 18, 1, 0).unwrap(), 0));
        assert!(!s.is_open(Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap(), 0));
        assert!(!s.is_open(Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).unwrap(), 0));
    }

    #[test]
    fn test_offset_moves_the_local_day() {
        let s = schedule(json!({ "Segunda": { "active": true, "start": "20:00", "end": "23:00" } }));
        // tuesday 01:00 utc is monday 22:00 at utc-3
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 1, 0, 0).unwrap();
        assert!(!s.is_open(now, 0));
        assert!(s.is_open(now, -180));
    }

    #[test]
    fn test_overnight_window() {
        let s = schedule(json!({ "fri": { "active": true, "start": "22:00", "end": "02:00" } }));
        assert!(s.is_open(Utc.with_ymd_and_hms(2024, 3, 8, 23, 0, 0).unwrap(), 0));
        assert!(s.is_open(Utc.with_ymd_and_hms(2024, 3, 9, 1, 30, 0).unwrap(), 0));
        assert!(!s.is_open(Utc.with_ymd_and_hms(2024, 3, 9, 3, 0, 0).unwrap(), 0));
        assert!(!s.is_open(Utc.with_ymd_and_hms(2024, 3, 8, 21, 0, 0).unwrap(), 0));
    }

    #[test]
    fn test_malformed_window_is_closed() {
        let s = schedule(json!({ "monday": { "active": true, "start": "8am", "end": "18:00" } }));
        assert!(!s.is_open(Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap(), 0));
    }
}
