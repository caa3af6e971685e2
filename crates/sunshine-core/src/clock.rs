//! Wall-clock time, time zones and the face's text formats

use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc};
use core::fmt::Write;
use heapless::String;

/// Milliseconds in one day.
pub const DAY_MS: i64 = 86_400_000;

const WEEKDAYS: [&str; 7] = ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];
const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Source of the current instant and the device's local time zone.
pub trait Clock {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;

    /// The zone currently configured on the device.
    fn local_zone(&self) -> Zone;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_millis(&self) -> i64 {
        (**self).now_millis()
    }

    fn local_zone(&self) -> Zone {
        (**self).local_zone()
    }
}

impl<T: Clock + ?Sized> Clock for alloc::sync::Arc<T> {
    fn now_millis(&self) -> i64 {
        (**self).now_millis()
    }

    fn local_zone(&self) -> Zone {
        (**self).local_zone()
    }
}

/// A named fixed-offset time zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    id: String<32>,
    offset_secs: i32,
}

impl Zone {
    pub fn utc() -> Self {
        Self::new("UTC", 0)
    }

    /// Offsets are clamped to the ±24 h range chrono accepts. Ids longer
    /// than 32 bytes are truncated.
    pub fn new(id: &str, offset_secs: i32) -> Self {
        let mut name = String::new();
        for ch in id.chars() {
            if name.push(ch).is_err() {
                break;
            }
        }
        Self {
            id: name,
            offset_secs: offset_secs.clamp(-86_399, 86_399),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn offset_secs(&self) -> i32 {
        self.offset_secs
    }

    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.offset_secs).unwrap_or_else(|| Utc.fix())
    }
}

impl Default for Zone {
    fn default() -> Self {
        Self::utc()
    }
}

/// A broken-down local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallTime {
    inner: DateTime<FixedOffset>,
}

impl WallTime {
    /// The instant `millis` seen from `zone`.
    ///
    /// Instants outside chrono's range fall back to the epoch.
    pub fn at(millis: i64, zone: &Zone) -> Self {
        let utc = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default();
        Self {
            inner: utc.with_timezone(&zone.offset()),
        }
    }

    pub fn hour(&self) -> u32 {
        self.inner.hour()
    }

    pub fn minute(&self) -> u32 {
        self.inner.minute()
    }

    pub fn second(&self) -> u32 {
        self.inner.second()
    }

    /// `H:MM` in 24-hour form, or `H:MM:SS` when `with_seconds`.
    pub fn clock_text(&self, with_seconds: bool) -> String<16> {
        let mut text = String::new();
        let _ = write!(text, "{}:{:02}", self.hour(), self.minute());
        if with_seconds {
            let _ = write!(text, ":{:02}", self.second());
        }
        text
    }

    /// Upper-cased date line, e.g. `MON, OCT 19 2026`.
    pub fn date_text(&self) -> String<24> {
        let weekday = WEEKDAYS[self.inner.weekday().num_days_from_monday() as usize];
        let month = MONTHS[self.inner.month0() as usize];
        let mut text = String::new();
        let _ = write!(
            text,
            "{}, {} {:02} {}",
            weekday,
            month,
            self.inner.day(),
            self.inner.year()
        );
        text
    }
}

/// Epoch millis of local midnight on the day containing `millis`.
pub fn start_of_local_day(millis: i64, zone: &Zone) -> i64 {
    let offset_ms = i64::from(zone.offset_secs()) * 1_000;
    let local = millis + offset_ms;
    local - local.rem_euclid(DAY_MS) - offset_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2026-10-19 14:05:09 UTC, a Monday
    const MONDAY_AFTERNOON: i64 = 1_792_418_709_000;

    #[test]
    fn test_clock_text_pads_minutes_and_seconds() {
        let time = WallTime::at(MONDAY_AFTERNOON, &Zone::utc());
        assert_eq!(time.clock_text(false).as_str(), "14:05");
        assert_eq!(time.clock_text(true).as_str(), "14:05:09");
    }

    #[test]
    fn test_date_text_is_upper_case() {
        let time = WallTime::at(MONDAY_AFTERNOON, &Zone::utc());
        assert_eq!(time.date_text().as_str(), "MON, OCT 19 2026");
    }

    #[test]
    fn test_zone_shifts_wall_time() {
        let tokyo = Zone::new("Asia/Tokyo", 9 * 3600);
        let time = WallTime::at(MONDAY_AFTERNOON, &tokyo);
        assert_eq!(time.clock_text(false).as_str(), "23:05");

        let samoa = Zone::new("Pacific/Apia", 13 * 3600);
        let time = WallTime::at(MONDAY_AFTERNOON, &samoa);
        assert_eq!(time.date_text().as_str(), "TUE, OCT 20 2026");
    }

    #[test]
    fn test_start_of_local_day() {
        let utc_midnight = MONDAY_AFTERNOON - (14 * 3600 + 5 * 60 + 9) * 1000;
        assert_eq!(start_of_local_day(MONDAY_AFTERNOON, &Zone::utc()), utc_midnight);

        let new_york = Zone::new("America/New_York", -4 * 3600);
        assert_eq!(
            start_of_local_day(MONDAY_AFTERNOON, &new_york),
            utc_midnight + 4 * 3600 * 1000
        );
    }

    #[test]
    fn test_long_zone_id_truncated() {
        let zone = Zone::new("America/Argentina/ComodRivadavia/Extra", 0);
        assert_eq!(zone.id().len(), 32);
    }
}
