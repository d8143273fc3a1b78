//! Injected clock, lenient timestamp parsing and display formatting.
//!
//! Every deriver takes a [`Clock`] instead of reading the system time, so a
//! derivation is a pure function of `(snapshot, now, config)`. The clock also
//! carries the local UTC offset used for calendar-day bucketing and display.

#![allow(missing_docs)]

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime,
    SecondsFormat, Utc,
};
use serde::{Deserialize, Serialize};

/// Which weekday a week begins on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    Monday,
    Sunday,
}

impl WeekStart {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Sunday => "sunday",
        }
    }
}

impl fmt::Display for WeekStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeekStart {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monday" | "mon" => Ok(Self::Monday),
            "sunday" | "sun" => Ok(Self::Sunday),
            other => Err(format!("unknown week start {other:?} (expected monday|sunday)")),
        }
    }
}

/// A fixed instant plus the local offset it should be viewed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    now: DateTime<FixedOffset>,
}

impl Clock {
    #[must_use]
    pub const fn new(now: DateTime<FixedOffset>) -> Self {
        Self { now }
    }

    /// Current system time in the host's local offset.
    #[must_use]
    pub fn system() -> Self {
        Self::new(Local::now().fixed_offset())
    }

    /// Parse an RFC 3339 override such as `2026-10-17T15:04:00+02:00`.
    pub fn from_rfc3339(raw: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw.trim()).map(Self::new)
    }

    #[must_use]
    pub const fn now(&self) -> DateTime<FixedOffset> {
        self.now
    }

    #[must_use]
    pub fn now_utc(&self) -> DateTime<Utc> {
        self.now.with_timezone(&Utc)
    }

    #[must_use]
    pub fn now_millis(&self) -> i64 {
        self.now.timestamp_millis()
    }

    /// `toISOString`-style rendering of now, used when an alert has no timestamp.
    #[must_use]
    pub fn now_iso(&self) -> String {
        self.now_utc().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        *self.now.offset()
    }

    /// Local calendar date of now.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// View an instant in the clock's local offset.
    #[must_use]
    pub fn local(&self, t: DateTime<Utc>) -> DateTime<FixedOffset> {
        t.with_timezone(&self.offset())
    }

    /// Local calendar date of an instant.
    #[must_use]
    pub fn local_date(&self, t: DateTime<Utc>) -> NaiveDate {
        self.local(t).date_naive()
    }

    /// Local midnight at the start of `date`, as an instant.
    #[must_use]
    pub fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        self.from_local_naive(date.and_time(NaiveTime::MIN))
    }

    /// First day of the current week under the given convention.
    #[must_use]
    pub fn week_start_date(&self, convention: WeekStart) -> NaiveDate {
        week_start_of(self.today(), convention)
    }

    /// Local midnight of the first day of the current week.
    #[must_use]
    pub fn week_start(&self, convention: WeekStart) -> DateTime<Utc> {
        self.local_midnight(self.week_start_date(convention))
    }

    /// Lenient timestamp parsing.
    ///
    /// Accepts RFC 3339, offset-suffixed ISO forms, naive date-times (read in the
    /// local offset) and bare `YYYY-MM-DD` dates (read as UTC midnight).
    #[must_use]
    pub fn parse(&self, raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
            return Some(t.with_timezone(&Utc));
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
            if let Ok(t) = DateTime::parse_from_str(raw, fmt) {
                return Some(t.with_timezone(&Utc));
            }
        }
        for fmt in [
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%d %H:%M",
        ] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
                return Some(self.from_local_naive(naive));
            }
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .map(|date| date.and_time(NaiveTime::MIN).and_utc())
    }

    /// Calendar date named by a key such as `2026-10-17`, falling back to the
    /// local date of any other parseable timestamp.
    #[must_use]
    pub fn parse_date_key(&self, raw: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .ok()
            .or_else(|| self.parse(raw).map(|t| self.local_date(t)))
    }

    fn from_local_naive(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        let utc = naive - Duration::seconds(i64::from(self.offset().local_minus_utc()));
        utc.and_utc()
    }
}

/// First day of the week containing `date`.
#[must_use]
pub fn week_start_of(date: NaiveDate, convention: WeekStart) -> NaiveDate {
    let back = match convention {
        WeekStart::Monday => date.weekday().num_days_from_monday(),
        WeekStart::Sunday => date.weekday().num_days_from_sunday(),
    };
    date - Duration::days(i64::from(back))
}

/// ISO-8601 week number (1..=53) of a calendar date.
#[must_use]
pub fn iso_week_number(date: NaiveDate) -> u32 {
    date.iso_week().week()
}

/// `(ISO week-year, ISO week number)`, comparable across year boundaries.
#[must_use]
pub fn iso_week_key(date: NaiveDate) -> (i32, u32) {
    (date.iso_week().year(), iso_week_number(date))
}

/// Half-up rounding toward +∞ (`round(-2.5) == -2`).
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn round_half_up(x: f64) -> i64 {
    if x.is_finite() { (x + 0.5).floor() as i64 } else { 0 }
}

/// `"Oct 17"`.
#[must_use]
pub fn month_day(t: DateTime<FixedOffset>) -> String {
    t.format("%b %-d").to_string()
}

/// `"Oct 17"` for a bare calendar date.
#[must_use]
pub fn month_day_of(date: NaiveDate) -> String {
    date.format("%b %-d").to_string()
}

/// `"03:04 PM"`.
#[must_use]
pub fn clock_time(t: DateTime<FixedOffset>) -> String {
    t.format("%I:%M %p").to_string()
}

/// `"Oct 17, 3:04 PM"`, used by the pet listing and analytics last visits.
#[must_use]
pub fn short_datetime(t: DateTime<FixedOffset>) -> String {
    t.format("%b %-d, %-I:%M %p").to_string()
}

/// Dashboard display formatter: `"Today, 03:04 PM"`, `"Yesterday, 03:04 PM"` or
/// `"Oct 15, 03:04 PM"` in the clock's local offset.
#[must_use]
pub fn display_instant(clock: &Clock, t: DateTime<Utc>) -> String {
    let local = clock.local(t);
    let date = local.date_naive();
    let today = clock.today();
    if date == today {
        format!("Today, {}", clock_time(local))
    } else if today.pred_opt() == Some(date) {
        format!("Yesterday, {}", clock_time(local))
    } else {
        format!("{}, {}", month_day(local), clock_time(local))
    }
}

/// Display formatter over raw text: empty ⇒ `"Never"`, unparseable ⇒ `"Invalid date"`.
#[must_use]
pub fn display_timestamp(clock: &Clock, raw: &str) -> String {
    if raw.trim().is_empty() {
        return "Never".to_string();
    }
    clock
        .parse(raw)
        .map_or_else(|| "Invalid date".to_string(), |t| display_instant(clock, t))
}

/// Relative label for the notification feed.
#[must_use]
pub fn relative_label(clock: &Clock, t: DateTime<Utc>) -> String {
    let secs = (clock.now_utc() - t).num_seconds();
    if secs < 60 {
        "Just now".to_string()
    } else if secs < 3_600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3_600)
    } else {
        month_day(clock.local(t))
    }
}

/// Device uptime milliseconds as `HH:MM:SS`.
#[must_use]
pub fn uptime_hms(ms: f64) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total = if ms.is_finite() && ms > 0.0 {
        (ms / 1000.0).floor() as u64
    } else {
        0
    };
    format!(
        "{:02}:{:02}:{:02}",
        total / 3_600,
        (total % 3_600) / 60,
        total % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(raw: &str) -> Clock {
        Clock::from_rfc3339(raw).expect("valid clock")
    }

    #[test]
    fn parses_rfc3339_and_offset_forms() {
        let c = clock("2026-10-17T12:00:00+00:00");
        let a = c.parse("2026-10-17T08:30:00Z").expect("rfc3339");
        let b = c.parse("2026-10-17T10:30:00+0200").expect("compact offset");
        assert_eq!(a, b);
    }

    #[test]
    fn naive_datetimes_use_local_offset() {
        let c = clock("2026-10-17T12:00:00+02:00");
        let t = c.parse("2026-10-17T10:00:00").expect("naive");
        assert_eq!(t.to_rfc3339(), "2026-10-17T08:00:00+00:00");
    }

    #[test]
    fn bare_dates_are_utc_midnight() {
        let c = clock("2026-10-17T12:00:00-07:00");
        let t = c.parse("2026-10-15").expect("date");
        assert_eq!(t.to_rfc3339(), "2026-10-15T00:00:00+00:00");
    }

    #[test]
    fn garbage_is_none() {
        let c = clock("2026-10-17T12:00:00Z");
        assert!(c.parse("").is_none());
        assert!(c.parse("yesterday-ish").is_none());
        assert!(c.parse("2026-13-45").is_none());
    }

    #[test]
    fn display_today_yesterday_and_older() {
        let c = clock("2026-10-17T18:00:00+00:00");
        assert_eq!(
            display_timestamp(&c, "2026-10-17T15:04:00Z"),
            "Today, 03:04 PM"
        );
        assert_eq!(
            display_timestamp(&c, "2026-10-16T09:15:00Z"),
            "Yesterday, 09:15 AM"
        );
        assert_eq!(
            display_timestamp(&c, "2026-10-15T15:04:00Z"),
            "Oct 15, 03:04 PM"
        );
        assert_eq!(display_timestamp(&c, ""), "Never");
        assert_eq!(display_timestamp(&c, "not a time"), "Invalid date");
    }

    #[test]
    fn display_respects_local_offset() {
        let c = clock("2026-10-17T01:00:00+09:00");
        // 2026-10-16T17:30Z is 02:30 on the 17th in +09:00.
        assert_eq!(
            display_timestamp(&c, "2026-10-16T17:30:00Z"),
            "Today, 02:30 AM"
        );
    }

    #[test]
    fn week_starts() {
        // 2026-10-17 is a Saturday.
        let c = clock("2026-10-17T12:00:00Z");
        assert_eq!(
            c.week_start_date(WeekStart::Monday),
            NaiveDate::from_ymd_opt(2026, 10, 12).expect("date")
        );
        assert_eq!(
            c.week_start_date(WeekStart::Sunday),
            NaiveDate::from_ymd_opt(2026, 10, 11).expect("date")
        );
        // A Sunday belongs to the previous Monday-start week.
        let sunday = NaiveDate::from_ymd_opt(2026, 10, 18).expect("date");
        assert_eq!(
            week_start_of(sunday, WeekStart::Monday),
            NaiveDate::from_ymd_opt(2026, 10, 12).expect("date")
        );
        assert_eq!(week_start_of(sunday, WeekStart::Sunday), sunday);
    }

    #[test]
    fn iso_weeks_across_year_boundary() {
        let d = NaiveDate::from_ymd_opt(2027, 1, 1).expect("date");
        assert_eq!(iso_week_number(d), 53);
        assert_eq!(iso_week_key(d), (2026, 53));
        let d = NaiveDate::from_ymd_opt(2026, 10, 17).expect("date");
        assert_eq!(iso_week_number(d), 42);
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(-2.5), -2);
        assert_eq!(round_half_up(-0.4), 0);
        assert_eq!(round_half_up(f64::NAN), 0);
    }

    #[test]
    fn relative_labels() {
        let c = clock("2026-10-17T12:00:00Z");
        let at = |raw: &str| c.parse(raw).expect("ts");
        assert_eq!(relative_label(&c, at("2026-10-17T11:59:30Z")), "Just now");
        assert_eq!(relative_label(&c, at("2026-10-17T11:55:00Z")), "5m ago");
        assert_eq!(relative_label(&c, at("2026-10-17T09:00:00Z")), "3h ago");
        assert_eq!(relative_label(&c, at("2026-10-15T09:00:00Z")), "Oct 15");
        assert_eq!(relative_label(&c, at("2026-10-18T09:00:00Z")), "Just now");
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(uptime_hms(3_723_000.0), "01:02:03");
        assert_eq!(uptime_hms(-5.0), "00:00:00");
    }
}
