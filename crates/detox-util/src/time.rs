//! Time utilities for detoxd
//!
//! Every time-dependent decision in the daemon reads one clock, exposed as
//! the [`Clock`] trait. [`SystemClock`] wraps [`now`]; [`ManualClock`] is a
//! settable clock for tests.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `DETOX_MOCK_TIME` environment variable shifts the
//! system clock so that routine windows can be exercised at any hour.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-26 22:30:00`)
//!
//! ```bash
//! DETOX_MOCK_TIME="2025-12-26 22:30:00" detoxd
//! ```

use chrono::{
    DateTime, Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Weekday,
};
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use crate::TimeParseError;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "DETOX_MOCK_TIME";

const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, MOCK_TIME_FORMAT) {
                    Ok(naive_dt) => match Local.from_local_datetime(&naive_dt).single() {
                        Some(mock_dt) => {
                            let offset = mock_dt.signed_duration_since(Local::now());
                            tracing::info!(
                                mock_time = %mock_time_str,
                                offset_secs = offset.num_seconds(),
                                "Mock time enabled"
                            );
                            return Some(offset);
                        }
                        None => tracing::warn!(
                            mock_time = %mock_time_str,
                            "Failed to convert mock time to local timezone"
                        ),
                    },
                    Err(_) => tracing::warn!(
                        mock_time = %mock_time_str,
                        expected_format = MOCK_TIME_FORMAT,
                        "Invalid mock time format"
                    ),
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting `DETOX_MOCK_TIME` in debug builds.
pub fn now() -> DateTime<Local> {
    let real_now = Local::now();
    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Source of "now" shared by the engine, reconciler and workers
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The system clock (with mock-time support)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn set(&self, to: DateTime<Local>) {
        *self.lock() = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.lock();
        *current += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Local>> {
        // A poisoned clock still holds a valid instant
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.lock()
    }
}

/// Format a DateTime as `HH:MM`.
pub fn format_clock_time(dt: &DateTime<Local>) -> String {
    dt.format("%H:%M").to_string()
}

/// Format a DateTime for display with full date and time.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Resolve a local date and time to an instant.
///
/// Returns `None` for wall-clock times skipped by a DST transition; ambiguous
/// times resolve to the earlier instant.
pub fn resolve_local(date: NaiveDate, time: NaiveTime) -> Option<DateTime<Local>> {
    Local.from_local_datetime(&date.and_time(time)).earliest()
}

/// Like [`resolve_local`], but moves a skipped wall-clock time forward past
/// the gap instead of dropping it.
pub fn resolve_local_forward(date: NaiveDate, time: NaiveTime) -> Option<DateTime<Local>> {
    resolve_local(date, time).or_else(|| {
        let shifted = date.and_time(time) + chrono::Duration::hours(1);
        Local.from_local_datetime(&shifted).earliest()
    })
}

/// Time of day with minute resolution, written `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    /// Parse `HH:MM` (a single-digit hour is accepted)
    pub fn parse(s: &str) -> Result<Self, TimeParseError> {
        let value = s.trim();
        let format_err = || TimeParseError::Format {
            value: value.to_string(),
        };

        let (h, m) = value.split_once(':').ok_or_else(format_err)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(format_err());
        }
        if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(format_err());
        }

        let hour: u8 = h.parse().map_err(|_| format_err())?;
        let minute: u8 = m.parse().map_err(|_| format_err())?;

        if hour >= 24 {
            return Err(TimeParseError::Hour {
                value: value.to_string(),
            });
        }
        if minute >= 60 {
            return Err(TimeParseError::Minute {
                value: value.to_string(),
            });
        }

        Ok(Self { hour, minute })
    }

    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0).unwrap_or(NaiveTime::MIN)
    }

    /// Returns seconds since midnight
    pub fn as_seconds_from_midnight(&self) -> u32 {
        (self.hour as u32) * 3600 + (self.minute as u32) * 60
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_seconds_from_midnight()
            .cmp(&other.as_seconds_from_midnight())
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for WallClock {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WallClock {
    type Error = TimeParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<WallClock> for String {
    fn from(w: WallClock) -> Self {
        w.to_string()
    }
}

const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Full English name of a weekday, as stored in snapshots
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Parse a weekday from its full name or common abbreviation, ignoring case
pub fn parse_weekday(s: &str) -> Result<Weekday, TimeParseError> {
    match s.trim().to_lowercase().as_str() {
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tues" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thurs" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        "sun" | "sunday" => Ok(Weekday::Sun),
        other => Err(TimeParseError::UnknownDay(other.to_string())),
    }
}

/// Days of the week mask
///
/// Serialized as a list of full English day names in Monday-first order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DaysOfWeek(u8);

impl DaysOfWeek {
    pub const MONDAY: u8 = 1 << 0;
    pub const TUESDAY: u8 = 1 << 1;
    pub const WEDNESDAY: u8 = 1 << 2;
    pub const THURSDAY: u8 = 1 << 3;
    pub const FRIDAY: u8 = 1 << 4;
    pub const SATURDAY: u8 = 1 << 5;
    pub const SUNDAY: u8 = 1 << 6;

    pub const WEEKDAYS: DaysOfWeek = DaysOfWeek(
        Self::MONDAY | Self::TUESDAY | Self::WEDNESDAY | Self::THURSDAY | Self::FRIDAY,
    );
    pub const WEEKENDS: DaysOfWeek = DaysOfWeek(Self::SATURDAY | Self::SUNDAY);
    pub const ALL_DAYS: DaysOfWeek = DaysOfWeek(0x7F);
    pub const NONE: DaysOfWeek = DaysOfWeek(0);

    pub fn new(mask: u8) -> Self {
        Self(mask & 0x7F)
    }

    fn bit(weekday: Weekday) -> u8 {
        1 << weekday.num_days_from_monday()
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        (self.0 & Self::bit(weekday)) != 0
    }

    pub fn insert(&mut self, weekday: Weekday) {
        self.0 |= Self::bit(weekday);
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Listed days in Monday-first order
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        ALL_WEEKDAYS.into_iter().filter(|d| self.contains(*d))
    }

    /// Full names of the listed days in Monday-first order
    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(weekday_name).collect()
    }

    /// Parse a list of day names or presets (`weekdays`, `weekends`, `all`)
    pub fn parse_list<S: AsRef<str>>(items: &[S]) -> Result<Self, TimeParseError> {
        let mut days = DaysOfWeek::NONE;
        for item in items {
            let item = item.as_ref().trim();
            match item.to_lowercase().as_str() {
                "weekdays" => days = days | Self::WEEKDAYS,
                "weekends" => days = days | Self::WEEKENDS,
                "all" | "daily" | "everyday" => days = days | Self::ALL_DAYS,
                _ => days.insert(parse_weekday(item)?),
            }
        }
        Ok(days)
    }
}

impl std::ops::BitOr for DaysOfWeek {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl FromIterator<Weekday> for DaysOfWeek {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut days = DaysOfWeek::NONE;
        for day in iter {
            days.insert(day);
        }
        days
    }
}

impl FromStr for DaysOfWeek {
    type Err = TimeParseError;

    /// Parse a comma-separated list, e.g. `mon,wed,fri` or `weekdays`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').filter(|p| !p.trim().is_empty()).collect();
        if parts.is_empty() {
            return Err(TimeParseError::UnknownPreset(s.to_string()));
        }
        Self::parse_list(&parts)
    }
}

impl Serialize for DaysOfWeek {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names = self.names();
        let mut seq = serializer.serialize_seq(Some(names.len()))?;
        for name in names {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for DaysOfWeek {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DaysVisitor;

        impl<'de> Visitor<'de> for DaysVisitor {
            type Value = DaysOfWeek;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a list of weekday names")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut days = DaysOfWeek::NONE;
                while let Some(name) = seq.next_element::<String>()? {
                    days.insert(parse_weekday(&name).map_err(de::Error::custom)?);
                }
                Ok(days)
            }
        }

        deserializer.deserialize_seq(DaysVisitor)
    }
}

/// A recurring weekly window of wall-clock time.
///
/// `end <= start` means the window crosses midnight; an instance starts on a
/// listed day and finishes on the following calendar day. `start == end`
/// spans a full 24 hours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub days: DaysOfWeek,
    pub start: WallClock,
    pub end: WallClock,
}

impl TimeWindow {
    pub fn new(days: DaysOfWeek, start: WallClock, end: WallClock) -> Self {
        Self { days, start, end }
    }

    pub fn wraps_midnight(&self) -> bool {
        self.end <= self.start
    }

    /// Check if the given local datetime falls within this window
    pub fn contains(&self, dt: &DateTime<Local>) -> bool {
        let today = dt.weekday();
        let time = dt.time();
        let start = self.start.to_naive_time();
        let end = self.end.to_naive_time();

        if !self.wraps_midnight() {
            self.days.contains(today) && time >= start && time < end
        } else {
            (self.days.contains(today) && time >= start)
                || (self.days.contains(today.pred()) && time < end)
        }
    }

    /// End instant of the instance containing `dt`, or `None` if `dt` is
    /// outside the window
    pub fn active_instance_end(&self, dt: &DateTime<Local>) -> Option<DateTime<Local>> {
        if !self.contains(dt) {
            return None;
        }

        let today = dt.date_naive();
        let end_date = if self.wraps_midnight()
            && self.days.contains(dt.weekday())
            && dt.time() >= self.start.to_naive_time()
        {
            today.succ_opt()?
        } else {
            today
        };

        resolve_local_forward(end_date, self.end.to_naive_time())
    }

    /// The instance starting on `date`, if `date` is a listed day and its
    /// start time exists locally
    pub fn instance_on(&self, date: NaiveDate) -> Option<(DateTime<Local>, DateTime<Local>)> {
        if !self.days.contains(date.weekday()) {
            return None;
        }

        let start = resolve_local(date, self.start.to_naive_time())?;
        let end_date = if self.wraps_midnight() {
            date.succ_opt()?
        } else {
            date
        };
        let end = resolve_local_forward(end_date, self.end.to_naive_time())?;
        Some((start, end))
    }
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Format a countdown as `mm:ss`; minutes are not wrapped into hours
pub fn format_countdown(d: Duration) -> String {
    let total_secs = d.as_secs();
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Round a duration up to whole seconds
pub fn ceil_seconds(d: Duration) -> Duration {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_wall_clock_ordering() {
        let morning = WallClock::new(8, 0).unwrap();
        let noon = WallClock::new(12, 0).unwrap();
        let evening = WallClock::new(18, 30).unwrap();

        assert!(morning < noon);
        assert!(noon < evening);
        assert!(morning < evening);
    }

    #[test]
    fn test_wall_clock_parse() {
        assert_eq!(WallClock::parse("09:00").unwrap(), WallClock::new(9, 0).unwrap());
        assert_eq!(WallClock::parse("7:05").unwrap(), WallClock::new(7, 5).unwrap());
        assert_eq!(WallClock::parse("23:59").unwrap().to_string(), "23:59");

        assert!(matches!(WallClock::parse("24:00"), Err(TimeParseError::Hour { .. })));
        assert!(matches!(WallClock::parse("12:60"), Err(TimeParseError::Minute { .. })));
        for bad in ["", "1200", "12:0", "ab:cd", "12:00:00", "-1:00"] {
            assert!(
                matches!(WallClock::parse(bad), Err(TimeParseError::Format { .. })),
                "{bad:?} should be a format error"
            );
        }
    }

    #[test]
    fn test_wall_clock_serde_is_string() {
        let w = WallClock::new(22, 0).unwrap();
        assert_eq!(serde_json::to_string(&w).unwrap(), "\"22:00\"");
        let back: WallClock = serde_json::from_str("\"06:30\"").unwrap();
        assert_eq!(back, WallClock::new(6, 30).unwrap());
        assert!(serde_json::from_str::<WallClock>("\"25:00\"").is_err());
    }

    #[test]
    fn test_days_of_week() {
        let weekdays = DaysOfWeek::WEEKDAYS;
        assert!(weekdays.contains(Weekday::Mon));
        assert!(weekdays.contains(Weekday::Fri));
        assert!(!weekdays.contains(Weekday::Sat));
        assert!(!weekdays.contains(Weekday::Sun));

        let weekends = DaysOfWeek::WEEKENDS;
        assert!(!weekends.contains(Weekday::Mon));
        assert!(weekends.contains(Weekday::Sat));
        assert!(weekends.contains(Weekday::Sun));
    }

    #[test]
    fn test_days_of_week_parse_and_names() {
        let days: DaysOfWeek = "fri,Mon,weekends".parse().unwrap();
        assert_eq!(days.names(), vec!["Monday", "Friday", "Saturday", "Sunday"]);

        assert!(matches!(
            "mon,funday".parse::<DaysOfWeek>(),
            Err(TimeParseError::UnknownDay(_))
        ));
        assert!("".parse::<DaysOfWeek>().is_err());
    }

    #[test]
    fn test_days_of_week_serde_uses_full_names() {
        let days: DaysOfWeek = [Weekday::Fri, Weekday::Mon].into_iter().collect();
        let json = serde_json::to_string(&days).unwrap();
        assert_eq!(json, r#"["Monday","Friday"]"#);

        let back: DaysOfWeek = serde_json::from_str(&json).unwrap();
        assert_eq!(back, days);
        assert!(serde_json::from_str::<DaysOfWeek>(r#"["Someday"]"#).is_err());
    }

    #[test]
    fn test_time_window_contains() {
        let window = TimeWindow::new(
            DaysOfWeek::WEEKDAYS,
            WallClock::new(14, 0).unwrap(),
            WallClock::new(18, 0).unwrap(),
        );

        // 2025-12-29 is a Monday
        assert!(window.contains(&local(2025, 12, 29, 15, 0)));
        assert!(!window.contains(&local(2025, 12, 29, 10, 0)));
        assert!(!window.contains(&local(2025, 12, 29, 18, 0)));
        // Saturday
        assert!(!window.contains(&local(2025, 12, 27, 15, 0)));
    }

    #[test]
    fn test_time_window_wraps_midnight_from_listed_day() {
        let friday_night = TimeWindow::new(
            DaysOfWeek::new(DaysOfWeek::FRIDAY),
            WallClock::new(22, 0).unwrap(),
            WallClock::new(6, 0).unwrap(),
        );

        // 2025-12-26 is a Friday
        assert!(friday_night.contains(&local(2025, 12, 26, 23, 0)));
        assert!(friday_night.contains(&local(2025, 12, 27, 5, 0)));
        assert!(!friday_night.contains(&local(2025, 12, 27, 6, 0)));
        // Friday morning belongs to Thursday's instance, which is not listed
        assert!(!friday_night.contains(&local(2025, 12, 26, 5, 0)));
        // Saturday night is not listed
        assert!(!friday_night.contains(&local(2025, 12, 27, 23, 0)));
    }

    #[test]
    fn test_time_window_equal_bounds_is_full_day() {
        let window = TimeWindow::new(
            DaysOfWeek::new(DaysOfWeek::MONDAY),
            WallClock::new(8, 0).unwrap(),
            WallClock::new(8, 0).unwrap(),
        );

        assert!(window.contains(&local(2025, 12, 29, 8, 0)));
        assert!(window.contains(&local(2025, 12, 30, 7, 59)));
        assert!(!window.contains(&local(2025, 12, 30, 8, 0)));
        assert!(!window.contains(&local(2025, 12, 29, 7, 59)));
    }

    #[test]
    fn test_active_instance_end() {
        let window = TimeWindow::new(
            DaysOfWeek::new(DaysOfWeek::FRIDAY),
            WallClock::new(22, 0).unwrap(),
            WallClock::new(6, 0).unwrap(),
        );

        let evening = local(2025, 12, 26, 23, 0);
        assert_eq!(window.active_instance_end(&evening), Some(local(2025, 12, 27, 6, 0)));

        let morning = local(2025, 12, 27, 5, 0);
        assert_eq!(window.active_instance_end(&morning), Some(local(2025, 12, 27, 6, 0)));

        assert_eq!(window.active_instance_end(&local(2025, 12, 27, 7, 0)), None);
    }

    #[test]
    fn test_instance_on() {
        let window = TimeWindow::new(
            DaysOfWeek::new(DaysOfWeek::FRIDAY),
            WallClock::new(22, 0).unwrap(),
            WallClock::new(6, 0).unwrap(),
        );

        let friday = NaiveDate::from_ymd_opt(2025, 12, 26).unwrap();
        let (start, end) = window.instance_on(friday).unwrap();
        assert_eq!(start, local(2025, 12, 26, 22, 0));
        assert_eq!(end, local(2025, 12, 27, 6, 0));

        let saturday = NaiveDate::from_ymd_opt(2025, 12, 27).unwrap();
        assert!(window.instance_on(saturday).is_none());
    }


    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(Duration::from_secs(900)), "15:00");
        assert_eq!(format_countdown(Duration::from_secs(61)), "01:01");
        assert_eq!(format_countdown(Duration::from_secs(5400)), "90:00");
    }

    #[test]
    fn test_ceil_seconds() {
        assert_eq!(ceil_seconds(Duration::from_millis(1500)), Duration::from_secs(2));
        assert_eq!(ceil_seconds(Duration::from_secs(3)), Duration::from_secs(3));
        assert_eq!(ceil_seconds(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_manual_clock() {
        let start = local(2025, 12, 29, 9, 0);
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(90));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_now_returns_time() {
        let t = now();
        assert!(t.year() >= 2020);
        assert!(t.year() <= 2100);
        assert!(SystemClock.now() >= t);
    }

    #[test]
    fn test_parse_mock_time_format() {
        for valid in ["2025-12-25 14:30:00", "2025-01-01 00:00:00"] {
            assert!(NaiveDateTime::parse_from_str(valid, MOCK_TIME_FORMAT).is_ok());
        }
        for invalid in ["2025-12-25", "2025-12-25T14:30:00", "not a date"] {
            assert!(NaiveDateTime::parse_from_str(invalid, MOCK_TIME_FORMAT).is_err());
        }
    }
}
