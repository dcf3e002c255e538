use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

use crate::engine::EngineError;

/// Minutes since midnight.
pub type Minutes = i32;

pub const MINUTES_PER_DAY: Minutes = 24 * 60;

// ── Interval math ────────────────────────────────────────────────

/// Strict half-open overlap of `[a_start, a_end)` and `[b_start, b_end)`.
/// Touching boundaries do not overlap.
pub fn overlaps<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && b_start < a_end
}

/// Parse `HH:MM` into minutes since midnight.
pub fn to_minutes(time: &str) -> Result<Minutes, EngineError> {
    TimeOfDay::parse(time).map(TimeOfDay::minutes)
}

/// A time of day with minute granularity, `00:00` through `24:00`.
///
/// `24:00` is accepted so a window can run to the end of the day; it is
/// never produced as a slot start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);
    pub const END_OF_DAY: TimeOfDay = TimeOfDay(MINUTES_PER_DAY as u16);

    pub fn from_minutes(minutes: Minutes) -> Result<Self, EngineError> {
        if !(0..=MINUTES_PER_DAY).contains(&minutes) {
            return Err(EngineError::InvalidTimeFormat(format!("{minutes} minutes")));
        }
        Ok(Self(minutes as u16))
    }

    pub fn hm(hour: u8, minute: u8) -> Result<Self, EngineError> {
        if minute > 59 || hour > 24 || (hour == 24 && minute != 0) {
            return Err(EngineError::InvalidTimeFormat(format!("{hour}:{minute}")));
        }
        Ok(Self(hour as u16 * 60 + minute as u16))
    }

    /// Accepts `HH:MM`, and `HH:MM:SS` as stored by SQL `time` columns
    /// (seconds are dropped).
    pub fn parse(input: &str) -> Result<Self, EngineError> {
        let bad = || EngineError::InvalidTimeFormat(input.to_string());
        let mut parts = input.split(':');
        let hour = two_digits(parts.next()).ok_or_else(bad)?;
        let minute = two_digits(parts.next()).ok_or_else(bad)?;
        if let Some(seconds) = parts.next() {
            match two_digits(Some(seconds)) {
                Some(s) if s < 60 => {}
                _ => return Err(bad()),
            }
        }
        if parts.next().is_some() {
            return Err(bad());
        }
        Self::hm(hour, minute).map_err(|_| bad())
    }

    pub fn minutes(self) -> Minutes {
        self.0 as Minutes
    }

    pub fn hour(self) -> u8 {
        (self.0 / 60) as u8
    }

    pub fn minute(self) -> u8 {
        (self.0 % 60) as u8
    }
}

fn two_digits(part: Option<&str>) -> Option<u8> {
    let part = part?;
    if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TimeOfDay::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Half-open time-of-day window `[start, end)`. Never wraps midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl Window {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn duration_minutes(&self) -> Minutes {
        (self.end.minutes() - self.start.minutes()).max(0)
    }

    pub fn overlaps(&self, other: &Window) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}–{}", self.start, self.end)
    }
}

// ── Day of week ──────────────────────────────────────────────────

/// Recurrence day. Serialized as 1 (Monday) through 7 (Sunday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DayOfWeek {
    Monday = 1,
    Tuesday = 2,
    Wednesday = 3,
    Thursday = 4,
    Friday = 5,
    Saturday = 6,
    Sunday = 7,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    /// Monday-first numbering used by assignments: 1..=7.
    pub fn from_iso(n: u8) -> Result<Self, EngineError> {
        match n {
            1..=7 => Ok(Self::ALL[(n - 1) as usize]),
            _ => Err(EngineError::InvalidDay(n)),
        }
    }

    pub fn iso(self) -> u8 {
        self as u8
    }

    /// Calendar numbering with Sunday = 0 .. Saturday = 6.
    pub fn from_sunday_based(n: u8) -> Result<Self, EngineError> {
        match n {
            0 => Ok(DayOfWeek::Sunday),
            1..=6 => Ok(Self::ALL[(n - 1) as usize]),
            _ => Err(EngineError::InvalidDay(n)),
        }
    }

    pub fn sunday_based(self) -> u8 {
        self.iso() % 7
    }

    /// The single place a calendar date is mapped onto a recurrence day.
    pub fn of_date(date: NaiveDate) -> Self {
        date.weekday().into()
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

impl TryFrom<u8> for DayOfWeek {
    type Error = EngineError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::from_iso(n)
    }
}

impl From<DayOfWeek> for u8 {
    fn from(day: DayOfWeek) -> u8 {
        day.iso()
    }
}

/// Parse a `YYYY-MM-DD` boundary date.
pub fn parse_date(input: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|_| EngineError::InvalidDate(input.to_string()))
}

// ── Lifecycle states ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomState {
    Active,
    Inactive,
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentState {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentKind {
    Permanent,
    Temporary,
}

/// Which upstream entities are currently holding an assignment inactive.
/// Only the cascade sets these; an empty suspension on an inactive
/// assignment means it was switched off by hand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suspension {
    #[serde(default)]
    pub room: bool,
    #[serde(default)]
    pub provider_link: bool,
}

impl Suspension {
    pub fn is_empty(&self) -> bool {
        !self.room && !self.provider_link
    }
}

// ── Records ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub branch_id: Ulid,
    pub name: String,
    pub state: RoomState,
    pub capacity: u32,
    #[serde(default)]
    pub equipment: Option<String>,
}

impl Room {
    pub fn new(id: Ulid, branch_id: Ulid, name: impl Into<String>) -> Self {
        Self {
            id,
            branch_id,
            name: name.into(),
            state: RoomState::Active,
            capacity: 1,
            equipment: None,
        }
    }
}

/// A provider's membership in one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderBranchLink {
    pub id: Ulid,
    pub provider_id: Ulid,
    pub branch_id: Ulid,
    #[serde(default)]
    pub specialty: Option<String>,
    pub state: LinkState,
}

impl ProviderBranchLink {
    pub fn new(id: Ulid, provider_id: Ulid, branch_id: Ulid) -> Self {
        Self {
            id,
            provider_id,
            branch_id,
            specialty: None,
            state: LinkState::Active,
        }
    }
}

/// A recurring weekly claim of a room by a provider link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Ulid,
    pub room_id: Ulid,
    pub link_id: Ulid,
    pub day: DayOfWeek,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    /// Per-assignment slot length; falls back to the link's price schedule.
    #[serde(default)]
    pub slot_minutes: Option<Minutes>,
    pub kind: AssignmentKind,
    pub valid_from: NaiveDate,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
    pub state: AssignmentState,
    #[serde(default)]
    pub suspension: Suspension,
}

impl Assignment {
    /// A permanent, active assignment valid from `valid_from` onwards.
    pub fn new(
        id: Ulid,
        room_id: Ulid,
        link_id: Ulid,
        day: DayOfWeek,
        window: Window,
        valid_from: NaiveDate,
    ) -> Self {
        Self {
            id,
            room_id,
            link_id,
            day,
            start: window.start,
            end: window.end,
            slot_minutes: None,
            kind: AssignmentKind::Permanent,
            valid_from,
            valid_until: None,
            state: AssignmentState::Active,
            suspension: Suspension::default(),
        }
    }

    pub fn window(&self) -> Window {
        Window::new(self.start, self.end)
    }

    pub fn is_active(&self) -> bool {
        self.state == AssignmentState::Active
    }

    /// True if the validity window includes `date` (both ends inclusive).
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.valid_from <= date && self.valid_until.is_none_or(|until| date <= until)
    }

    pub(crate) fn activate(&mut self) {
        self.state = AssignmentState::Active;
        self.suspension = Suspension::default();
    }
}

/// Consultation price and default slot length for one provider link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSchedule {
    pub id: Ulid,
    pub link_id: Ulid,
    pub price_cents: u64,
    pub duration_minutes: Minutes,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        TimeOfDay::parse(s).unwrap()
    }

    #[test]
    fn parse_time_basics() {
        assert_eq!(to_minutes("00:00").unwrap(), 0);
        assert_eq!(to_minutes("08:30").unwrap(), 510);
        assert_eq!(to_minutes("23:59").unwrap(), 1439);
        assert_eq!(to_minutes("24:00").unwrap(), 1440);
        assert_eq!(to_minutes("08:30:00").unwrap(), 510); // SQL time column
    }

    #[test]
    fn parse_time_rejects_malformed() {
        for bad in ["", "8:30", "08:3", "0830", "08-30", "24:01", "25:00", "08:60", "ab:cd", "08:30:61", "08:30:00:00", " 08:30"] {
            assert!(
                matches!(to_minutes(bad), Err(EngineError::InvalidTimeFormat(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn time_display_is_zero_padded() {
        assert_eq!(t("07:05").to_string(), "07:05");
        assert_eq!(TimeOfDay::from_minutes(61).unwrap().to_string(), "01:01");
        assert!(TimeOfDay::from_minutes(-1).is_err());
        assert!(TimeOfDay::from_minutes(MINUTES_PER_DAY + 1).is_err());
    }

    #[test]
    fn overlap_half_open() {
        assert!(overlaps(t("08:00"), t("09:00"), t("08:30"), t("09:30")));
        assert!(!overlaps(t("08:00"), t("09:00"), t("09:00"), t("10:00"))); // touching
        assert!(overlaps(t("08:00"), t("12:00"), t("09:00"), t("10:00"))); // containment
        assert!(!overlaps(0, 10, 20, 30));
    }

    #[test]
    fn overlap_symmetry() {
        let points = [0, 30, 60, 90, 120];
        for &a0 in &points {
            for &a1 in &points {
                for &b0 in &points {
                    for &b1 in &points {
                        if a0 < a1 && b0 < b1 {
                            assert_eq!(overlaps(a0, a1, b0, b1), overlaps(b0, b1, a0, a1));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn window_helpers() {
        let w = Window::new(t("08:00"), t("08:50"));
        assert_eq!(w.duration_minutes(), 50);
        assert!(!w.is_empty());
        assert!(Window::new(t("09:00"), t("09:00")).is_empty());
        assert!(Window::new(t("10:00"), t("09:00")).is_empty());
        assert_eq!(w.to_string(), "08:00–08:50");
    }

    #[test]
    fn day_conventions() {
        assert_eq!(DayOfWeek::from_iso(1).unwrap(), DayOfWeek::Monday);
        assert_eq!(DayOfWeek::from_iso(7).unwrap(), DayOfWeek::Sunday);
        assert!(DayOfWeek::from_iso(0).is_err());
        assert!(DayOfWeek::from_iso(8).is_err());

        assert_eq!(DayOfWeek::from_sunday_based(0).unwrap(), DayOfWeek::Sunday);
        assert_eq!(DayOfWeek::from_sunday_based(1).unwrap(), DayOfWeek::Monday);
        assert_eq!(DayOfWeek::from_sunday_based(6).unwrap(), DayOfWeek::Saturday);
        assert!(DayOfWeek::from_sunday_based(7).is_err());

        for day in DayOfWeek::ALL {
            assert_eq!(DayOfWeek::from_sunday_based(day.sunday_based()).unwrap(), day);
            assert_eq!(DayOfWeek::from_iso(day.iso()).unwrap(), day);
        }
    }

    #[test]
    fn day_of_calendar_date() {
        // 2024-01-01 was a Monday, 2024-01-07 a Sunday.
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(DayOfWeek::of_date(monday), DayOfWeek::Monday);
        let sunday = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        assert_eq!(DayOfWeek::of_date(sunday), DayOfWeek::Sunday);
        assert_eq!(DayOfWeek::of_date(sunday).sunday_based(), 0);
        assert_eq!(DayOfWeek::of_date(sunday).iso(), 7);
    }

    #[test]
    fn parse_boundary_dates() {
        assert_eq!(
            parse_date("2024-02-29").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(matches!(parse_date("2023-02-29"), Err(EngineError::InvalidDate(_))));
        assert!(matches!(parse_date("29/02/2024"), Err(EngineError::InvalidDate(_))));
    }

    #[test]
    fn validity_window_inclusive() {
        let from = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut a = Assignment::new(
            Ulid::new(),
            Ulid::new(),
            Ulid::new(),
            DayOfWeek::Friday,
            Window::new(t("08:00"), t("12:00")),
            from,
        );
        assert!(!a.covers(from.pred_opt().unwrap()));
        assert!(a.covers(from));
        assert!(a.covers(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()));

        let until = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        a.valid_until = Some(until);
        assert!(a.covers(until));
        assert!(!a.covers(until.succ_opt().unwrap()));
    }

    #[test]
    fn assignment_boundary_format() {
        let a = Assignment::new(
            Ulid::new(),
            Ulid::new(),
            Ulid::new(),
            DayOfWeek::Monday,
            Window::new(t("08:00"), t("12:00")),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["day"], 1);
        assert_eq!(json["start"], "08:00");
        assert_eq!(json["end"], "12:00");
        assert_eq!(json["valid_from"], "2024-01-01");
        assert_eq!(json["state"], "active");
        assert_eq!(json["kind"], "permanent");

        let back: Assignment = serde_json::from_value(json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn assignment_rejects_bad_boundary_values() {
        let base = serde_json::json!({
            "id": Ulid::new().to_string(),
            "room_id": Ulid::new().to_string(),
            "link_id": Ulid::new().to_string(),
            "day": 8,
            "start": "08:00",
            "end": "09:00",
            "kind": "temporary",
            "valid_from": "2024-01-01",
            "state": "inactive",
        });
        assert!(serde_json::from_value::<Assignment>(base.clone()).is_err());

        let mut bad_time = base;
        bad_time["day"] = 2.into();
        bad_time["start"] = "8am".into();
        assert!(serde_json::from_value::<Assignment>(bad_time.clone()).is_err());

        bad_time["start"] = "08:00".into();
        let ok: Assignment = serde_json::from_value(bad_time).unwrap();
        assert_eq!(ok.day, DayOfWeek::Tuesday);
        assert_eq!(ok.kind, AssignmentKind::Temporary);
        assert!(ok.suspension.is_empty());
    }

    #[test]
    fn room_state_serialization() {
        assert_eq!(serde_json::to_string(&RoomState::Maintenance).unwrap(), "\"maintenance\"");
        let s: RoomState = serde_json::from_str("\"inactive\"").unwrap();
        assert_eq!(s, RoomState::Inactive);
    }
}
