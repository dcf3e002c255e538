use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{Assignment, Minutes, TimeOfDay};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidTimeFormat(String),
    InvalidDate(String),
    InvalidDay(u8),
    InvalidDuration(Minutes),
    InvalidWindow {
        start: TimeOfDay,
        end: TimeOfDay,
    },
    InvalidValidity {
        from: NaiveDate,
        until: Option<NaiveDate>,
    },
    RoomUnderMaintenance(Ulid),
    RoomNotActive(Ulid),
    ProviderLinkNotActive(Ulid),
    /// Carries the record already holding the slot.
    ScheduleConflict(Box<Assignment>),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    InvalidTenant(String),
    LimitExceeded(&'static str),
    /// Failure reported by the backing store, passed through untouched.
    Store(String),
}

impl EngineError {
    /// Stable label for metrics and for callers that branch on the kind.
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::InvalidTimeFormat(_) => "invalid_time_format",
            EngineError::InvalidDate(_) => "invalid_date",
            EngineError::InvalidDay(_) => "invalid_day",
            EngineError::InvalidDuration(_) => "invalid_duration",
            EngineError::InvalidWindow { .. } => "invalid_window",
            EngineError::InvalidValidity { .. } => "invalid_validity",
            EngineError::RoomUnderMaintenance(_) => "room_under_maintenance",
            EngineError::RoomNotActive(_) => "room_not_active",
            EngineError::ProviderLinkNotActive(_) => "provider_link_not_active",
            EngineError::ScheduleConflict(_) => "schedule_conflict",
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::InvalidTenant(_) => "invalid_tenant",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Store(_) => "store",
        }
    }

    /// The assignment that blocked a write, if this is a conflict.
    pub fn conflicting(&self) -> Option<&Assignment> {
        match self {
            EngineError::ScheduleConflict(existing) => Some(existing),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidTimeFormat(s) => write!(f, "invalid time of day: {s:?} (expected HH:MM)"),
            EngineError::InvalidDate(s) => write!(f, "invalid date: {s:?} (expected YYYY-MM-DD)"),
            EngineError::InvalidDay(n) => write!(f, "invalid day of week: {n}"),
            EngineError::InvalidDuration(m) => write!(f, "invalid slot duration: {m} minutes"),
            EngineError::InvalidWindow { start, end } => {
                write!(f, "invalid window: start {start} is not before end {end}")
            }
            EngineError::InvalidValidity { from, until } => match until {
                Some(until) => write!(f, "invalid validity: {from} is after {until}"),
                None => write!(f, "invalid validity: temporary assignment from {from} has no end date"),
            },
            EngineError::RoomUnderMaintenance(id) => write!(f, "room {id} is under maintenance"),
            EngineError::RoomNotActive(id) => write!(f, "room {id} is not active"),
            EngineError::ProviderLinkNotActive(id) => {
                write!(f, "provider branch link {id} is not active")
            }
            EngineError::ScheduleConflict(existing) => write!(
                f,
                "room {} is already assigned to link {} on {:?} from {} to {} (assignment {})",
                existing.room_id,
                existing.link_id,
                existing.day,
                existing.start,
                existing.end,
                existing.id
            ),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidTenant(name) => write!(f, "invalid tenant name: {name:?}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
