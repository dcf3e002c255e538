use chrono::NaiveDate;
use ulid::Ulid;

use crate::config::SlotBoundary;
use crate::model::*;

use super::slots::generate_slots_with;
use super::EngineError;

// ── Availability projection ───────────────────────────────────────

/// Narrows the projection. `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvailabilityFilter {
    pub link_id: Option<Ulid>,
    pub room_id: Option<Ulid>,
    pub day: Option<DayOfWeek>,
}

impl AvailabilityFilter {
    pub fn link(link_id: Ulid) -> Self {
        Self {
            link_id: Some(link_id),
            ..Self::default()
        }
    }

    pub fn room(room_id: Ulid) -> Self {
        Self {
            room_id: Some(room_id),
            ..Self::default()
        }
    }

    pub fn on_day(mut self, day: DayOfWeek) -> Self {
        self.day = Some(day);
        self
    }

    pub fn in_room(mut self, room_id: Option<Ulid>) -> Self {
        self.room_id = room_id;
        self
    }

    fn matches(&self, a: &Assignment) -> bool {
        self.link_id.is_none_or(|id| a.link_id == id)
            && self.room_id.is_none_or(|id| a.room_id == id)
            && self.day.is_none_or(|d| a.day == d)
    }
}

/// Active assignments matching `filter` whose validity window covers `on`.
pub fn availability<'a>(
    assignments: &'a [Assignment],
    filter: AvailabilityFilter,
    on: NaiveDate,
) -> impl Iterator<Item = &'a Assignment> + 'a {
    assignments
        .iter()
        .filter(move |a| a.is_active() && a.covers(on) && filter.matches(a))
}

// ── Booking resolver ──────────────────────────────────────────────

/// Start times offered by `entries`, merged, sorted and deduplicated.
/// Each entry uses its own slot length or `default_minutes`.
pub fn offered_slots<'a>(
    entries: impl IntoIterator<Item = &'a Assignment>,
    default_minutes: Minutes,
    boundary: SlotBoundary,
) -> Result<Vec<TimeOfDay>, EngineError> {
    let mut slots = Vec::new();
    for entry in entries {
        let minutes = entry.slot_minutes.unwrap_or(default_minutes);
        slots.extend(generate_slots_with(entry.start, entry.end, minutes, boundary)?);
    }
    slots.sort_unstable();
    slots.dedup();
    Ok(slots)
}

/// Configured start times for a provider link on a calendar date,
/// optionally narrowed to one room. Existing bookings are not subtracted.
pub fn resolve_offered_slots(
    assignments: &[Assignment],
    link_id: Ulid,
    room_id: Option<Ulid>,
    date: NaiveDate,
    default_minutes: Minutes,
    boundary: SlotBoundary,
) -> Result<Vec<TimeOfDay>, EngineError> {
    let filter = AvailabilityFilter::link(link_id)
        .in_room(room_id)
        .on_day(DayOfWeek::of_date(date));
    offered_slots(availability(assignments, filter, date), default_minutes, boundary)
}

// ── Free windows ──────────────────────────────────────────────────

/// Parts of `open` on `day` not claimed by any active assignment of the room.
/// Validity windows are ignored, matching the overlap rule.
pub fn free_windows(
    assignments: &[Assignment],
    room_id: Ulid,
    day: DayOfWeek,
    open: Window,
) -> Vec<Window> {
    let mut claims: Vec<Window> = assignments
        .iter()
        .filter(|a| a.room_id == room_id && a.day == day && a.is_active())
        .map(Assignment::window)
        .filter(|claim| claim.overlaps(&open))
        .collect();
    claims.sort_by_key(|claim| claim.start);

    // Walk the claims in start order; `cursor` is the first minute not yet
    // known to be taken.
    let mut free = Vec::new();
    let mut cursor = open.start;
    for claim in claims {
        if claim.start > cursor {
            free.push(Window::new(cursor, claim.start));
        }
        cursor = cursor.max(claim.end);
    }
    if cursor < open.end {
        free.push(Window::new(cursor, open.end));
    }
    free
}
