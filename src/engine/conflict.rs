use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::slots::validate_slot_minutes;
use super::EngineError;

pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Admit or reject `candidate` against the assignments already on record.
///
/// Checks run in a fixed order: window, room maintenance, room state, then
/// overlap with active assignments of the same room and day. `exclude_id`
/// lets an edit skip its own stored version.
pub fn validate(
    candidate: &Assignment,
    room: &Room,
    existing: &[Assignment],
    exclude_id: Option<Ulid>,
) -> Result<(), EngineError> {
    if candidate.start >= candidate.end {
        return Err(EngineError::InvalidWindow {
            start: candidate.start,
            end: candidate.end,
        });
    }
    match room.state {
        RoomState::Active => {}
        RoomState::Maintenance => return Err(EngineError::RoomUnderMaintenance(room.id)),
        RoomState::Inactive => return Err(EngineError::RoomNotActive(room.id)),
    }

    let clash = existing
        .iter()
        .filter(|a| a.room_id == candidate.room_id && a.day == candidate.day)
        .filter(|a| a.is_active())
        .filter(|a| Some(a.id) != exclude_id)
        .find(|a| overlaps(candidate.start, candidate.end, a.start, a.end));

    match clash {
        Some(existing) => Err(EngineError::ScheduleConflict(Box::new(existing.clone()))),
        None => Ok(()),
    }
}

/// Field-level checks that do not depend on any other record.
pub(crate) fn validate_fields(a: &Assignment) -> Result<(), EngineError> {
    if a.start >= a.end {
        return Err(EngineError::InvalidWindow {
            start: a.start,
            end: a.end,
        });
    }
    if let Some(minutes) = a.slot_minutes {
        validate_slot_minutes(minutes)?;
    }
    match (a.kind, a.valid_until) {
        (_, Some(until)) if until < a.valid_from => Err(EngineError::InvalidValidity {
            from: a.valid_from,
            until: Some(until),
        }),
        (AssignmentKind::Temporary, None) => Err(EngineError::InvalidValidity {
            from: a.valid_from,
            until: None,
        }),
        _ => Ok(()),
    }
}

pub(crate) fn validate_room_fields(room: &Room) -> Result<(), EngineError> {
    if room.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("room name too long"));
    }
    if room.equipment.as_ref().is_some_and(|e| e.len() > MAX_EQUIPMENT_LEN) {
        return Err(EngineError::LimitExceeded("equipment description too long"));
    }
    Ok(())
}

pub(crate) fn validate_link_fields(link: &ProviderBranchLink) -> Result<(), EngineError> {
    if link.specialty.as_ref().is_some_and(|s| s.len() > MAX_SPECIALTY_LEN) {
        return Err(EngineError::LimitExceeded("specialty too long"));
    }
    Ok(())
}
