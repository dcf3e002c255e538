use crate::config::SlotBoundary;
use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Bookable start times over a window: `start + k·step` while `< end`.
///
/// Cheap to clone, so the sequence can be restarted from any copy.
#[derive(Debug, Clone)]
pub struct Slots {
    next: Minutes,
    end: Minutes,
    step: Minutes,
    boundary: SlotBoundary,
}

impl Iterator for Slots {
    type Item = TimeOfDay;

    fn next(&mut self) -> Option<TimeOfDay> {
        if self.next >= self.end {
            return None;
        }
        if self.boundary == SlotBoundary::Strict && self.next + self.step > self.end {
            self.next = self.end;
            return None;
        }
        let t = self.next;
        self.next += self.step;
        TimeOfDay::from_minutes(t).ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match self.boundary {
            _ if self.next >= self.end => 0,
            SlotBoundary::Permissive => (self.end - self.next + self.step - 1) / self.step,
            SlotBoundary::Strict => (self.end - self.next) / self.step,
        };
        (remaining as usize, Some(remaining as usize))
    }
}

impl ExactSizeIterator for Slots {}

/// Permissive slot generation: a final slot that overruns the window end is
/// still emitted as long as it starts before it.
pub fn generate_slots(
    start: TimeOfDay,
    end: TimeOfDay,
    slot_minutes: Minutes,
) -> Result<Slots, EngineError> {
    generate_slots_with(start, end, slot_minutes, SlotBoundary::Permissive)
}

pub fn generate_slots_with(
    start: TimeOfDay,
    end: TimeOfDay,
    slot_minutes: Minutes,
    boundary: SlotBoundary,
) -> Result<Slots, EngineError> {
    validate_slot_minutes(slot_minutes)?;
    Ok(Slots {
        next: start.minutes(),
        end: end.minutes(),
        step: slot_minutes,
        boundary,
    })
}

pub(crate) fn validate_slot_minutes(slot_minutes: Minutes) -> Result<(), EngineError> {
    if slot_minutes <= 0 {
        return Err(EngineError::InvalidDuration(slot_minutes));
    }
    if !(MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&slot_minutes) {
        return Err(EngineError::LimitExceeded("slot duration out of range"));
    }
    Ok(())
}
