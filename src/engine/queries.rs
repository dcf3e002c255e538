use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::debug;
use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::availability::{availability, free_windows, resolve_offered_slots, AvailabilityFilter};
use super::conflict::today;
use super::{Engine, EngineError};

impl Engine {
    pub async fn get_room(&self, id: Ulid) -> Result<Option<Room>, EngineError> {
        self.stores.rooms.get(&id).await
    }

    pub async fn list_rooms(&self) -> Result<Vec<Room>, EngineError> {
        self.stores.rooms.list().await
    }

    pub async fn get_provider_link(&self, id: Ulid) -> Result<Option<ProviderBranchLink>, EngineError> {
        self.stores.links.get(&id).await
    }

    pub async fn list_provider_links(&self) -> Result<Vec<ProviderBranchLink>, EngineError> {
        self.stores.links.list().await
    }

    pub async fn get_assignment(&self, id: Ulid) -> Result<Option<Assignment>, EngineError> {
        self.stores.assignments.get(&id).await
    }

    /// Every assignment on the room, any state, ordered by day then start.
    pub async fn assignments_for_room(&self, room_id: Ulid) -> Result<Vec<Assignment>, EngineError> {
        let mut out = self.assignments_where(|a| a.room_id == room_id).await?;
        out.sort_by_key(|a| (a.day, a.start));
        Ok(out)
    }

    pub async fn assignments_for_link(&self, link_id: Ulid) -> Result<Vec<Assignment>, EngineError> {
        let mut out = self.assignments_where(|a| a.link_id == link_id).await?;
        out.sort_by_key(|a| (a.day, a.start));
        Ok(out)
    }

    /// The link's active price schedule, if any.
    pub async fn active_price(&self, link_id: Ulid) -> Result<Option<PriceSchedule>, EngineError> {
        Ok(self
            .stores
            .prices
            .list()
            .await?
            .into_iter()
            .find(|p| p.link_id == link_id && p.active))
    }

    /// Active assignments matching `filter` and valid on `on` (today when
    /// `None`).
    pub async fn availability(
        &self,
        filter: AvailabilityFilter,
        on: Option<NaiveDate>,
    ) -> Result<Vec<Assignment>, EngineError> {
        let on = on.unwrap_or_else(today);
        let all = self.stores.assignments.list().await?;
        let mut out: Vec<Assignment> = availability(&all, filter, on).cloned().collect();
        out.sort_by_key(|a| (a.day, a.start));
        Ok(out)
    }

    /// Start times a link offers on `date`, optionally in one room.
    ///
    /// Only assignments whose room and link are both active contribute.
    /// Slot length comes from the assignment, then the link's active price
    /// schedule, then the configured default. Booked appointments are the
    /// caller's to subtract.
    pub async fn offered_slots(
        &self,
        link_id: Ulid,
        room_id: Option<Ulid>,
        date: NaiveDate,
    ) -> Result<Vec<TimeOfDay>, EngineError> {
        metrics::counter!(observability::SLOT_QUERIES_TOTAL).increment(1);
        let link = self.link(link_id).await?;
        if link.state != LinkState::Active {
            debug!(link = %link_id, %date, "link inactive, no slots");
            return Ok(Vec::new());
        }

        let mut candidates = self.assignments_where(|a| a.link_id == link_id).await?;
        let mut room_states: HashMap<Ulid, RoomState> = HashMap::new();
        for a in &candidates {
            if !room_states.contains_key(&a.room_id)
                && let Some(room) = self.stores.rooms.get(&a.room_id).await?
            {
                room_states.insert(room.id, room.state);
            }
        }
        candidates.retain(|a| room_states.get(&a.room_id) == Some(&RoomState::Active));

        let default_minutes = self
            .active_price(link_id)
            .await?
            .map(|p| p.duration_minutes)
            .unwrap_or(self.config.default_slot_minutes);

        let slots = resolve_offered_slots(
            &candidates,
            link_id,
            room_id,
            date,
            default_minutes,
            self.config.slot_boundary,
        )?;
        debug!(link = %link_id, %date, day = ?DayOfWeek::of_date(date), slots = slots.len(), "offered slots resolved");
        Ok(slots)
    }

    /// Unassigned parts of `open` in a room on `day`.
    pub async fn free_windows(
        &self,
        room_id: Ulid,
        day: DayOfWeek,
        open: Window,
    ) -> Result<Vec<Window>, EngineError> {
        self.room(room_id).await?;
        let of_room = self.assignments_where(|a| a.room_id == room_id).await?;
        Ok(free_windows(&of_room, room_id, day, open))
    }
}
