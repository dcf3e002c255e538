use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::cascade::{
    on_provider_link_deleted, on_provider_link_state_change, on_room_deleted, on_room_state_change,
};
use super::conflict::{validate, validate_fields, validate_link_fields, validate_room_fields};
use super::slots::validate_slot_minutes;
use super::{record_decision, record_duration, Engine, EngineError};

impl Engine {
    // ── Rooms, links, prices ─────────────────────────────────

    pub async fn create_room(&self, room: Room) -> Result<(), EngineError> {
        validate_room_fields(&room)?;
        let _scope = self.lock_scope(&[], &[room.id]).await;
        if self.stores.rooms.get(&room.id).await?.is_some() {
            return Err(EngineError::AlreadyExists(room.id));
        }
        info!(room = %room.id, branch = %room.branch_id, state = ?room.state, "room created");
        self.stores.rooms.upsert(room).await
    }

    pub async fn create_provider_link(&self, link: ProviderBranchLink) -> Result<(), EngineError> {
        validate_link_fields(&link)?;
        let _scope = self.lock_scope(&[link.id], &[]).await;
        if self.stores.links.get(&link.id).await?.is_some() {
            return Err(EngineError::AlreadyExists(link.id));
        }
        info!(link = %link.id, provider = %link.provider_id, branch = %link.branch_id, "provider link created");
        self.stores.links.upsert(link).await
    }

    /// Store a price schedule. An active one retires any other active
    /// schedule of the same link.
    pub async fn set_price_schedule(&self, price: PriceSchedule) -> Result<(), EngineError> {
        validate_slot_minutes(price.duration_minutes)?;
        let _scope = self.lock_scope(&[price.link_id], &[]).await;
        self.link(price.link_id).await?;

        if price.active {
            for mut other in self.stores.prices.list().await? {
                if other.link_id == price.link_id && other.id != price.id && other.active {
                    other.active = false;
                    debug!(price = %other.id, link = %other.link_id, "price schedule retired");
                    self.stores.prices.upsert(other).await?;
                }
            }
        }
        self.stores.prices.upsert(price).await
    }

    // ── Assignments ──────────────────────────────────────────

    /// Admit a new assignment. It is always stored active.
    pub async fn create_assignment(&self, mut assignment: Assignment) -> Result<Assignment, EngineError> {
        let started = Instant::now();
        validate_fields(&assignment)?;
        assignment.activate();

        let _scope = self
            .lock_scope(&[assignment.link_id], &[assignment.room_id])
            .await;
        if self.stores.assignments.get(&assignment.id).await?.is_some() {
            return Err(EngineError::AlreadyExists(assignment.id));
        }

        let verdict = self.admit(&assignment, None).await;
        record_decision("create", &verdict);
        verdict?;

        self.stores.assignments.upsert(assignment.clone()).await?;
        info!(
            assignment = %assignment.id,
            room = %assignment.room_id,
            link = %assignment.link_id,
            day = ?assignment.day,
            window = %assignment.window(),
            "assignment created"
        );
        record_duration("create_assignment", started);
        Ok(assignment)
    }

    /// Replace a stored assignment. Active results are re-validated with the
    /// stored version excluded; inactive ones only need sane fields.
    pub async fn update_assignment(&self, mut assignment: Assignment) -> Result<Assignment, EngineError> {
        let started = Instant::now();
        validate_fields(&assignment)?;

        let (current, _scope) = self
            .lock_assignment(assignment.id, Some(assignment.link_id), Some(assignment.room_id))
            .await?;

        if assignment.is_active() {
            assignment.suspension = Suspension::default();
            let verdict = self.admit(&assignment, Some(assignment.id)).await;
            record_decision("update", &verdict);
            verdict?;
        } else {
            // The cascade owns the suspension marks.
            assignment.suspension = if current.is_active() {
                Suspension::default()
            } else {
                current.suspension
            };
            // A move into a room or link must still point at real records.
            self.room(assignment.room_id).await?;
            self.link(assignment.link_id).await?;
        }

        self.stores.assignments.upsert(assignment.clone()).await?;
        info!(assignment = %assignment.id, state = ?assignment.state, window = %assignment.window(), "assignment updated");
        record_duration("update_assignment", started);
        Ok(assignment)
    }

    /// Switch an assignment on or off by hand. Switching on re-validates it.
    pub async fn set_assignment_state(
        &self,
        id: Ulid,
        state: AssignmentState,
    ) -> Result<Assignment, EngineError> {
        let (mut assignment, _scope) = self.lock_assignment(id, None, None).await?;
        if assignment.state == state {
            return Ok(assignment);
        }

        match state {
            AssignmentState::Active => {
                assignment.activate();
                let verdict = self.admit(&assignment, Some(id)).await;
                record_decision("activate", &verdict);
                verdict?;
            }
            AssignmentState::Inactive => {
                assignment.state = AssignmentState::Inactive;
                assignment.suspension = Suspension::default();
            }
        }

        self.stores.assignments.upsert(assignment.clone()).await?;
        info!(assignment = %id, state = ?state, "assignment state set");
        Ok(assignment)
    }

    pub async fn delete_assignment(&self, id: Ulid) -> Result<Assignment, EngineError> {
        let (_, _scope) = self.lock_assignment(id, None, None).await?;
        let removed = self
            .stores
            .assignments
            .delete(&id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        info!(assignment = %id, room = %removed.room_id, "assignment deleted");
        Ok(removed)
    }

    /// Room, link and overlap checks for an assignment about to be stored
    /// active. Caller holds the locks.
    async fn admit(&self, candidate: &Assignment, exclude_id: Option<Ulid>) -> Result<(), EngineError> {
        let room = self.room(candidate.room_id).await?;
        let link = self.link(candidate.link_id).await?;
        let existing = self
            .assignments_where(|a| a.room_id == candidate.room_id)
            .await?;
        let others = existing.iter().filter(|a| Some(a.id) != exclude_id).count();
        if others >= MAX_ASSIGNMENTS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many assignments on room"));
        }

        let verdict = validate(candidate, &room, &existing, exclude_id).and_then(|()| {
            if link.state == LinkState::Active {
                Ok(())
            } else {
                Err(EngineError::ProviderLinkNotActive(link.id))
            }
        });
        match &verdict {
            Ok(()) => debug!(assignment = %candidate.id, room = %room.id, "assignment admitted"),
            Err(e) => warn!(assignment = %candidate.id, room = %room.id, reason = e.reason(), "assignment rejected: {e}"),
        }
        verdict
    }

    // ── Cascades ─────────────────────────────────────────────

    /// Change a room's state and carry it onto its assignments. Returns the
    /// assignments whose stored state changed.
    ///
    /// Going down, the room is written before its assignments; coming back
    /// up, after them. Readers that check room state never see slots for a
    /// room that is down.
    pub async fn set_room_state(
        &self,
        room_id: Ulid,
        state: RoomState,
    ) -> Result<Vec<Assignment>, EngineError> {
        let started = Instant::now();
        let _scope = self.lock_scope(&[], &[room_id]).await;
        let mut room = self.room(room_id).await?;
        room.state = state;

        let before = self.assignments_where(|a| a.room_id == room_id).await?;
        let after = on_room_state_change(room_id, state, before.clone(), self.config.reactivation);

        let going_up = state == RoomState::Active;
        if !going_up {
            self.stores.rooms.upsert(room.clone()).await?;
        }
        let changed = self.persist_changed(&before, after).await?;
        if going_up {
            self.stores.rooms.upsert(room).await?;
        }

        metrics::counter!(observability::CASCADE_UPDATES_TOTAL, "entity" => "room")
            .increment(changed.len() as u64);
        info!(room = %room_id, state = ?state, cascaded = changed.len(), "room state changed");
        record_duration("set_room_state", started);
        Ok(changed)
    }

    /// Change a provider link's state and carry it onto its assignments.
    pub async fn set_provider_link_state(
        &self,
        link_id: Ulid,
        state: LinkState,
    ) -> Result<Vec<Assignment>, EngineError> {
        let started = Instant::now();
        let _link_guard = self.link_locks.acquire(&[link_id]).await;
        let mut link = self.link(link_id).await?;
        link.state = state;

        // Room cascades change these assignments under the room locks only,
        // so the snapshot is taken again once those are held.
        let (before, _room_guards) = loop {
            let rooms = rooms_of(&self.assignments_where(|a| a.link_id == link_id).await?);
            let guards = self.room_locks.acquire(&rooms).await;
            let before = self.assignments_where(|a| a.link_id == link_id).await?;
            if rooms_of(&before) == rooms {
                break (before, guards);
            }
        };
        let after = on_provider_link_state_change(link_id, state, before.clone(), self.config.reactivation);

        let going_up = state == LinkState::Active;
        if !going_up {
            self.stores.links.upsert(link.clone()).await?;
        }
        let changed = self.persist_changed(&before, after).await?;
        if going_up {
            self.stores.links.upsert(link).await?;
        }

        metrics::counter!(observability::CASCADE_UPDATES_TOTAL, "entity" => "provider_link")
            .increment(changed.len() as u64);
        info!(link = %link_id, state = ?state, cascaded = changed.len(), "provider link state changed");
        record_duration("set_provider_link_state", started);
        Ok(changed)
    }

    /// Delete a room and every assignment on it. Returns the removed
    /// assignments.
    pub async fn delete_room(&self, room_id: Ulid) -> Result<Vec<Assignment>, EngineError> {
        let scope = self.lock_scope(&[], &[room_id]).await;
        self.room(room_id).await?;

        let all = self.stores.assignments.list().await?;
        let kept: HashSet<Ulid> = on_room_deleted(room_id, all.clone())
            .into_iter()
            .map(|a| a.id)
            .collect();
        let removed = self.remove_assignments(all, &kept).await?;
        self.stores.rooms.delete(&room_id).await?;

        drop(scope);
        self.room_locks.forget(&room_id);
        info!(room = %room_id, removed = removed.len(), "room deleted");
        Ok(removed)
    }

    /// Delete a provider link, its assignments and its price schedules.
    pub async fn delete_provider_link(&self, link_id: Ulid) -> Result<Vec<Assignment>, EngineError> {
        let link_guard = self.link_locks.acquire(&[link_id]).await;
        self.link(link_id).await?;

        let rooms = rooms_of(&self.assignments_where(|a| a.link_id == link_id).await?);
        let room_guards = self.room_locks.acquire(&rooms).await;

        let all = self.stores.assignments.list().await?;
        let kept: HashSet<Ulid> = on_provider_link_deleted(link_id, all.clone())
            .into_iter()
            .map(|a| a.id)
            .collect();
        let removed = self.remove_assignments(all, &kept).await?;

        for price in self.stores.prices.list().await? {
            if price.link_id == link_id {
                self.stores.prices.delete(&price.id).await?;
            }
        }
        self.stores.links.delete(&link_id).await?;

        drop(room_guards);
        drop(link_guard);
        self.link_locks.forget(&link_id);
        info!(link = %link_id, removed = removed.len(), "provider link deleted");
        Ok(removed)
    }

    async fn remove_assignments(
        &self,
        all: Vec<Assignment>,
        kept: &HashSet<Ulid>,
    ) -> Result<Vec<Assignment>, EngineError> {
        let mut removed = Vec::new();
        for a in all.into_iter().filter(|a| !kept.contains(&a.id)) {
            self.stores.assignments.delete(&a.id).await?;
            removed.push(a);
        }
        Ok(removed)
    }
}

/// Distinct rooms of `assignments`, in lock order.
fn rooms_of(assignments: &[Assignment]) -> Vec<Ulid> {
    let mut rooms: Vec<Ulid> = assignments.iter().map(|a| a.room_id).collect();
    rooms.sort();
    rooms.dedup();
    rooms
}
