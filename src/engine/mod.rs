mod availability;
mod cascade;
mod conflict;
mod error;
mod mutations;
mod queries;
mod slots;
mod store;

pub use availability::{
    availability, free_windows, offered_slots, resolve_offered_slots, AvailabilityFilter,
};
pub use cascade::{
    on_provider_link_deleted, on_provider_link_state_change, on_room_deleted, on_room_state_change,
};
pub use conflict::validate;
pub use error::EngineError;
pub use slots::{generate_slots, generate_slots_with, Slots};
pub(crate) use slots::validate_slot_minutes;
pub use store::{InMemoryRepository, Record, Repository, Stores};

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::model::*;
use crate::observability;

// ── Write serialization ──────────────────────────────────

/// One async mutex per id, created on first use.
#[derive(Default)]
pub(super) struct LockTable {
    locks: DashMap<Ulid, Arc<Mutex<()>>>,
}

impl LockTable {
    /// Lock every id in ascending order. Duplicates are locked once.
    async fn acquire(&self, ids: &[Ulid]) -> Vec<OwnedMutexGuard<()>> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            let lock = self.locks.entry(id).or_default().value().clone();
            guards.push(lock.lock_owned().await);
        }
        guards
    }

    fn forget(&self, id: &Ulid) {
        self.locks.remove(id);
    }
}

/// Held for the whole validate-then-write of one operation.
pub(super) struct WriteScope {
    _links: Vec<OwnedMutexGuard<()>>,
    _rooms: Vec<OwnedMutexGuard<()>>,
}

/// Scheduling engine for one tenant.
///
/// Every write that can break the overlap invariant or leave an assignment
/// out of step with its room or link runs under per-link and per-room
/// locks, always taken links first, each group in id order.
pub struct Engine {
    pub(super) stores: Stores,
    pub(super) config: EngineConfig,
    pub(super) room_locks: LockTable,
    pub(super) link_locks: LockTable,
}

impl Engine {
    pub fn new(stores: Stores, config: EngineConfig) -> Self {
        Self {
            stores,
            config,
            room_locks: LockTable::default(),
            link_locks: LockTable::default(),
        }
    }

    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(Stores::in_memory(), config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub(super) async fn lock_scope(&self, links: &[Ulid], rooms: &[Ulid]) -> WriteScope {
        let _links = self.link_locks.acquire(links).await;
        let _rooms = self.room_locks.acquire(rooms).await;
        WriteScope { _links, _rooms }
    }

    /// Lock the room and link an assignment currently points at, plus any
    /// extra ones, and return the assignment as read under those locks.
    pub(super) async fn lock_assignment(
        &self,
        id: Ulid,
        extra_link: Option<Ulid>,
        extra_room: Option<Ulid>,
    ) -> Result<(Assignment, WriteScope), EngineError> {
        loop {
            let seen = self.assignment(id).await?;
            let links: Vec<Ulid> = std::iter::once(seen.link_id).chain(extra_link).collect();
            let rooms: Vec<Ulid> = std::iter::once(seen.room_id).chain(extra_room).collect();
            let scope = self.lock_scope(&links, &rooms).await;
            let current = self.assignment(id).await?;
            if current.room_id == seen.room_id && current.link_id == seen.link_id {
                return Ok((current, scope));
            }
            // Moved to another room or link while we waited.
        }
    }

    pub(super) async fn room(&self, id: Ulid) -> Result<Room, EngineError> {
        self.stores.rooms.get(&id).await?.ok_or(EngineError::NotFound(id))
    }

    pub(super) async fn link(&self, id: Ulid) -> Result<ProviderBranchLink, EngineError> {
        self.stores.links.get(&id).await?.ok_or(EngineError::NotFound(id))
    }

    pub(super) async fn assignment(&self, id: Ulid) -> Result<Assignment, EngineError> {
        self.stores
            .assignments
            .get(&id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    pub(super) async fn assignments_where(
        &self,
        pred: impl Fn(&Assignment) -> bool,
    ) -> Result<Vec<Assignment>, EngineError> {
        let mut all = self.stores.assignments.list().await?;
        all.retain(|a| pred(a));
        Ok(all)
    }

    /// Write each assignment that differs from its `before` counterpart.
    pub(super) async fn persist_changed(
        &self,
        before: &[Assignment],
        after: Vec<Assignment>,
    ) -> Result<Vec<Assignment>, EngineError> {
        let mut changed = Vec::new();
        for (old, new) in before.iter().zip(after) {
            if *old != new {
                self.stores.assignments.upsert(new.clone()).await?;
                changed.push(new);
            }
        }
        Ok(changed)
    }
}

pub(super) fn record_decision(operation: &'static str, result: &Result<(), EngineError>) {
    let (outcome, reason) = match result {
        Ok(()) => ("admitted", "none"),
        Err(e) => ("rejected", e.reason()),
    };
    metrics::counter!(
        observability::ASSIGNMENT_DECISIONS_TOTAL,
        "operation" => operation,
        "outcome" => outcome,
        "reason" => reason
    )
    .increment(1);
}

pub(super) fn record_duration(operation: &'static str, started: Instant) {
    metrics::histogram!(observability::OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}
