use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::EngineError;

/// Anything a repository can hold.
pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> Ulid;
}

impl Record for Room {
    fn id(&self) -> Ulid {
        self.id
    }
}

impl Record for ProviderBranchLink {
    fn id(&self) -> Ulid {
        self.id
    }
}

impl Record for Assignment {
    fn id(&self) -> Ulid {
        self.id
    }
}

impl Record for PriceSchedule {
    fn id(&self) -> Ulid {
        self.id
    }
}

/// Storage seam. Implementations report their own failures as
/// `EngineError::Store`; the engine never retries them.
#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    async fn list(&self) -> Result<Vec<T>, EngineError>;
    async fn get(&self, id: &Ulid) -> Result<Option<T>, EngineError>;
    async fn upsert(&self, record: T) -> Result<(), EngineError>;
    /// Returns the removed record, if there was one.
    async fn delete(&self, id: &Ulid) -> Result<Option<T>, EngineError>;
}

pub struct InMemoryRepository<T> {
    records: DashMap<Ulid, T>,
}

impl<T: Record> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl<T: Record> Repository<T> for InMemoryRepository<T> {
    /// Sorted by id, which for ULIDs is creation order.
    async fn list(&self) -> Result<Vec<T>, EngineError> {
        let mut out: Vec<(Ulid, T)> = self
            .records
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        Ok(out.into_iter().map(|(_, r)| r).collect())
    }

    async fn get(&self, id: &Ulid) -> Result<Option<T>, EngineError> {
        Ok(self.records.get(id).map(|e| e.value().clone()))
    }

    async fn upsert(&self, record: T) -> Result<(), EngineError> {
        self.records.insert(record.id(), record);
        Ok(())
    }

    async fn delete(&self, id: &Ulid) -> Result<Option<T>, EngineError> {
        Ok(self.records.remove(id).map(|(_, r)| r))
    }
}

/// One repository per record type.
#[derive(Clone)]
pub struct Stores {
    pub rooms: Arc<dyn Repository<Room>>,
    pub links: Arc<dyn Repository<ProviderBranchLink>>,
    pub assignments: Arc<dyn Repository<Assignment>>,
    pub prices: Arc<dyn Repository<PriceSchedule>>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            rooms: Arc::new(InMemoryRepository::<Room>::new()),
            links: Arc::new(InMemoryRepository::<ProviderBranchLink>::new()),
            assignments: Arc::new(InMemoryRepository::<Assignment>::new()),
            prices: Arc::new(InMemoryRepository::<PriceSchedule>::new()),
        }
    }
}

impl Default for Stores {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(name: &str) -> Room {
        Room::new(Ulid::new(), Ulid::new(), name)
    }

    #[tokio::test]
    async fn upsert_get_delete() {
        let repo = InMemoryRepository::<Room>::new();
        let mut r = room("A");
        repo.upsert(r.clone()).await.unwrap();
        assert_eq!(repo.get(&r.id).await.unwrap(), Some(r.clone()));

        r.state = RoomState::Maintenance;
        repo.upsert(r.clone()).await.unwrap();
        assert_eq!(repo.len(), 1);
        assert_eq!(repo.get(&r.id).await.unwrap().unwrap().state, RoomState::Maintenance);

        assert_eq!(repo.delete(&r.id).await.unwrap(), Some(r.clone()));
        assert_eq!(repo.delete(&r.id).await.unwrap(), None);
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn list_is_in_id_order() {
        let repo = InMemoryRepository::<Room>::new();
        let rooms: Vec<Room> = (0..5).map(|i| room(&format!("R{i}"))).collect();
        for r in rooms.iter().rev() {
            repo.upsert(r.clone()).await.unwrap();
        }
        let mut expected = rooms.clone();
        expected.sort_by_key(|r| r.id);
        assert_eq!(repo.list().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn stores_are_independent() {
        let stores = Stores::in_memory();
        let r = room("A");
        stores.rooms.upsert(r.clone()).await.unwrap();
        assert!(stores.links.get(&r.id).await.unwrap().is_none());
        assert_eq!(stores.rooms.list().await.unwrap().len(), 1);
    }
}
