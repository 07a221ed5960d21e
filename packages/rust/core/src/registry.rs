//! In-memory entity table with a single writer in front of the record store.
//!
//! Every mutation and every checkpoint takes the same lock, so concurrent
//! acquisitions never interleave a read-modify-write and each save writes one
//! consistent snapshot.

use std::sync::Arc;

use heirdesk_shared::{Entity, Result, seed_entities};
use heirdesk_storage::RecordStore;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct Registry {
    store: Arc<dyn RecordStore>,
    entities: Mutex<Vec<Entity>>,
}

impl Registry {
    /// Load the table from `store`.
    pub async fn load(store: Arc<dyn RecordStore>) -> Result<Self> {
        let entities = store.load().await?;
        debug!(count = entities.len(), "registry loaded");
        Ok(Self {
            store,
            entities: Mutex::new(entities),
        })
    }

    /// Load the table, seeding (and saving) the static seed list when it is empty.
    pub async fn bootstrap(store: Arc<dyn RecordStore>) -> Result<Self> {
        let registry = Self::load(store).await?;
        {
            let mut entities = registry.entities.lock().await;
            if entities.is_empty() {
                *entities = seed_entities();
                registry.store.save(&entities).await?;
                info!(count = entities.len(), "registry seeded");
            }
        }
        Ok(registry)
    }

    /// Copy of the current table.
    pub async fn snapshot(&self) -> Vec<Entity> {
        self.entities.lock().await.clone()
    }

    pub async fn get(&self, name: &str) -> Option<Entity> {
        self.entities
            .lock()
            .await
            .iter()
            .find(|e| e.name == name)
            .cloned()
    }

    /// Replace the entity with the same name, or append a new one.
    pub async fn apply(&self, entity: Entity) {
        let mut entities = self.entities.lock().await;
        upsert(&mut entities, entity);
    }

    /// Write the whole table to the store.
    pub async fn checkpoint(&self) -> Result<()> {
        let entities = self.entities.lock().await;
        self.store.save(&entities).await?;
        debug!(count = entities.len(), "checkpoint saved");
        Ok(())
    }

    /// [`apply`](Self::apply) and [`checkpoint`](Self::checkpoint) under one lock.
    pub async fn commit(&self, entity: Entity) -> Result<()> {
        let mut entities = self.entities.lock().await;
        upsert(&mut entities, entity);
        self.store.save(&entities).await?;
        Ok(())
    }

    /// Overwrite the table (and the store) with the static seed list.
    pub async fn reset(&self) -> Result<()> {
        let mut entities = self.entities.lock().await;
        *entities = seed_entities();
        self.store.save(&entities).await?;
        info!(count = entities.len(), "registry reset to seed list");
        Ok(())
    }
}

fn upsert(entities: &mut Vec<Entity>, entity: Entity) {
    match entities.iter_mut().find(|e| e.name == entity.name) {
        Some(slot) => *slot = entity,
        None => entities.push(entity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heirdesk_shared::{FieldKey, SEED_ENTITIES};
    use heirdesk_storage::MemoryStore;

    #[tokio::test]
    async fn bootstrap_seeds_empty_store() {
        let store = Arc::new(MemoryStore::default());
        let registry = Registry::bootstrap(store.clone()).await.unwrap();

        assert_eq!(registry.snapshot().await.len(), SEED_ENTITIES.len());
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.snapshot().await.len(), SEED_ENTITIES.len());
    }

    #[tokio::test]
    async fn bootstrap_keeps_existing_table() {
        let store = Arc::new(MemoryStore::new(vec![Entity::seeded("Acme Bank", None)]));
        let registry = Registry::bootstrap(store.clone()).await.unwrap();

        assert_eq!(registry.snapshot().await.len(), 1);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn apply_upserts_without_saving() {
        let store = Arc::new(MemoryStore::new(vec![Entity::seeded("Acme Bank", None)]));
        let registry = Registry::load(store.clone()).await.unwrap();

        let mut updated = Entity::seeded("Acme Bank", Some("https://acme.example"));
        updated.fields.set(FieldKey::ContactPhone, "0120-000-000");
        registry.apply(updated).await;
        registry.apply(Entity::seeded("Beta Bank", None)).await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].fields.get(FieldKey::ContactPhone), "0120-000-000");
        assert_eq!(store.save_count(), 0);

        registry.checkpoint().await.unwrap();
        assert_eq!(store.snapshot().await, snapshot);
    }

    #[tokio::test]
    async fn commit_saves_immediately() {
        let store = Arc::new(MemoryStore::default());
        let registry = Registry::load(store.clone()).await.unwrap();

        registry.commit(Entity::seeded("Acme Bank", None)).await.unwrap();

        assert_eq!(store.save_count(), 1);
        assert!(registry.get("Acme Bank").await.is_some());
        assert!(registry.get("Beta Bank").await.is_none());
    }

    #[tokio::test]
    async fn reset_restores_seed_list() {
        let store = Arc::new(MemoryStore::new(vec![Entity::seeded("Acme Bank", None)]));
        let registry = Registry::load(store.clone()).await.unwrap();

        registry.reset().await.unwrap();

        let names: Vec<String> = store.snapshot().await.into_iter().map(|e| e.name).collect();
        let seeded: Vec<&str> = SEED_ENTITIES.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, seeded);
    }
}
