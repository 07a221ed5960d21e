//! In-memory record store.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use heirdesk_shared::{Entity, Result};
use tokio::sync::Mutex;

use crate::RecordStore;

/// [`RecordStore`] held in process memory. Counts `save` calls so tests can
/// check checkpoint behaviour.
#[derive(Default)]
pub struct MemoryStore {
    entities: Mutex<Vec<Entity>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self {
            entities: Mutex::new(entities),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of completed `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Current stored table.
    pub async fn snapshot(&self) -> Vec<Entity> {
        self.entities.lock().await.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self) -> Result<Vec<Entity>> {
        Ok(self.entities.lock().await.clone())
    }

    async fn save(&self, entities: &[Entity]) -> Result<()> {
        *self.entities.lock().await = entities.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
