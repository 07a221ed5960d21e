//! Record store for the entity registry.
//!
//! [`RecordStore`] is the boundary the pipeline writes through: `load` the
//! whole table, `save` it back as a full replacement. Two implementations:
//! - [`Storage`]: libSQL database file (offline mode), the durable store
//! - [`MemoryStore`]: in-process table for tests and dry runs

mod memory;
mod migrations;

use std::path::Path;

use async_trait::async_trait;
use heirdesk_shared::{Entity, Fields, HeirdeskError, LastUpdated, Result};
use libsql::{Connection, Database, params};
use tracing::{debug, info};

pub use memory::MemoryStore;

/// Durable table of entities keyed by name.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every stored entity, in stored order.
    async fn load(&self) -> Result<Vec<Entity>>;

    /// Replace the stored table with `entities`. All or nothing.
    async fn save(&self, entities: &[Entity]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Storage (libSQL)
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
///
/// Each operation runs on its own connection; the read-only handle rejects
/// `save` before touching the file.
pub struct Storage {
    db: Database,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HeirdeskError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| HeirdeskError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    ///
    /// Fails when no database file exists yet; callers that only read fall
    /// back to [`Storage::open`] to create and seed it.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(HeirdeskError::Storage(format!(
                "no database at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| HeirdeskError::Storage(e.to_string()))?;

        Ok(Self { db, readonly: true })
    }

    fn connect(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| HeirdeskError::Storage(e.to_string()))
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;
        let conn = self.connect()?;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        HeirdeskError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let Ok(conn) = self.connect() else {
            return 0;
        };
        let result = conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(HeirdeskError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for Storage {
    async fn load(&self) -> Result<Vec<Entity>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT name, source_url, fields_json, summary, provenance, last_updated
                 FROM entities ORDER BY position",
                params![],
            )
            .await
            .map_err(|e| HeirdeskError::Storage(e.to_string()))?;

        let mut entities = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| HeirdeskError::Storage(e.to_string()))?
        {
            entities.push(row_to_entity(&row)?);
        }
        debug!(count = entities.len(), "entities loaded");
        Ok(entities)
    }

    async fn save(&self, entities: &[Entity]) -> Result<()> {
        self.check_writable()?;

        let conn = self.connect()?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| HeirdeskError::Storage(e.to_string()))?;

        tx.execute("DELETE FROM entities", params![])
            .await
            .map_err(|e| HeirdeskError::Storage(e.to_string()))?;

        for (position, entity) in entities.iter().enumerate() {
            let fields_json = serde_json::to_string(&entity.fields)
                .map_err(|e| HeirdeskError::Storage(format!("encode fields: {e}")))?;
            let last_updated: String = entity.last_updated.into();

            tx.execute(
                "INSERT INTO entities (name, position, source_url, fields_json, summary, provenance, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entity.name.as_str(),
                    position as i64,
                    entity.source_url.as_deref(),
                    fields_json,
                    entity.summary.as_str(),
                    entity.provenance.map(|p| p.as_str()),
                    last_updated,
                ],
            )
            .await
            .map_err(|e| HeirdeskError::Storage(format!("{}: {e}", entity.name)))?;
        }

        tx.commit()
            .await
            .map_err(|e| HeirdeskError::Storage(e.to_string()))?;

        debug!(count = entities.len(), "entities saved");
        Ok(())
    }
}

/// Convert a database row to an [`Entity`].
fn row_to_entity(row: &libsql::Row) -> Result<Entity> {
    let name: String = row
        .get(0)
        .map_err(|e| HeirdeskError::Storage(e.to_string()))?;

    let fields_json: String = row
        .get(2)
        .map_err(|e| HeirdeskError::Storage(e.to_string()))?;
    let fields: Fields = serde_json::from_str(&fields_json)
        .map_err(|e| HeirdeskError::Storage(format!("{name}: invalid fields: {e}")))?;

    let provenance = match row.get::<String>(4).ok() {
        Some(raw) => Some(raw.parse()?),
        None => None,
    };

    let last_updated: String = row
        .get(5)
        .map_err(|e| HeirdeskError::Storage(e.to_string()))?;

    Ok(Entity {
        source_url: row.get::<String>(1).ok(),
        fields,
        summary: row
            .get::<String>(3)
            .map_err(|e| HeirdeskError::Storage(e.to_string()))?,
        provenance,
        last_updated: LastUpdated::try_from(last_updated)?,
        name,
    })
}
