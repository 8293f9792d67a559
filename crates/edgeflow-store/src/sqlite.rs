use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection};
use uuid::Uuid;

use edgeflow_domain::{StoreClient, StoreError, StoredObject};

/// Idempotent DDL for the store-and-forward table.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS stored_objects (
    id TEXT PRIMARY KEY,
    app_service_key TEXT NOT NULL,
    payload BLOB NOT NULL,
    pipeline_position INTEGER NOT NULL,
    version TEXT NOT NULL,
    correlation_id TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_stored_objects_service
    ON stored_objects (app_service_key);
";

/// `SQLite`-backed store. Uses a single `Mutex<Connection>` for thread
/// safety; operations are short single-row statements.
///
/// Create with [`SqliteStore::open`] for file-backed persistence or
/// [`SqliteStore::in_memory`] for tests.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| StoreError::Backend(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(backend)?;
        conn.execute_batch(CREATE_TABLES).map_err(backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        conn.execute_batch(CREATE_TABLES).map_err(backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("connection lock poisoned".to_string()))
    }
}

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl StoreClient for SqliteStore {
    async fn store(&self, mut item: StoredObject) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        item.id = id.clone();

        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO stored_objects \
             (id, app_service_key, payload, pipeline_position, version, correlation_id, retry_count) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                item.id,
                item.app_service_key,
                item.payload,
                item.pipeline_position as i64,
                item.version,
                item.correlation_id,
                item.retry_count as i64,
            ],
        )
        .map_err(backend)?;

        Ok(id)
    }

    async fn retrieve_from_store(
        &self,
        app_service_key: &str,
    ) -> Result<Vec<StoredObject>, StoreError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, app_service_key, payload, pipeline_position, version, \
                 correlation_id, retry_count FROM stored_objects WHERE app_service_key = ?1",
            )
            .map_err(backend)?;

        let rows = stmt
            .query_map([app_service_key], |row| {
                Ok(StoredObject {
                    id: row.get(0)?,
                    app_service_key: row.get(1)?,
                    payload: row.get(2)?,
                    pipeline_position: row.get::<_, i64>(3)? as usize,
                    version: row.get(4)?,
                    correlation_id: row.get(5)?,
                    retry_count: row.get::<_, i64>(6)? as u64,
                })
            })
            .map_err(backend)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(backend)
    }

    async fn update(&self, item: &StoredObject) -> Result<(), StoreError> {
        let conn = self.lock_conn()?;
        let changed = conn
            .execute(
                "UPDATE stored_objects SET payload = ?2, pipeline_position = ?3, \
                 version = ?4, correlation_id = ?5, retry_count = ?6 WHERE id = ?1",
                params![
                    item.id,
                    item.payload,
                    item.pipeline_position as i64,
                    item.version,
                    item.correlation_id,
                    item.retry_count as i64,
                ],
            )
            .map_err(backend)?;

        if changed == 0 {
            return Err(StoreError::NotFound(item.id.clone()));
        }
        Ok(())
    }

    async fn remove_from_store(&self, item: &StoredObject) -> Result<(), StoreError> {
        let conn = self.lock_conn()?;
        let changed = conn
            .execute("DELETE FROM stored_objects WHERE id = ?1", [&item.id])
            .map_err(backend)?;

        if changed == 0 {
            return Err(StoreError::NotFound(item.id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(service_key: &str) -> StoredObject {
        let mut item = StoredObject::new(service_key, vec![1, 2, 3], 2, "hash-v1");
        item.correlation_id = "corr-1".to_string();
        item
    }

    #[tokio::test]
    async fn round_trips_all_fields() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.store(item("service-a")).await.unwrap();

        let items = store.retrieve_from_store("service-a").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].payload, vec![1, 2, 3]);
        assert_eq!(items[0].pipeline_position, 2);
        assert_eq!(items[0].version, "hash-v1");
        assert_eq!(items[0].correlation_id, "corr-1");
        assert_eq!(items[0].retry_count, 0);
    }

    #[tokio::test]
    async fn retrieve_is_scoped_to_one_service_key() {
        let store = SqliteStore::in_memory().unwrap();
        store.store(item("service-a")).await.unwrap();
        store.store(item("service-b")).await.unwrap();

        assert_eq!(store.retrieve_from_store("service-a").await.unwrap().len(), 1);
        assert_eq!(store.retrieve_from_store("service-c").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn update_and_remove_by_id() {
        let store = SqliteStore::in_memory().unwrap();
        store.store(item("service-a")).await.unwrap();
        let mut stored = store.retrieve_from_store("service-a").await.unwrap().remove(0);

        stored.retry_count = 7;
        store.update(&stored).await.unwrap();
        let reread = store.retrieve_from_store("service-a").await.unwrap().remove(0);
        assert_eq!(reread.retry_count, 7);

        store.remove_from_store(&stored).await.unwrap();
        assert!(store.retrieve_from_store("service-a").await.unwrap().is_empty());

        assert!(matches!(
            store.update(&stored).await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn contents_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.store(item("service-a")).await.unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        let items = reopened.retrieve_from_store("service-a").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].version, "hash-v1");
    }
}
