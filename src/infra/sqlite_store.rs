use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

use crate::app::ports::{DocumentStorePort, JsonRecord};
use crate::domain::Lookup;
use crate::error::{PipelineError, Result};

/// SQLite-backed document store. Each collection is a table holding one JSON
/// document per row; the optional unique index materializes the indexed field
/// into its own column so the constraint is enforced by the database.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS collection_meta (name TEXT PRIMARY KEY, index_field TEXT)",
            [],
        )
        .map_err(db_err)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn index_field(conn: &Connection, name: &str) -> Result<Option<String>> {
        let mut stmt = conn
            .prepare("SELECT index_field FROM collection_meta WHERE name = ?1")
            .map_err(db_err)?;
        let mut rows = stmt.query([name]).map_err(db_err)?;
        match rows.next().map_err(db_err)? {
            Some(row) => Ok(row.get::<_, Option<String>>(0).map_err(db_err)?),
            None => Err(PipelineError::Database(format!("collection does not exist: {}", name))),
        }
    }
}

/// Collection names become SQL identifiers; restrict them rather than quote
/// arbitrary input.
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.chars().next().unwrap().is_ascii_digit();
    if valid {
        Ok(())
    } else {
        Err(PipelineError::Database(format!("invalid collection name: {}", name)))
    }
}

fn db_err(e: rusqlite::Error) -> PipelineError {
    PipelineError::Database(e.to_string())
}

fn index_value(record: &JsonRecord, field: &str) -> String {
    match record.get(field) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[async_trait]
impl DocumentStorePort for SqliteDocumentStore {
    async fn create_collection(&self, name: &str, unique_index: Option<&str>) -> Result<()> {
        validate_name(name)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(&format!("DROP TABLE IF EXISTS \"{}\"", name), [])
            .map_err(db_err)?;
        conn.execute(
            &format!(
                "CREATE TABLE \"{}\" (seq INTEGER PRIMARY KEY AUTOINCREMENT, idx TEXT, doc TEXT NOT NULL)",
                name
            ),
            [],
        )
        .map_err(db_err)?;
        if unique_index.is_some() {
            conn.execute(
                &format!("CREATE UNIQUE INDEX \"{0}_idx\" ON \"{0}\" (idx)", name),
                [],
            )
            .map_err(db_err)?;
        }
        conn.execute(
            "INSERT OR REPLACE INTO collection_meta (name, index_field) VALUES (?1, ?2)",
            rusqlite::params![name, unique_index],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(&format!("DROP TABLE IF EXISTS \"{}\"", name), [])
            .map_err(db_err)?;
        conn.execute("DELETE FROM collection_meta WHERE name = ?1", [name])
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_records(&self, name: &str, records: &[JsonRecord]) -> Result<()> {
        validate_name(name)?;
        let mut conn = self.conn.lock().unwrap();
        let index_field = Self::index_field(&conn, name)?;
        let tx = conn.transaction().map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare(&format!("INSERT INTO \"{}\" (idx, doc) VALUES (?1, ?2)", name))
                .map_err(db_err)?;
            for record in records {
                let idx = index_field.as_deref().map(|field| index_value(record, field));
                let doc = serde_json::to_string(record)?;
                stmt.execute(rusqlite::params![idx, doc]).map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;
        Ok(())
    }

    async fn fetch_all(&self, name: &str) -> Result<Lookup<Vec<JsonRecord>>> {
        validate_name(name)?;
        let conn = self.conn.lock().unwrap();
        let table_exists: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get::<_, i64>(0).map(|n| n > 0),
            )
            .map_err(db_err)?;
        if !table_exists {
            return Ok(Lookup::Missing);
        }
        let mut stmt = conn
            .prepare(&format!("SELECT doc FROM \"{}\" ORDER BY seq", name))
            .map_err(db_err)?;
        let docs = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(db_err)?;
        if docs.is_empty() {
            return Ok(Lookup::Missing);
        }
        let mut records = Vec::with_capacity(docs.len());
        for doc in docs {
            records.push(serde_json::from_str(&doc)?);
        }
        Ok(Lookup::Found(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(wafer: i64, value: f64) -> JsonRecord {
        let mut r = JsonRecord::new();
        r.insert("Wafer".into(), serde_json::json!(wafer));
        r.insert("Sensor-1".into(), serde_json::json!(value));
        r
    }

    #[tokio::test]
    async fn insert_and_scan_preserves_order() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.create_collection("training_data", Some("Wafer")).await.unwrap();
        store
            .insert_records("training_data", &[record(801, 1.5), record(802, 2.0)])
            .await
            .unwrap();
        let records = store.fetch_all("training_data").await.unwrap().into_option().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["Wafer"], serde_json::json!(801));
        assert_eq!(records[1]["Sensor-1"], serde_json::json!(2.0));
    }

    #[tokio::test]
    async fn unique_index_is_enforced() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.create_collection("t", Some("Wafer")).await.unwrap();
        store.insert_records("t", &[record(801, 1.0)]).await.unwrap();
        assert!(store.insert_records("t", &[record(801, 2.0)]).await.is_err());
    }

    #[tokio::test]
    async fn recreate_drops_previous_contents() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.create_collection("t", None).await.unwrap();
        store.insert_records("t", &[record(1, 1.0)]).await.unwrap();
        store.create_collection("t", None).await.unwrap();
        assert!(store.fetch_all("t").await.unwrap().is_missing());
    }

    #[tokio::test]
    async fn hostile_collection_names_are_rejected() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        assert!(store.create_collection("drop table; --", None).await.is_err());
    }
}
