use async_trait::async_trait;

use crate::domain::Lookup;
use crate::error::Result;

pub type JsonRecord = serde_json::Map<String, serde_json::Value>;

/// Narrow interface over the object storage collaborator.
///
/// Paths are slash-separated keys relative to the adapter's root. Every call
/// is blocking from the pipeline's point of view; errors propagate unretried.
#[async_trait]
pub trait StoragePort: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Lists object paths under a prefix. `Missing` when the prefix does not
    /// exist or holds no objects, mirroring the storage collaborator which
    /// does not distinguish the two.
    async fn list(&self, prefix: &str) -> Result<Lookup<Vec<String>>>;

    async fn read(&self, path: &str) -> Result<Lookup<Vec<u8>>>;

    /// Writes, unconditionally overwriting any existing object.
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    async fn copy(&self, src: &str, dst: &str) -> Result<()>;

    async fn rename(&self, src: &str, dst: &str) -> Result<()>;

    async fn delete(&self, path: &str) -> Result<()>;

    async fn delete_prefix(&self, prefix: &str) -> Result<()>;
}

/// Narrow interface over the document database collaborator.
#[async_trait]
pub trait DocumentStorePort: Send + Sync {
    /// Creates a collection, dropping any existing one with the same name.
    /// When `unique_index` names a field, inserting two records with the same
    /// value for it is an error.
    async fn create_collection(&self, name: &str, unique_index: Option<&str>) -> Result<()>;

    async fn drop_collection(&self, name: &str) -> Result<()>;

    async fn insert_records(&self, name: &str, records: &[JsonRecord]) -> Result<()>;

    /// Full scan back in insertion order. `Missing` when the collection does
    /// not exist or holds no records.
    async fn fetch_all(&self, name: &str) -> Result<Lookup<Vec<JsonRecord>>>;
}
