use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::app::ports::{DocumentStorePort, JsonRecord, StoragePort};
use crate::domain::Lookup;
use crate::error::{PipelineError, Result};

/// In-memory storage adapter for development and tests.
#[derive(Default)]
pub struct InMemoryStorage {
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: place an object without going through the port.
    pub fn seed(&self, path: &str, bytes: &[u8]) {
        self.objects.lock().unwrap().insert(path.to_string(), bytes.to_vec());
    }

    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

fn under_prefix(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .map(|rest| rest.starts_with('/'))
        .unwrap_or(false)
}

#[async_trait]
impl StoragePort for InMemoryStorage {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.objects.lock().unwrap().contains_key(path))
    }

    async fn list(&self, prefix: &str) -> Result<Lookup<Vec<String>>> {
        let objects = self.objects.lock().unwrap();
        let paths: Vec<String> = objects
            .keys()
            .filter(|path| under_prefix(path, prefix))
            .cloned()
            .collect();
        if paths.is_empty() {
            Ok(Lookup::Missing)
        } else {
            Ok(Lookup::Found(paths))
        }
    }

    async fn read(&self, path: &str) -> Result<Lookup<Vec<u8>>> {
        match self.objects.lock().unwrap().get(path) {
            Some(bytes) => Ok(Lookup::Found(bytes.clone())),
            None => Ok(Lookup::Missing),
        }
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.objects.lock().unwrap().insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        let bytes = objects
            .get(src)
            .cloned()
            .ok_or_else(|| PipelineError::Storage(format!("copy source does not exist: {}", src)))?;
        objects.insert(dst.to_string(), bytes);
        Ok(())
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        let bytes = objects
            .remove(src)
            .ok_or_else(|| PipelineError::Storage(format!("move source does not exist: {}", src)))?;
        objects.insert(dst.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(path);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        objects.retain(|path, _| !under_prefix(path, prefix));
        Ok(())
    }
}

struct Collection {
    unique_index: Option<String>,
    records: Vec<JsonRecord>,
}

/// In-memory document store with the same unique-index semantics as the
/// SQLite adapter.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<Mutex<HashMap<String, Collection>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStorePort for InMemoryDocumentStore {
    async fn create_collection(&self, name: &str, unique_index: Option<&str>) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        collections.insert(
            name.to_string(),
            Collection {
                unique_index: unique_index.map(str::to_string),
                records: Vec::new(),
            },
        );
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.collections.lock().unwrap().remove(name);
        Ok(())
    }

    async fn insert_records(&self, name: &str, records: &[JsonRecord]) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| PipelineError::Database(format!("collection does not exist: {}", name)))?;
        for record in records {
            if let Some(field) = &collection.unique_index {
                let value = record.get(field);
                if collection.records.iter().any(|r| r.get(field) == value) {
                    return Err(PipelineError::Database(format!(
                        "unique index violation on field {} in collection {}",
                        field, name
                    )));
                }
            }
            collection.records.push(record.clone());
        }
        Ok(())
    }

    async fn fetch_all(&self, name: &str) -> Result<Lookup<Vec<JsonRecord>>> {
        let collections = self.collections.lock().unwrap();
        match collections.get(name) {
            Some(collection) if !collection.records.is_empty() => {
                Ok(Lookup::Found(collection.records.clone()))
            }
            _ => Ok(Lookup::Missing),
        }
    }
}
