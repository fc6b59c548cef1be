use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::ports::StoragePort;
use crate::domain::Lookup;
use crate::error::{PipelineError, Result};

/// Filesystem storage adapter. Object keys are slash-separated paths under a
/// fixed root directory.
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn collect_files(&self, dir: &Path, out: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                self.collect_files(&path, out)?;
            } else {
                let key = path
                    .strip_prefix(&self.root)
                    .map_err(|e| PipelineError::Storage(e.to_string()))?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push(key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StoragePort for FsStorage {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path).exists())
    }

    async fn list(&self, prefix: &str) -> Result<Lookup<Vec<String>>> {
        let dir = self.resolve(prefix);
        if !dir.is_dir() {
            return Ok(Lookup::Missing);
        }
        let mut paths = Vec::new();
        self.collect_files(&dir, &mut paths)?;
        if paths.is_empty() {
            return Ok(Lookup::Missing);
        }
        paths.sort();
        Ok(Lookup::Found(paths))
    }

    async fn read(&self, path: &str) -> Result<Lookup<Vec<u8>>> {
        let file = self.resolve(path);
        if !file.exists() {
            return Ok(Lookup::Missing);
        }
        Ok(Lookup::Found(fs::read(file)?))
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let file = self.resolve(path);
        self.ensure_parent(&file)?;
        fs::write(file, bytes)?;
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let to = self.resolve(dst);
        self.ensure_parent(&to)?;
        fs::copy(self.resolve(src), to)?;
        Ok(())
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        let to = self.resolve(dst);
        self.ensure_parent(&to)?;
        fs::rename(self.resolve(src), to)?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let file = self.resolve(path);
        if file.exists() {
            fs::remove_file(file)?;
        }
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let dir = self.resolve(prefix);
        if dir.is_dir() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn write_list_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(dir.path());
        storage.write("good_data/wafer_1.csv", b"a,b\n1,2\n").await.unwrap();
        storage.write("good_data/wafer_2.csv", b"a,b\n3,4\n").await.unwrap();
        let paths = storage.list("good_data").await.unwrap().into_option().unwrap();
        assert_eq!(paths, vec!["good_data/wafer_1.csv", "good_data/wafer_2.csv"]);
        let bytes = storage.read("good_data/wafer_1.csv").await.unwrap().into_option().unwrap();
        assert_eq!(bytes, b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn missing_prefix_lists_as_missing() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(dir.path());
        assert!(storage.list("nowhere").await.unwrap().is_missing());
    }

    #[tokio::test]
    async fn delete_prefix_clears_partition() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(dir.path());
        storage.write("bad_data/x.csv", b"x").await.unwrap();
        storage.delete_prefix("bad_data").await.unwrap();
        assert!(storage.list("bad_data").await.unwrap().is_missing());
    }
}
