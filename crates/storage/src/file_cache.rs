//! JSON-file backed fallback cache.
//!
//! The whole cache lives in one small JSON object (`{"key": "value", ...}`), so
//! every write rewrites the file. Writes go to a sibling temp file first and are
//! renamed into place, which keeps a crash from leaving half a document behind.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::repository::{FallbackCache, StorageError};

pub struct FileFallbackCache {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileFallbackCache {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(StorageError::Connection(err.to_string())),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|err| {
            tracing::warn!(path = %self.path.display(), error = %err, "fallback cache file is corrupt");
            StorageError::Serialization(err.to_string())
        })
    }

    fn write_all(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let body = serde_json::to_string_pretty(items)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| StorageError::Connection(err.to_string()))?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, body).map_err(|err| StorageError::Connection(err.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|err| StorageError::Connection(err.to_string()))
    }
}

impl FallbackCache for FileFallbackCache {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(self.read_all()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut items = self.read_all()?;
        items.insert(key.to_owned(), value.to_owned());
        self.write_all(&items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileFallbackCache::new(dir.path().join("cache.json"));
        assert!(cache.get_item("anything").unwrap().is_none());
    }

    #[test]
    fn values_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let cache = FileFallbackCache::new(&path);
        cache.set_item("questionMetricsStore", r#"{"1":{}}"#).unwrap();
        cache.set_item("other", "x").unwrap();
        drop(cache);

        let reopened = FileFallbackCache::new(&path);
        assert_eq!(
            reopened.get_item("questionMetricsStore").unwrap().as_deref(),
            Some(r#"{"1":{}}"#)
        );
        assert_eq!(reopened.get_item("other").unwrap().as_deref(), Some("x"));
        assert!(reopened.get_item("missing").unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json").unwrap();

        let cache = FileFallbackCache::new(&path);
        let err = cache.get_item("k").unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
