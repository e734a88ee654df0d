use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::{ObjectStore, Record, StorageResult};

/// Filesystem-backed object store.
///
/// Layout: `<root>/<kind>/<name>.json`, each file a serialised [`Record`].
/// The record's `kind` and `name` are taken from its location, so hand-written
/// files may omit them.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Create a store rooted at `root`. The directory does not need to exist;
    /// a missing kind directory lists as empty.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Write a record to its canonical location, creating directories as needed.
    pub async fn put(&self, record: &Record) -> StorageResult<()> {
        let dir = self.root.join(&record.kind);
        tokio::fs::create_dir_all(&dir).await?;
        let body = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(dir.join(format!("{}.json", record.name)), body).await?;
        Ok(())
    }

    async fn read_record(&self, kind: &str, name: &str, path: &Path) -> StorageResult<Record> {
        let bytes = tokio::fs::read(path).await?;
        let mut value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Decode(format!("{}: {}", path.display(), e)))?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("kind".to_string(), kind.into());
            obj.insert("name".to_string(), name.into());
        }
        serde_json::from_value(value)
            .map_err(|e| StorageError::Decode(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn list(&self, kind: &str) -> StorageResult<Vec<Record>> {
        let dir = self.root.join(kind);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();

        let mut records = Vec::with_capacity(names.len());
        for name in names {
            let path = dir.join(format!("{}.json", name));
            records.push(self.read_record(kind, &name, &path).await?);
        }
        debug!(kind = %kind, count = records.len(), "listed records from disk");
        Ok(records)
    }

    async fn get(&self, kind: &str, name: &str) -> StorageResult<Option<Record>> {
        let path = self.root.join(kind).join(format!("{}.json", name));
        match self.read_record(kind, name, &path).await {
            Ok(record) => Ok(Some(record)),
            Err(StorageError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_traits::RELEASE_KIND;

    fn make_store() -> (tempfile::TempDir, FsObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn put_then_get_roundtrip() {
        let (_dir, store) = make_store();
        let record = Record::new(RELEASE_KIND, "v11.3.0")
            .with_spec(serde_json::json!({"components": [{"name": "app", "version": "1.0.0"}]}));
        store.put(&record).await.unwrap();

        let got = store.get(RELEASE_KIND, "v11.3.0").await.unwrap();
        assert_eq!(got, Some(record));
    }

    #[tokio::test]
    async fn list_is_sorted_by_name() {
        let (_dir, store) = make_store();
        for name in ["v12.0.0", "v11.3.0", "v11.4.0"] {
            store.put(&Record::new(RELEASE_KIND, name)).await.unwrap();
        }
        let names: Vec<_> = store
            .list(RELEASE_KIND)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["v11.3.0", "v11.4.0", "v12.0.0"]);
    }

    #[tokio::test]
    async fn missing_kind_lists_empty() {
        let (_dir, store) = make_store();
        assert!(store.list("Cluster").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let (_dir, store) = make_store();
        assert!(store.get(RELEASE_KIND, "v1.0.0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hand_written_file_without_kind_and_name() {
        let (dir, store) = make_store();
        let kind_dir = dir.path().join(RELEASE_KIND);
        std::fs::create_dir_all(&kind_dir).unwrap();
        std::fs::write(
            kind_dir.join("v13.0.0.json"),
            r#"{"annotations": {"release.giantswarm.io/ignore": "true"}}"#,
        )
        .unwrap();

        let record = store.get(RELEASE_KIND, "v13.0.0").await.unwrap().unwrap();
        assert_eq!(record.name, "v13.0.0");
        assert_eq!(record.kind, RELEASE_KIND);
        assert_eq!(
            record.annotations.get("release.giantswarm.io/ignore"),
            Some(&"true".to_string())
        );
    }

    #[tokio::test]
    async fn malformed_file_is_decode_error() {
        let (dir, store) = make_store();
        let kind_dir = dir.path().join(RELEASE_KIND);
        std::fs::create_dir_all(&kind_dir).unwrap();
        std::fs::write(kind_dir.join("broken.json"), "{not json").unwrap();

        let err = store.list(RELEASE_KIND).await.unwrap_err();
        assert!(matches!(err, StorageError::Decode(_)));
    }
}
