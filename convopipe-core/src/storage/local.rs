//! Local filesystem backend
//!
//! Maps keys directly to paths below a base directory:
//! `landing/date=2026-01-03/input.jsonl` → `{base}/landing/date=2026-01-03/input.jsonl`.

use super::{key_segments, render_json, render_lines, Lines, ObjectRef, Storage};
use crate::error::{Error, Result};
use crate::types::StorageKind;
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Storage rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    base: PathBuf,
}

impl LocalStore {
    /// Open (and create if needed) the base directory.
    pub fn new(base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref();
        fs::create_dir_all(base)?;
        let base = base.canonicalize()?;
        Ok(Self { base })
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.base.clone();
        for segment in key_segments(key)? {
            path.push(segment);
        }
        Ok(path)
    }

    /// Key for a file below the base directory, always `/`-separated.
    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    fn object_ref(&self, path: &Path) -> Option<ObjectRef> {
        let key = self.key_for(path)?;
        let metadata = fs::metadata(path).ok();
        Some(ObjectRef {
            key,
            size: metadata.as_ref().map(|m| m.len()).unwrap_or(0),
            last_modified: metadata
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from),
        })
    }

    fn open_file(&self, key: &str) -> Result<File> {
        let path = self.resolve(key)?;
        if !path.is_file() {
            return Err(Error::NotFound(key.to_string()));
        }
        File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(key.to_string()),
            _ => Error::Io(e),
        })
    }

    fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl Storage for LocalStore {
    fn kind(&self) -> StorageKind {
        StorageKind::Local
    }

    fn list(&self, prefix: &str) -> Result<Vec<ObjectRef>> {
        if prefix.is_empty() {
            return Ok(vec![]);
        }
        let root = self.resolve(prefix)?;

        let mut objects = Vec::new();
        if root.is_file() {
            objects.extend(self.object_ref(&root));
        } else if root.is_dir() {
            let pattern = format!(
                "{}/**/*",
                glob::Pattern::escape(&root.to_string_lossy())
            );
            let entries = glob::glob(&pattern)
                .map_err(|e| Error::Storage(format!("invalid glob pattern: {}", e)))?;
            for entry in entries.flatten() {
                if entry.is_file() {
                    objects.extend(self.object_ref(&entry));
                }
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn open_text(&self, key: &str) -> Result<Lines<'_>> {
        let reader = BufReader::new(self.open_file(key)?);
        Ok(Box::new(reader.lines().map(|line| line.map_err(Error::Io))))
    }

    fn read_to_string(&self, key: &str) -> Result<String> {
        let mut file = self.open_file(key)?;
        let mut content = String::new();
        std::io::Read::read_to_string(&mut file, &mut content)?;
        Ok(content)
    }

    fn write_json(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let path = self.resolve(key)?;
        Self::ensure_parent(&path)?;
        fs::write(&path, render_json(value)?)?;
        Ok(())
    }

    fn write_lines(&self, key: &str, lines: &[String]) -> Result<()> {
        let path = self.resolve(key)?;
        Self::ensure_parent(&path)?;
        fs::write(&path, render_lines(lines))?;
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.resolve(key)?.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalStore) {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::new(temp.path().join("data")).unwrap();
        (temp, store)
    }

    #[test]
    fn test_new_creates_base_dir() {
        let (temp, store) = store();
        assert!(temp.path().join("data").is_dir());
        assert_eq!(store.kind(), StorageKind::Local);
    }

    #[test]
    fn test_list_sorted_and_recursive() {
        let (_temp, store) = store();
        store
            .write_lines("landing/date=2026-01-03/b.jsonl", &["{}".to_string()])
            .unwrap();
        store
            .write_lines("landing/date=2026-01-03/a.jsonl", &["{}".to_string()])
            .unwrap();
        store
            .write_lines("landing/date=2026-01-03/nested/c.jsonl", &[])
            .unwrap();
        store
            .write_lines("landing/date=2026-01-04/x.jsonl", &[])
            .unwrap();

        let keys: Vec<String> = store
            .list("landing/date=2026-01-03/")
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(
            keys,
            vec![
                "landing/date=2026-01-03/a.jsonl",
                "landing/date=2026-01-03/b.jsonl",
                "landing/date=2026-01-03/nested/c.jsonl",
            ]
        );

        // Trailing slash is optional
        assert_eq!(store.list("landing/date=2026-01-03").unwrap().len(), 3);
    }

    #[test]
    fn test_list_edge_cases() {
        let (_temp, store) = store();
        store.write_lines("reports/r.json", &["x".to_string()]).unwrap();

        assert!(store.list("").unwrap().is_empty());
        assert!(store.list("missing/").unwrap().is_empty());

        let exact = store.list("reports/r.json").unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].key, "reports/r.json");
        assert_eq!(exact[0].size, 2);
        assert!(exact[0].last_modified.is_some());
    }

    #[test]
    fn test_open_text_streams_lines() {
        let (_temp, store) = store();
        store
            .write_lines("f.jsonl", &["one".to_string(), "two\n".to_string()])
            .unwrap();

        let lines: Vec<String> = store
            .open_text("f.jsonl")
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(lines, vec!["one", "two"]);

        // Each call restarts from the beginning
        assert_eq!(store.open_text("f.jsonl").unwrap().count(), 2);
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let (_temp, store) = store();
        assert!(matches!(store.open_text("nope.jsonl"), Err(Error::NotFound(_))));
        assert!(store.read_to_string("nope.json").unwrap_err().is_not_found());
        assert!(!store.exists("nope.json").unwrap());
    }

    #[test]
    fn test_write_json_overwrites() {
        let (_temp, store) = store();
        let key = "curated/metrics_daily/date=2026-01-03/metrics.json";

        store
            .write_json(key, &serde_json::json!({"total": 1}))
            .unwrap();
        store
            .write_json(key, &serde_json::json!({"total": 2}))
            .unwrap();

        assert!(store.exists(key).unwrap());
        let value: serde_json::Value =
            serde_json::from_str(&store.read_to_string(key).unwrap()).unwrap();
        assert_eq!(value["total"], 2);
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let (_temp, store) = store();
        assert!(matches!(
            store.write_lines("../outside.txt", &[]),
            Err(Error::Storage(_))
        ));
    }
}
