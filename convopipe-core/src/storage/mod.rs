//! Storage abstraction over a hierarchical key-value object store
//!
//! Every component reads and writes through the [`Storage`] trait, so the
//! pipeline never knows which backend it runs against.
//!
//! ## Keys
//!
//! Keys are `/`-separated paths such as `landing/date=2026-01-03/input01.jsonl`.
//! Prefixes match per whole segment: a prefix names either a single object or
//! a "directory" whose objects are all returned, recursively. A trailing `/`
//! is optional and an empty prefix matches nothing.
//!
//! ## Backends
//!
//! | Backend | Module | Maps keys to |
//! |---------|--------|--------------|
//! | Local | [`local`] | Files below a base directory |
//! | S3 | [`s3`] | Objects in one bucket |

mod local;
mod s3;

pub use local::LocalStore;
pub use s3::S3Store;

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::types::StorageKind;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Reference to one stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub key: String,
    /// Size in bytes
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Lazy line sequence returned by [`Storage::open_text`].
///
/// Lines carry no terminator. An `Err` item means reading failed part-way.
pub type Lines<'a> = Box<dyn Iterator<Item = Result<String>> + Send + 'a>;

/// Uniform interface over the object store backends.
///
/// Both implementations must behave identically: same sort order, same
/// not-found semantics, same overwrite semantics.
pub trait Storage: Send + Sync {
    /// Backend identifier recorded in run reports
    fn kind(&self) -> StorageKind;

    /// Objects at or below `prefix`, sorted by key ascending.
    fn list(&self, prefix: &str) -> Result<Vec<ObjectRef>>;

    /// Stream an object's lines. Fails with [`Error::NotFound`] if absent.
    fn open_text(&self, key: &str) -> Result<Lines<'_>>;

    /// Read a whole object. Fails with [`Error::NotFound`] if absent.
    fn read_to_string(&self, key: &str) -> Result<String>;

    /// Write `value` as pretty JSON, replacing any existing object.
    fn write_json(&self, key: &str, value: &serde_json::Value) -> Result<()>;

    /// Write lines, each terminated by exactly one `\n`, replacing any existing object.
    fn write_lines(&self, key: &str, lines: &[String]) -> Result<()>;

    /// Whether an object exists at `key`
    fn exists(&self, key: &str) -> Result<bool>;
}

/// Serialize `value` and write it with [`Storage::write_json`].
pub fn write_serialized<T: Serialize + ?Sized>(
    storage: &dyn Storage,
    key: &str,
    value: &T,
) -> Result<()> {
    let value = serde_json::to_value(value)?;
    storage.write_json(key, &value)
}

/// Create the backend selected by configuration.
pub fn open(config: &StorageConfig) -> Result<Box<dyn Storage>> {
    config.validate()?;

    match config.backend {
        StorageKind::Local => {
            let store = LocalStore::new(&config.base_path)?;
            tracing::info!(base_path = %store.base_path().display(), "Local storage initialized");
            Ok(Box::new(store))
        }
        StorageKind::S3 => {
            let bucket = config
                .bucket
                .as_deref()
                .ok_or_else(|| Error::Config("storage.bucket is required".to_string()))?;
            let store = S3Store::new(bucket, &config.region)?;
            tracing::info!(bucket = %store.bucket(), region = %config.region, "S3 storage initialized");
            Ok(Box::new(store))
        }
    }
}

/// Split a key into its segments, rejecting keys that could escape the namespace.
///
/// A single trailing `/` is tolerated so prefixes can be written either way.
pub(crate) fn key_segments(key: &str) -> Result<Vec<&str>> {
    let trimmed = key.strip_suffix('/').unwrap_or(key);
    if trimmed.is_empty() || trimmed.starts_with('/') {
        return Err(Error::Storage(format!("invalid key: {:?}", key)));
    }

    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == ".." || s.contains('\\'))
    {
        return Err(Error::Storage(format!("invalid key: {:?}", key)));
    }
    Ok(segments)
}

/// Pretty JSON bytes, non-ASCII preserved.
pub(crate) fn render_json(value: &serde_json::Value) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(value)?)
}

/// Join lines, adding a `\n` to any line that lacks one.
pub(crate) fn render_lines(lines: &[String]) -> String {
    let mut out = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        out.push_str(line);
        if !line.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}
