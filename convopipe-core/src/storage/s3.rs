//! S3 backend
//!
//! Keys map one-to-one to object keys in a single bucket. Credentials come
//! from the standard AWS environment (`AWS_ACCESS_KEY_ID`, profiles, ...).
//!
//! The [`Storage`] trait is blocking, so the store owns a current-thread
//! runtime and drives each `object_store` call to completion.

use super::{key_segments, render_json, render_lines, Lines, ObjectRef, Storage};
use crate::error::{Error, Result};
use crate::types::StorageKind;
use futures_util::TryStreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore, PutPayload};

/// Storage backed by one S3 bucket.
pub struct S3Store {
    bucket: String,
    store: AmazonS3,
    runtime: tokio::runtime::Runtime,
}

impl S3Store {
    pub fn new(bucket: &str, region: &str) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Storage(format!("failed to create runtime: {}", e)))?;

        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(region)
            .build()?;

        Ok(Self {
            bucket: bucket.to_string(),
            store,
            runtime,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_path(key: &str) -> Result<ObjectPath> {
        let segments = key_segments(key)?;
        ObjectPath::parse(segments.join("/"))
            .map_err(|e| Error::Storage(format!("invalid key {:?}: {}", key, e)))
    }

    fn object_ref(meta: ObjectMeta) -> ObjectRef {
        ObjectRef {
            key: meta.location.to_string(),
            size: meta.size as u64,
            last_modified: Some(meta.last_modified),
        }
    }

    fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let path = Self::object_path(key)?;
        self.runtime.block_on(self.fetch(&path, key))
    }

    async fn fetch(&self, path: &ObjectPath, key: &str) -> Result<Vec<u8>> {
        let result = self.store.get(path).await.map_err(|e| not_found(e, key))?;
        let bytes = result.bytes().await.map_err(|e| not_found(e, key))?;
        Ok(bytes.to_vec())
    }

    /// Objects below `path`, or the object at `path` when nothing is below it.
    async fn list_at(&self, path: &ObjectPath) -> Result<Vec<ObjectRef>> {
        let below: Vec<ObjectMeta> = self.store.list(Some(path)).try_collect().await?;
        if !below.is_empty() {
            return Ok(below.into_iter().map(Self::object_ref).collect());
        }

        match self.store.head(path).await {
            Ok(meta) => Ok(vec![Self::object_ref(meta)]),
            Err(object_store::Error::NotFound { .. }) => Ok(vec![]),
            Err(e) => Err(e.into()),
        }
    }

    fn put_bytes(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = Self::object_path(key)?;
        self.runtime
            .block_on(self.store.put(&path, PutPayload::from(bytes)))?;
        Ok(())
    }
}

/// Map the store's missing-object error onto [`Error::NotFound`].
fn not_found(error: object_store::Error, key: &str) -> Error {
    match error {
        object_store::Error::NotFound { .. } => Error::NotFound(key.to_string()),
        other => Error::ObjectStore(other),
    }
}

fn decode_utf8(bytes: Vec<u8>, key: &str) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| Error::Storage(format!("object {} is not valid UTF-8: {}", key, e)))
}

impl Storage for S3Store {
    fn kind(&self) -> StorageKind {
        StorageKind::S3
    }

    fn list(&self, prefix: &str) -> Result<Vec<ObjectRef>> {
        if prefix.is_empty() {
            return Ok(vec![]);
        }
        let path = Self::object_path(prefix)?;

        let mut objects = self.runtime.block_on(self.list_at(&path))?;

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn open_text(&self, key: &str) -> Result<Lines<'_>> {
        let text = decode_utf8(self.get_bytes(key)?, key)?;
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        Ok(Box::new(lines.into_iter().map(Ok::<String, Error>)))
    }

    fn read_to_string(&self, key: &str) -> Result<String> {
        decode_utf8(self.get_bytes(key)?, key)
    }

    fn write_json(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.put_bytes(key, render_json(value)?)
    }

    fn write_lines(&self, key: &str, lines: &[String]) -> Result<()> {
        self.put_bytes(key, render_lines(lines).into_bytes())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let path = Self::object_path(key)?;
        match self.runtime.block_on(self.store.head(&path)) {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
