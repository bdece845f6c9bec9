//! Object storage backends.
//!
//! [`ObjectStore`] is the narrow seam the pipeline and the reaper talk to:
//! upload a file, list a prefix, delete a key. [`S3ObjectStore`] is the real
//! backend; [`MemoryStore`] backs the test suite and keeps the trait honest.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};

use crate::config::StorageConfig;
use crate::error::{Error, Result};

/// One entry observed when listing backups.
#[derive(Debug, Clone)]
pub struct RemoteObject {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Narrow capability interface over the storage collaborator.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the local file at `path` under `key`.
    async fn put(&self, key: &str, path: &Path) -> Result<()>;

    /// List every object whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>>;

    /// Remove a single object. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// S3-compatible backend.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client from static credentials, region and optional custom
    /// endpoint. A custom endpoint switches to path-style addressing, since
    /// MinIO-style deployments don't resolve virtual-hosted buckets.
    pub async fn connect(config: &StorageConfig) -> Self {
        let credentials = aws_sdk_s3::config::Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "Static",
        );

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if config.endpoint.is_some() {
            builder = builder.force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path).await.map_err(|e| {
            Error::upload(key, format!("cannot read '{}': {e}", path.display()))
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::upload(key, DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page =
                page.map_err(|e| Error::list(prefix, DisplayErrorContext(&e).to_string()))?;
            for entry in page.contents() {
                let Some(key) = entry.key() else { continue };
                objects.push(RemoteObject {
                    key: key.to_string(),
                    size: entry.size().unwrap_or(0).max(0) as u64,
                    last_modified: entry
                        .last_modified()
                        .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
                });
            }
        }
        Ok(objects)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::delete(key, DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}

/// In-memory backend.
///
/// Non-persistent; a `BTreeMap` keeps listings in the same lexicographic
/// order S3 reports. Used throughout the test suite to exercise the pipeline
/// and the reaper without network access.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly, bypassing `put`.
    pub fn insert(&self, key: impl Into<String>, data: Vec<u8>) {
        self.lock().insert(key.into(), data);
    }

    /// Fetch an object's payload.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).cloned()
    }

    /// All keys currently in the store.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, path: &Path) -> Result<()> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| Error::upload(key, format!("cannot read '{}': {e}", path.display())))?;
        self.lock().insert(key.to_string(), data);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        Ok(self
            .lock()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, data)| RemoteObject {
                key: key.clone(),
                size: data.len() as u64,
                last_modified: None,
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}
