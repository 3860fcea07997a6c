//! Represents an object stored in the remote bucket.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

use crate::{
    errors::{StorageError, StorageResult},
    services::remote_store::RemoteStore,
};

/// Metadata the remote store reports for one object.
///
/// The struct stores metadata only, not the content bytes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Fully resolved object key, including the bucket prefix.
    pub key: String,

    /// Size in bytes.
    pub size: u64,

    /// Timestamp when object was last modified.
    pub last_modified: DateTime<Utc>,

    /// Provider entity tag, if the backend reports one.
    pub e_tag: Option<String>,
}

/// Handle to a single remote object.
///
/// Handles are created per operation and are not cached; the object may have
/// changed or vanished by the time a method is called.
#[derive(Clone)]
pub struct StorageObject {
    store: Arc<dyn RemoteStore>,
    info: ObjectInfo,
}

impl StorageObject {
    pub fn new(store: Arc<dyn RemoteStore>, info: ObjectInfo) -> Self {
        Self { store, info }
    }

    /// Fully resolved object key.
    pub fn name(&self) -> &str {
        &self.info.key
    }

    pub fn info(&self) -> &ObjectInfo {
        &self.info
    }

    pub fn size(&self) -> u64 {
        self.info.size
    }

    pub async fn exists(&self) -> StorageResult<bool> {
        self.store.exists(&self.info.key).await
    }

    /// Download the full content.
    ///
    /// Returns `ObjectNotFound` if the object was removed after this handle
    /// was created.
    pub async fn download(&self) -> StorageResult<Bytes> {
        self.store
            .get(&self.info.key)
            .await?
            .ok_or_else(|| StorageError::ObjectNotFound(self.info.key.clone()))
    }

    /// Copy to an already resolved key and return a handle to the copy.
    pub async fn copy_to(&self, target_key: &str) -> StorageResult<Option<StorageObject>> {
        self.store.copy(&self.info.key, target_key).await?;
        self.reopen(target_key).await
    }

    /// Move to an already resolved key; this handle's key no longer exists afterward.
    pub async fn rename_to(&self, target_key: &str) -> StorageResult<Option<StorageObject>> {
        self.store.rename(&self.info.key, target_key).await?;
        self.reopen(target_key).await
    }

    pub async fn delete(&self) -> StorageResult<bool> {
        self.store.delete(&self.info.key).await
    }

    async fn reopen(&self, key: &str) -> StorageResult<Option<StorageObject>> {
        Ok(self
            .store
            .head(key)
            .await?
            .map(|info| StorageObject::new(self.store.clone(), info)))
    }
}

impl fmt::Debug for StorageObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageObject")
            .field("info", &self.info)
            .finish()
    }
}
