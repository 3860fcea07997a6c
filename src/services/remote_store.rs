//! The remote object store seam.
//!
//! [`RemoteStore`] is the only interface the adapter talks to. The production
//! implementation wraps an [`object_store::ObjectStore`]; which one is picked
//! by [`build_store`] from the configured [`StorageKind`], once at startup.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use object_store::{
    ObjectMeta, ObjectStore, PutPayload, gcp::GoogleCloudStorageBuilder, local::LocalFileSystem,
    path::Path as ObjectPath,
};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::{AclPolicy, ModuleConfig, StorageKind},
    errors::{ConfigError, StorageResult},
    models::object::ObjectInfo,
    services::gcs_acl::{AclClient, DEFAULT_ENDPOINT, GcsAclClient},
};

/// Object store operations the adapter relies on.
///
/// Absence is reported as `Ok(None)` / `Ok(false)`; errors are reserved for
/// transport and provider failures.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn head(&self, key: &str) -> StorageResult<Option<ObjectInfo>>;

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Up to `limit` objects under `prefix` whose key sorts strictly after
    /// `offset`, in lexicographic key order.
    async fn list(
        &self,
        prefix: Option<&str>,
        offset: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<ObjectInfo>>;

    async fn put(&self, key: &str, data: Bytes, acl: Option<AclPolicy>)
    -> StorageResult<ObjectInfo>;

    async fn copy(&self, from: &str, to: &str) -> StorageResult<()>;

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Returns `false` if there was nothing to delete.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.head(key).await?.is_some())
    }
}

/// [`RemoteStore`] over any `object_store` backend.
#[derive(Clone)]
pub struct ObjectStoreBackend {
    inner: Arc<dyn ObjectStore>,
    acl: Option<Arc<dyn AclClient>>,
    ordering: ListOrdering,
}

#[derive(Clone)]
enum ListOrdering {
    /// The store lists in key order (Cloud Storage, in-memory).
    Sorted,
    /// The store lists in arbitrary order (local disk). A sorted snapshot is
    /// taken on the first page and reused while paging through it.
    Unsorted(Arc<Mutex<Option<Snapshot>>>),
}

struct Snapshot {
    prefix: Option<String>,
    infos: Arc<Vec<ObjectInfo>>,
}

impl ObjectStoreBackend {
    /// Backend over a store that lists in key order.
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            acl: None,
            ordering: ListOrdering::Sorted,
        }
    }

    /// Backend over a store whose listings come back unordered.
    pub fn unordered(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            acl: None,
            ordering: ListOrdering::Unsorted(Arc::default()),
        }
    }

    /// Apply the predefined ACL of every upload through `client`.
    pub fn with_acl_client(mut self, client: Arc<dyn AclClient>) -> Self {
        self.acl = Some(client);
        self
    }

    async fn snapshot(
        &self,
        cache: &Mutex<Option<Snapshot>>,
        prefix: Option<&ObjectPath>,
        resume: bool,
    ) -> StorageResult<Arc<Vec<ObjectInfo>>> {
        let wanted = prefix.map(ObjectPath::to_string);
        if resume {
            if let Ok(guard) = cache.lock() {
                if let Some(snapshot) = guard.as_ref().filter(|s| s.prefix == wanted) {
                    return Ok(snapshot.infos.clone());
                }
            }
        }

        let metas: Vec<ObjectMeta> = self.inner.list(prefix).try_collect().await?;
        let mut infos: Vec<ObjectInfo> = metas.into_iter().map(to_info).collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        let infos = Arc::new(infos);

        if let Ok(mut guard) = cache.lock() {
            *guard = Some(Snapshot {
                prefix: wanted,
                infos: infos.clone(),
            });
        }
        Ok(infos)
    }
}

fn to_info(meta: ObjectMeta) -> ObjectInfo {
    ObjectInfo {
        key: meta.location.to_string(),
        size: meta.size,
        last_modified: meta.last_modified,
        e_tag: meta.e_tag,
    }
}

#[async_trait]
impl RemoteStore for ObjectStoreBackend {
    async fn head(&self, key: &str) -> StorageResult<Option<ObjectInfo>> {
        match self.inner.head(&ObjectPath::from(key)).await {
            Ok(meta) => Ok(Some(to_info(meta))),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let result = match self.inner.get(&ObjectPath::from(key)).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(result.bytes().await?))
    }

    async fn list(
        &self,
        prefix: Option<&str>,
        offset: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<ObjectInfo>> {
        let prefix = prefix.filter(|p| !p.is_empty()).map(ObjectPath::from);

        match &self.ordering {
            ListOrdering::Sorted => {
                let stream = match offset {
                    Some(offset) => self
                        .inner
                        .list_with_offset(prefix.as_ref(), &ObjectPath::from(offset)),
                    None => self.inner.list(prefix.as_ref()),
                };
                let metas: Vec<ObjectMeta> = stream.take(limit).try_collect().await?;
                Ok(metas.into_iter().map(to_info).collect())
            }
            ListOrdering::Unsorted(cache) => {
                let infos = self
                    .snapshot(cache, prefix.as_ref(), offset.is_some())
                    .await?;
                let start = match offset {
                    Some(offset) => infos.partition_point(|info| info.key.as_str() <= offset),
                    None => 0,
                };
                Ok(infos[start..].iter().take(limit).cloned().collect())
            }
        }
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        acl: Option<AclPolicy>,
    ) -> StorageResult<ObjectInfo> {
        let size = data.len() as u64;
        let result = self
            .inner
            .put(&ObjectPath::from(key), PutPayload::from(data))
            .await?;
        debug!(key, size, "uploaded object");

        if let (Some(client), Some(acl)) = (&self.acl, acl) {
            if let Err(err) = client.apply(key, acl).await {
                warn!(key, %acl, error = %err, "uploaded object but could not apply acl");
                return Err(err);
            }
        }

        Ok(ObjectInfo {
            key: key.to_string(),
            size,
            last_modified: Utc::now(),
            e_tag: result.e_tag,
        })
    }

    async fn copy(&self, from: &str, to: &str) -> StorageResult<()> {
        self.inner
            .copy(&ObjectPath::from(from), &ObjectPath::from(to))
            .await?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        self.inner
            .rename(&ObjectPath::from(from), &ObjectPath::from(to))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        match self.inner.delete(&ObjectPath::from(key)).await {
            Ok(()) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

/// Build the store for `kind`.
///
/// `Filesystem` is rooted at the media directory; `ObjectStore` is the
/// configured Cloud Storage bucket and requires valid credentials.
pub fn build_store(
    kind: StorageKind,
    config: &ModuleConfig,
) -> Result<Arc<dyn RemoteStore>, ConfigError> {
    match kind {
        StorageKind::Filesystem => {
            let local =
                LocalFileSystem::new_with_prefix(&config.media_dir).map_err(ConfigError::Client)?;
            debug!(media_dir = %config.media_dir.display(), "using local filesystem storage");
            Ok(Arc::new(ObjectStoreBackend::unordered(Arc::new(local))))
        }
        StorageKind::ObjectStore => {
            let key_path = config.validate()?;
            let gcs = GoogleCloudStorageBuilder::new()
                .with_bucket_name(config.bucket_name.trim())
                .with_service_account_path(key_path.to_string_lossy())
                .build()
                .map_err(ConfigError::Client)?;
            debug!(
                bucket = %config.bucket_name,
                project = %config.project_id,
                region = %config.bucket_region,
                "using google cloud storage"
            );

            let endpoint = Url::parse(DEFAULT_ENDPOINT).map_err(|err| ConfigError::InvalidValue {
                name: "storage endpoint",
                value: err.to_string(),
            })?;
            let acl = GcsAclClient::new(
                endpoint,
                config.bucket_name.trim(),
                gcs.credentials().clone(),
            )?;
            Ok(Arc::new(
                ObjectStoreBackend::new(Arc::new(gcs)).with_acl_client(Arc::new(acl)),
            ))
        }
    }
}
