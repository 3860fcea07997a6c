//! src/services/object_management.rs
//!
//! The adapter between media paths and the remote bucket. It owns the store
//! handle, applies the bucket prefix to every key, backfills misses from the
//! fallback origin and keeps the miss cache honest.

use base64::{Engine as _, engine::general_purpose};
use std::{
    collections::BTreeSet,
    path::Path,
    sync::Arc,
};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::{
    config::{AclPolicy, ModuleConfig},
    errors::StorageResult,
    models::{
        listing::{ListOptions, ObjectPage},
        object::StorageObject,
        upload::{UploadOptions, UploadSource},
    },
    services::{
        fallback::FallbackFetcher,
        miss_cache::MissCache,
        path_resolver::{self, PathResolver},
        remote_store::{RemoteStore, build_store},
    },
};

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Clone)]
pub struct StorageObjectManagement {
    store: Arc<dyn RemoteStore>,
    resolver: PathResolver,
    config: Arc<ModuleConfig>,
    fallback: Option<FallbackFetcher>,
    miss_cache: Option<MissCache>,
}

impl StorageObjectManagement {
    /// Build the adapter and its store from configuration.
    ///
    /// Fails with a configuration error when credentials or the bucket name
    /// are missing; there is no degraded mode.
    pub fn new(config: ModuleConfig) -> StorageResult<Self> {
        let store = build_store(config.storage_kind, &config)?;
        Self::with_store(config, store)
    }

    /// Build the adapter around an already constructed store.
    pub fn with_store(config: ModuleConfig, store: Arc<dyn RemoteStore>) -> StorageResult<Self> {
        let fallback = match config.fallback_base() {
            Some(base) => Some(FallbackFetcher::new(base.clone(), config.fallback_timeout)?),
            None => None,
        };
        let resolver = PathResolver::new(&config.bucket_prefix);
        info!(
            bucket = %config.bucket_name,
            prefix = resolver.prefix().unwrap_or(""),
            fallback = fallback.as_ref().map(|f| f.base().as_str()).unwrap_or("none"),
            "storage adapter initialized"
        );

        Ok(Self {
            store,
            resolver,
            config: Arc::new(config),
            fallback,
            miss_cache: None,
        })
    }

    pub fn with_miss_cache(mut self, cache: MissCache) -> Self {
        self.miss_cache = Some(cache);
        self
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn RemoteStore> {
        self.store.clone()
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn prefix(&self) -> Option<&str> {
        self.resolver.prefix()
    }

    pub fn has_prefix(&self) -> bool {
        self.resolver.has_prefix()
    }

    pub fn object_acl_policy(&self) -> AclPolicy {
        self.config.bucket_acl_policy
    }

    pub fn media_base_dir(&self) -> &Path {
        &self.config.media_dir
    }

    /// Fully resolved (prefixed) key for `path`.
    pub fn get_object_path(&self, path: &str) -> String {
        self.resolver.resolve(path)
    }

    fn object_key(&self, path: &str) -> StorageResult<String> {
        let key = self.resolver.resolve(path);
        path_resolver::ensure_key_safe(&key)?;
        Ok(key)
    }

    /// Fetch a handle to the object at `path`.
    ///
    /// On a bucket miss with a fallback origin configured, the object is
    /// fetched from the origin, uploaded with the configured ACL and returned.
    /// Paths with a `tmp` segment are never backfilled.
    pub async fn get_object(&self, path: &str) -> StorageResult<Option<StorageObject>> {
        let key = self.object_key(path)?;

        if self.cached_miss(&key).await {
            debug!(%key, "object lookup answered by miss cache");
            return Ok(None);
        }

        if let Some(info) = self.store.head(&key).await? {
            return Ok(Some(StorageObject::new(self.store.clone(), info)));
        }

        let staging = path_resolver::has_tmp_segment(&self.resolver.strip_prefix(&key));
        if let Some(fallback) = self.fallback.as_ref().filter(|_| !staging) {
            match self.backfill(fallback, &key).await {
                Backfill::Restored(object) => return Ok(Some(object)),
                // the origin has it but the bucket refused it; do not cache as a miss
                Backfill::UploadFailed => return Ok(None),
                Backfill::Missing => {}
            }
        }

        self.record_miss(&key).await;
        Ok(None)
    }

    async fn backfill(&self, fallback: &FallbackFetcher, key: &str) -> Backfill {
        let relative = self.resolver.strip_prefix(key);
        let Some(body) = fallback.fetch(&relative).await else {
            return Backfill::Missing;
        };

        match self
            .store
            .put(key, body, Some(self.config.bucket_acl_policy))
            .await
        {
            Ok(info) => {
                info!(%key, size = info.size, "backfilled object from fallback origin");
                Backfill::Restored(StorageObject::new(self.store.clone(), info))
            }
            Err(err) => {
                warn!(%key, error = %err, "failed to upload fallback object into bucket");
                Backfill::UploadFailed
            }
        }
    }

    /// List one page of objects.
    ///
    /// `options.prefix` is resolved under the bucket prefix. With a delimiter,
    /// keys below the next delimiter are folded into `prefixes`.
    pub async fn get_objects(&self, options: ListOptions) -> StorageResult<ObjectPage> {
        let scope = match options.prefix.as_deref() {
            Some(prefix) => Some(self.resolver.resolve(prefix)),
            None => self.resolver.prefix().map(str::to_string),
        }
        .filter(|scope| !scope.is_empty());

        let offset = options.page_token.as_deref().map(decode_page_token);
        let max_results = options
            .max_results
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, DEFAULT_PAGE_SIZE);

        let mut entries = self
            .store
            .list(scope.as_deref(), offset.as_deref(), max_results + 1)
            .await?;

        let mut next_page_token = None;
        if entries.len() > max_results {
            entries.truncate(max_results);
            next_page_token = entries.last().map(|last| encode_page_token(&last.key));
        }

        let requested_prefix = scope.map(|scope| format!("{}{}", scope, path_resolver::SEPARATOR));
        let mut objects = Vec::new();
        let mut prefixes = BTreeSet::new();
        for info in entries {
            if let Some(delim) = options.delimiter.as_deref().filter(|d| !d.is_empty()) {
                if let Some(prefix) =
                    compute_common_prefix(&info.key, requested_prefix.as_deref(), delim)
                {
                    prefixes.insert(prefix);
                    continue;
                }
            }
            objects.push(StorageObject::new(self.store.clone(), info));
        }

        debug!(
            objects = objects.len(),
            prefixes = prefixes.len(),
            truncated = next_page_token.is_some(),
            "listed objects"
        );

        Ok(ObjectPage {
            objects,
            prefixes: prefixes.into_iter().collect(),
            next_page_token,
        })
    }

    /// Walk every page of a listing and collect all objects.
    pub async fn get_all_objects(
        &self,
        mut options: ListOptions,
    ) -> StorageResult<Vec<StorageObject>> {
        let mut objects = Vec::new();
        loop {
            let page = self.get_objects(options.clone()).await?;
            objects.extend(page.objects);
            match page.next_page_token {
                Some(token) => options.page_token = Some(token),
                None => return Ok(objects),
            }
        }
    }

    /// Like [`get_object`](Self::get_object), but paths without a file
    /// extension are treated as missing without asking the bucket.
    pub async fn find_object(&self, path: &str) -> StorageResult<Option<StorageObject>> {
        if !path_resolver::has_extension(path) {
            debug!(path, "skipping lookup for path without extension");
            return Ok(None);
        }
        self.get_object(path).await
    }

    pub async fn object_exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.find_object(path).await?.is_some())
    }

    /// Whether the bucket holds `path` right now. Asks the store directly:
    /// no extension check, no miss cache, no fallback.
    pub async fn object_stored(&self, path: &str) -> StorageResult<bool> {
        let key = self.object_key(path)?;
        self.store.exists(&key).await
    }

    /// Upload bytes or a local file.
    ///
    /// The destination is `options.name` (prefixed unless already
    /// prefix-qualified) or the file's path relative to the media directory.
    /// Returns `None` without touching the bucket when the source is not a
    /// regular file, no name can be derived, or the name has a `tmp` segment.
    pub async fn upload_object(
        &self,
        source: UploadSource,
        options: UploadOptions,
    ) -> StorageResult<Option<StorageObject>> {
        if let UploadSource::File(path) = &source {
            if !is_regular_file(path).await {
                debug!(path = %path.display(), "upload source is not a regular file");
                return Ok(None);
            }
        }

        let name = match (options.name, &source) {
            (Some(name), _) => name,
            (None, UploadSource::File(path)) => match self.media_relative_name(path).await {
                Some(name) => name,
                None => {
                    debug!(path = %path.display(), "upload source is outside the media directory");
                    return Ok(None);
                }
            },
            (None, UploadSource::Bytes(_)) => {
                warn!("refusing to upload bytes without an object name");
                return Ok(None);
            }
        };

        let key = self.object_key(&name)?;
        if path_resolver::has_tmp_segment(&self.resolver.strip_prefix(&key)) {
            debug!(%key, "refusing to upload staging artifact");
            return Ok(None);
        }

        let data = match source {
            UploadSource::Bytes(bytes) => bytes,
            UploadSource::File(path) => fs::read(&path).await?.into(),
        };
        let acl = options
            .predefined_acl
            .unwrap_or(self.config.bucket_acl_policy);

        let info = self.store.put(&key, data, Some(acl)).await?;
        self.forget_miss(&key).await;
        info!(%key, size = info.size, %acl, "uploaded object");

        Ok(Some(StorageObject::new(self.store.clone(), info)))
    }

    async fn media_relative_name(&self, path: &Path) -> Option<String> {
        let real = fs::canonicalize(path).await.ok()?;
        let media = fs::canonicalize(&self.config.media_dir).await.ok()?;
        let relative = real.strip_prefix(&media).ok()?;
        let name = path_resolver::normalize(&relative.to_string_lossy());
        (!name.is_empty()).then_some(name)
    }

    /// Copy `source` to `target`; `None` if the source does not exist.
    pub async fn copy_object(
        &self,
        source: &str,
        target: &str,
    ) -> StorageResult<Option<StorageObject>> {
        let Some(object) = self.get_object(source).await? else {
            return Ok(None);
        };
        let target_key = self.object_key(target)?;

        let copied = object.copy_to(&target_key).await?;
        self.forget_miss(&target_key).await;
        info!(source = object.name(), target = %target_key, "copied object");
        Ok(copied)
    }

    /// Move `source` to `target`; `None` if the source does not exist.
    pub async fn rename_object(
        &self,
        source: &str,
        target: &str,
    ) -> StorageResult<Option<StorageObject>> {
        let Some(object) = self.get_object(source).await? else {
            return Ok(None);
        };
        let target_key = self.object_key(target)?;

        let renamed = object.rename_to(&target_key).await?;
        self.forget_miss(&target_key).await;
        info!(source = object.name(), target = %target_key, "renamed object");
        Ok(renamed)
    }

    /// Delete the object at `path`.
    ///
    /// Returns `false` if there was no object. Otherwise returns whether the
    /// object is really gone according to a second existence check. Both
    /// checks ask the bucket directly so the fallback origin never resurrects
    /// the object mid-delete.
    pub async fn delete_object(&self, path: &str) -> StorageResult<bool> {
        let key = self.object_key(path)?;
        let Some(info) = self.store.head(&key).await? else {
            return Ok(false);
        };

        StorageObject::new(self.store.clone(), info).delete().await?;
        let gone = !self.store.exists(&key).await?;
        if gone {
            info!(%key, "deleted object");
        } else {
            warn!(%key, "object still exists after delete");
        }
        Ok(gone)
    }

    /// Delete every object matched by `options`; returns how many were deleted.
    pub async fn delete_all_objects(&self, options: ListOptions) -> StorageResult<usize> {
        let options = ListOptions {
            delimiter: None,
            page_token: None,
            ..options
        };
        let objects = self.get_all_objects(options).await?;
        if objects.is_empty() {
            debug!("nothing to delete");
            return Ok(0);
        }

        let mut deleted = 0;
        for object in &objects {
            if object.delete().await? {
                deleted += 1;
            }
        }
        info!(deleted, "deleted objects");
        Ok(deleted)
    }

    async fn cached_miss(&self, key: &str) -> bool {
        let Some(cache) = &self.miss_cache else {
            return false;
        };
        match cache.is_miss(key).await {
            Ok(hit) => hit,
            Err(err) => {
                warn!(%key, error = %err, "miss cache lookup failed");
                false
            }
        }
    }

    async fn record_miss(&self, key: &str) {
        if let Some(cache) = &self.miss_cache {
            if let Err(err) = cache.record(key).await {
                warn!(%key, error = %err, "failed to record object miss");
            }
        }
    }

    async fn forget_miss(&self, key: &str) {
        if let Some(cache) = &self.miss_cache {
            if let Err(err) = cache.invalidate(key).await {
                warn!(%key, error = %err, "failed to invalidate object miss");
            }
        }
    }
}

enum Backfill {
    Restored(StorageObject),
    UploadFailed,
    Missing,
}

async fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

fn encode_page_token(key: &str) -> String {
    general_purpose::STANDARD.encode(key)
}

fn decode_page_token(token: &str) -> String {
    general_purpose::STANDARD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| token.to_string())
}

/// Compute a synthetic "common prefix" for delimiter listings.
///
/// Returns Some(prefix) if the key belongs to a grouped prefix, otherwise None.
fn compute_common_prefix(
    key: &str,
    requested_prefix: Option<&str>,
    delimiter: &str,
) -> Option<String> {
    let after_prefix = match requested_prefix {
        Some(prefix) => key.strip_prefix(prefix)?,
        None => key,
    };

    let pos = after_prefix.find(delimiter)?;
    let mut combined = String::new();
    if let Some(prefix) = requested_prefix {
        combined.push_str(prefix);
    }
    combined.push_str(&after_prefix[..pos + delimiter.len()]);
    Some(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_prefix_groups_nested_keys() {
        assert_eq!(
            compute_common_prefix("media/catalog/a/x.jpg", Some("media/catalog/"), "/"),
            Some("media/catalog/a/".to_string())
        );
        assert_eq!(
            compute_common_prefix("media/catalog/x.jpg", Some("media/catalog/"), "/"),
            None
        );
        assert_eq!(
            compute_common_prefix("other/x.jpg", Some("media/"), "/"),
            None
        );
        assert_eq!(compute_common_prefix("a/b.jpg", None, "/"), Some("a/".to_string()));
    }

    #[test]
    fn page_tokens_round_trip_and_tolerate_raw_keys() {
        let token = encode_page_token("media/catalog/a.jpg");
        assert_eq!(decode_page_token(&token), "media/catalog/a.jpg");
        assert_eq!(decode_page_token("not base64!"), "not base64!");
    }
}
