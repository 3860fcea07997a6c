#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use object_store::memory::InMemory;
use sqlx::SqlitePool;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use gcs_media_storage::{
    config::{AclPolicy, ModuleConfig, StorageKind},
    db,
    errors::{StorageError, StorageResult},
    models::object::ObjectInfo,
    services::{
        miss_cache::MissCache,
        object_management::StorageObjectManagement,
        remote_store::{ObjectStoreBackend, RemoteStore},
    },
};

/// In-memory store that counts calls and can be told to refuse uploads.
pub struct CountingStore {
    inner: ObjectStoreBackend,
    pub memory: Arc<InMemory>,
    pub heads: AtomicUsize,
    pub gets: AtomicUsize,
    pub lists: AtomicUsize,
    pub puts: AtomicUsize,
    pub deletes: AtomicUsize,
    /// Objects handed back by all listings so far.
    pub listed: AtomicUsize,
    failing_puts: Mutex<HashSet<String>>,
    acls: Mutex<HashMap<String, AclPolicy>>,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        let memory = Arc::new(InMemory::new());
        Arc::new(Self {
            inner: ObjectStoreBackend::new(memory.clone()),
            memory,
            heads: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            listed: AtomicUsize::new(0),
            failing_puts: Mutex::new(HashSet::new()),
            acls: Mutex::new(HashMap::new()),
        })
    }

    pub fn fail_put(&self, key: &str) {
        self.failing_puts.lock().unwrap().insert(key.to_string());
    }

    pub fn remote_calls(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
            + self.gets.load(Ordering::SeqCst)
            + self.lists.load(Ordering::SeqCst)
            + self.puts.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Seed an object without going through the counters.
    pub async fn seed(&self, key: &str, body: &'static [u8]) {
        self.inner
            .put(key, Bytes::from_static(body), None)
            .await
            .unwrap();
    }

    pub async fn body(&self, key: &str) -> Option<Bytes> {
        self.inner.get(key).await.unwrap()
    }

    /// The ACL the last upload of `key` asked for.
    pub fn acl_of(&self, key: &str) -> Option<AclPolicy> {
        self.acls.lock().unwrap().get(key).copied()
    }

    pub fn listed(&self) -> usize {
        self.listed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for CountingStore {
    async fn head(&self, key: &str) -> StorageResult<Option<ObjectInfo>> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn list(
        &self,
        prefix: Option<&str>,
        offset: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<ObjectInfo>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let infos = self.inner.list(prefix, offset, limit).await?;
        self.listed.fetch_add(infos.len(), Ordering::SeqCst);
        Ok(infos)
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        acl: Option<AclPolicy>,
    ) -> StorageResult<ObjectInfo> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.failing_puts.lock().unwrap().contains(key) {
            return Err(StorageError::Io(std::io::Error::other("upload refused")));
        }
        if let Some(acl) = acl {
            self.acls.lock().unwrap().insert(key.to_string(), acl);
        }
        self.inner.put(key, data, acl).await
    }

    async fn copy(&self, from: &str, to: &str) -> StorageResult<()> {
        self.inner.copy(from, to).await
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        self.inner.rename(from, to).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }
}

pub fn test_config(prefix: &str) -> ModuleConfig {
    ModuleConfig {
        storage_kind: StorageKind::ObjectStore,
        project_id: "test-project".into(),
        bucket_name: "test-bucket".into(),
        bucket_prefix: prefix.into(),
        ..ModuleConfig::default()
    }
}

pub fn adapter(config: ModuleConfig, store: Arc<CountingStore>) -> StorageObjectManagement {
    StorageObjectManagement::with_store(config, store).unwrap()
}

pub async fn memory_pool() -> Arc<SqlitePool> {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

pub async fn miss_cache() -> MissCache {
    MissCache::new(memory_pool().await, std::time::Duration::from_secs(86_400))
}
