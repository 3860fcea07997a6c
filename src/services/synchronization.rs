//! Read-through mirroring of bucket objects into the local media directory.
//!
//! Local copies are authoritative once present: a path that exists on disk is
//! never re-checked against the bucket. Mirroring is best effort, so no
//! operation here returns an error to the caller.

use bytes::Bytes;
use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};
use tokio::task;
use tracing::{debug, error, info, warn};

use crate::{
    models::{object::StorageObject, upload::{UploadOptions, UploadSource}},
    services::{
        bucket::Bucket,
        object_management::StorageObjectManagement,
        path_resolver,
    },
};

/// What a call to [`Synchronization::synchronize`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Bucket-backed storage is switched off.
    Disabled,
    /// A local copy exists; the bucket was not contacted.
    AlreadyLocal,
    /// Neither the bucket nor the fallback origin has the object.
    NotFound,
    /// The object was mirrored; carries the number of bytes written.
    Written(usize),
    /// The object was downloaded but the local write failed.
    WriteFailed,
    /// The bucket lookup itself failed.
    RemoteFailed,
    /// The path can never be a valid object key.
    InvalidPath,
}

#[derive(Clone)]
pub struct Synchronization {
    adapter: StorageObjectManagement,
    media_dir: PathBuf,
    enabled: bool,
}

impl Synchronization {
    pub fn new(adapter: StorageObjectManagement) -> Self {
        let media_dir = adapter.media_base_dir().to_path_buf();
        let enabled = adapter.config().enabled;
        Self {
            adapter,
            media_dir,
            enabled,
        }
    }

    pub fn local_path(&self, relative: &str) -> PathBuf {
        self.media_dir.join(path_resolver::normalize(relative))
    }

    /// Make sure `relative` exists in the local media directory, pulling it
    /// from the bucket if needed.
    pub async fn synchronize(&self, relative: &str) -> SyncOutcome {
        if !self.enabled {
            return SyncOutcome::Disabled;
        }

        let relative = path_resolver::media_relative(relative, &self.media_dir);
        if path_resolver::ensure_key_safe(&relative).is_err() {
            debug!(path = %relative, "refusing to mirror unsafe path");
            return SyncOutcome::InvalidPath;
        }

        let target = self.local_path(&relative);
        if fs::metadata(&target).is_ok() {
            return SyncOutcome::AlreadyLocal;
        }

        let mut bucket = Bucket::new(self.adapter.clone());
        match bucket.load_by_filename(&relative).await {
            Ok(true) => {}
            Ok(false) => return SyncOutcome::NotFound,
            Err(err) => {
                warn!(path = %relative, error = %err, "bucket lookup failed");
                return SyncOutcome::RemoteFailed;
            }
        }
        let Some(content) = bucket.content().cloned() else {
            return SyncOutcome::NotFound;
        };

        let written = content.len();
        let path = target.clone();
        let result = task::spawn_blocking(move || write_locked(&path, &content)).await;
        match result {
            Ok(Ok(())) => {
                info!(path = %target.display(), bytes = written, "mirrored object locally");
                SyncOutcome::Written(written)
            }
            Ok(Err(err)) => {
                warn!(path = %target.display(), error = %err, "failed to write local copy");
                SyncOutcome::WriteFailed
            }
            Err(err) => {
                error!(path = %target.display(), error = %err, "local write task panicked");
                SyncOutcome::WriteFailed
            }
        }
    }

    /// Product image hook: `file` is relative to the product media base path.
    pub async fn product_base_file(&self, base_media_path: &str, file: &str) -> SyncOutcome {
        self.synchronize(&path_resolver::join(base_media_path, file))
            .await
    }

    /// Category image hook.
    pub async fn category_image(&self, path: &str) -> SyncOutcome {
        self.synchronize(path).await
    }

    /// Push a freshly saved local media file to the bucket.
    pub async fn mirror_upload(&self, local_path: &Path) -> Option<StorageObject> {
        if !self.enabled {
            return None;
        }
        let name = path_resolver::media_relative(&local_path.to_string_lossy(), &self.media_dir);
        let options = UploadOptions::named(name).with_acl(self.adapter.object_acl_policy());

        match self
            .adapter
            .upload_object(UploadSource::File(local_path.to_path_buf()), options)
            .await
        {
            Ok(object) => object,
            Err(err) => {
                error!(path = %local_path.display(), error = %err, "failed to mirror upload");
                None
            }
        }
    }
}

/// Releases the file lock when dropped.
struct LockGuard<'a>(&'a File);

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let _ = self.0.unlock();
    }
}

/// Stage `content` in a locked sibling file, then rename it over `path`.
///
/// The target only ever appears complete; a failed write leaves nothing
/// behind because the staged file is removed on drop.
fn write_locked(path: &Path, content: &Bytes) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let staged = tempfile::Builder::new()
        .prefix(".mirror-")
        .suffix(".part")
        .tempfile_in(parent)?;
    {
        let file = staged.as_file();
        file.lock()?;
        let _guard = LockGuard(file);
        write_all(file, content)?;
    }

    staged.persist(path).map_err(|err| err.error)?;
    Ok(())
}

fn write_all(mut file: &File, content: &[u8]) -> io::Result<()> {
    file.write_all(content)?;
    file.flush()?;
    file.sync_all()
}
