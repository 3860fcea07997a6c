//! File-level storage model over the object adapter.
//!
//! Adds directory-style views of the flat object namespace, bulk
//! export/import for migrations and filename-based convenience wrappers.
//! Bulk operations never abort on a single failing file: the failure is
//! logged and appended to [`Bucket::errors`].

use bytes::Bytes;
use tracing::{debug, error, info};

use crate::{
    config::StorageKind,
    errors::{StorageError, StorageResult},
    models::{
        listing::ListOptions,
        media_file::{ImportFile, LoadedFile, MediaFile, Subdirectory},
        upload::{UploadOptions, UploadSource},
    },
    services::{
        object_management::StorageObjectManagement,
        path_resolver::{self, SEPARATOR},
    },
};
use std::path::PathBuf;

const STORAGE_NAME: &str = "Google Cloud Storage";
const LOCAL_STORAGE_NAME: &str = "File System";

pub struct Bucket {
    adapter: StorageObjectManagement,
    loaded: Option<LoadedFile>,
    export_cursor: Option<String>,
    export_exhausted: bool,
    errors: Vec<String>,
}

impl Bucket {
    pub fn new(adapter: StorageObjectManagement) -> Self {
        Self {
            adapter,
            loaded: None,
            export_cursor: None,
            export_exhausted: false,
            errors: Vec::new(),
        }
    }

    pub fn storage_name(&self) -> &'static str {
        match self.adapter.config().storage_kind {
            StorageKind::ObjectStore => STORAGE_NAME,
            StorageKind::Filesystem => LOCAL_STORAGE_NAME,
        }
    }

    pub fn adapter(&self) -> &StorageObjectManagement {
        &self.adapter
    }

    /// Messages of every file that failed during bulk operations so far.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.errors)
    }

    pub fn loaded(&self) -> Option<&LoadedFile> {
        self.loaded.as_ref()
    }

    pub fn id(&self) -> Option<&str> {
        self.loaded.as_ref().map(|file| file.id.as_str())
    }

    pub fn filename(&self) -> Option<&str> {
        self.loaded.as_ref().map(|file| file.filename.as_str())
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.loaded.as_ref().map(|file| &file.content)
    }

    fn media_relative(&self, filename: &str) -> String {
        path_resolver::media_relative(filename, self.adapter.media_base_dir())
    }

    /// Populate id/filename/content from the bucket.
    ///
    /// Clears the loaded state and returns `false` if the object is absent.
    pub async fn load_by_filename(&mut self, filename: &str) -> StorageResult<bool> {
        let relative = self.media_relative(filename);
        self.loaded = None;

        let Some(object) = self.adapter.find_object(&relative).await? else {
            return Ok(false);
        };
        let content = match object.download().await {
            Ok(content) => content,
            Err(StorageError::ObjectNotFound(key)) => {
                debug!(%key, "object vanished before download");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };

        self.loaded = Some(LoadedFile::new(filename, content));
        Ok(true)
    }

    /// Delete every object under the bucket prefix.
    pub async fn clear(&self) -> StorageResult<usize> {
        self.adapter.delete_all_objects(ListOptions::default()).await
    }

    /// Export the next page of files.
    ///
    /// `offset == 0` restarts the export; later calls continue from the stored
    /// page cursor. Returns `None` once the bucket is exhausted.
    pub async fn export_files(
        &mut self,
        offset: usize,
        count: usize,
    ) -> StorageResult<Option<Vec<MediaFile>>> {
        if offset == 0 {
            self.export_cursor = None;
            self.export_exhausted = false;
        }
        if self.export_exhausted {
            return Ok(None);
        }

        let page = self
            .adapter
            .get_objects(ListOptions {
                page_token: self.export_cursor.clone(),
                max_results: Some(count),
                ..ListOptions::default()
            })
            .await?;

        self.export_cursor = page.next_page_token;
        self.export_exhausted = self.export_cursor.is_none();

        if page.objects.is_empty() {
            return Ok(None);
        }

        let mut files = Vec::with_capacity(page.objects.len());
        for object in page.objects {
            files.push(MediaFile {
                filename: self.adapter.resolver().strip_prefix(object.name()),
                content: object.download().await?,
            });
        }

        debug!(offset, count = files.len(), "exported files");
        Ok(Some(files))
    }

    /// The object namespace is flat, so there are never directories to export.
    pub async fn export_directories(
        &mut self,
        _offset: usize,
        _count: usize,
    ) -> StorageResult<Option<Vec<Subdirectory>>> {
        Ok(None)
    }

    /// Upload each file; failures are collected in [`errors`](Self::errors).
    pub async fn import_files(&mut self, files: Vec<ImportFile>) -> &mut Self {
        for file in files {
            let file_path = Self::get_file_path(&file.filename, file.directory.as_deref());
            let relative = self.media_relative(&file_path);

            let result = self
                .upload_and_verify(&file_path, &relative, UploadSource::Bytes(file.content))
                .await;
            if let Err(message) = result {
                error!(file = %file_path, error = %message, "failed to import file");
                self.errors.push(message);
            }
        }
        self
    }

    /// Directories are implicit in object keys; nothing to import.
    pub async fn import_directories(&mut self, _dirs: Vec<Subdirectory>) -> &mut Self {
        self
    }

    /// Upload a file from the local media directory.
    pub async fn save_file(&mut self, filename: &str) -> &mut Self {
        let media_dir = self.adapter.media_base_dir().to_string_lossy().into_owned();
        let file_path = Self::get_file_path(filename, Some(&media_dir));
        let relative = self.media_relative(&file_path);

        let source = UploadSource::File(PathBuf::from(&file_path));
        if let Err(message) = self.upload_and_verify(&file_path, &relative, source).await {
            error!(file = %file_path, error = %message, "failed to save file");
            self.errors.push(message);
        }
        self
    }

    async fn upload_and_verify(
        &self,
        file_path: &str,
        relative: &str,
        source: UploadSource,
    ) -> Result<(), String> {
        let options = UploadOptions::named(relative).with_acl(self.adapter.object_acl_policy());
        self.adapter
            .upload_object(source, options)
            .await
            .map_err(|err| err.to_string())?;

        match self.adapter.object_stored(relative).await {
            Ok(true) => {
                debug!(file = %file_path, "saved file");
                Ok(())
            }
            Ok(false) => Err(format!("Unable to save file: {}", file_path)),
            Err(err) => Err(err.to_string()),
        }
    }

    pub async fn file_exists(&self, path: &str) -> StorageResult<bool> {
        self.adapter.object_exists(path).await
    }

    pub async fn copy_file(&self, source: &str, target: &str) -> StorageResult<()> {
        if self.adapter.object_stored(source).await? {
            self.adapter.copy_object(source, target).await?;
        }
        Ok(())
    }

    pub async fn rename_file(&self, source: &str, target: &str) -> StorageResult<()> {
        if self.adapter.object_stored(source).await? {
            self.adapter.rename_object(source, target).await?;
        }
        Ok(())
    }

    pub async fn delete_file(&self, path: &str) -> StorageResult<()> {
        if self.adapter.object_stored(path).await? {
            self.adapter.delete_object(path).await?;
        }
        Ok(())
    }

    /// Delete every object below `dirname`. An empty dirname is a no-op so a
    /// stray call can never purge the whole bucket.
    pub async fn delete_folder(&self, dirname: &str) -> StorageResult<usize> {
        let dirname = path_resolver::normalize(dirname);
        if dirname.is_empty() {
            return Ok(0);
        }
        let deleted = self
            .adapter
            .delete_all_objects(ListOptions::with_prefix(format!("{}{}", dirname, SEPARATOR)))
            .await?;
        info!(%dirname, deleted, "deleted folder");
        Ok(deleted)
    }

    /// Immediate subdirectories of `path`, by name.
    pub async fn get_subdirectories(&self, path: &str) -> StorageResult<Vec<Subdirectory>> {
        let relative = self.media_relative(path);
        let parent = format!("{}{}", self.adapter.get_object_path(&relative), SEPARATOR);

        let mut options = ListOptions::directory(relative);
        let mut subdirs = Vec::new();
        loop {
            let page = self.adapter.get_objects(options.clone()).await?;
            for prefix in page.prefixes {
                let name = prefix
                    .strip_prefix(&parent)
                    .unwrap_or(&prefix)
                    .trim_end_matches(SEPARATOR);
                if !name.is_empty() && !subdirs.iter().any(|d: &Subdirectory| d.name == name) {
                    subdirs.push(Subdirectory {
                        name: name.to_string(),
                    });
                }
            }
            match page.next_page_token {
                Some(token) => options.page_token = Some(token),
                None => return Ok(subdirs),
            }
        }
    }

    /// Files directly inside `path`, with content.
    pub async fn get_directory_files(&self, path: &str) -> StorageResult<Vec<MediaFile>> {
        let relative = self.media_relative(path);
        let directory_key = self.adapter.get_object_path(&relative);

        let mut options = ListOptions::directory(relative);
        let mut files = Vec::new();
        loop {
            let page = self.adapter.get_objects(options.clone()).await?;
            for object in page.objects {
                if object.name() == directory_key {
                    continue;
                }
                files.push(MediaFile {
                    filename: self.adapter.resolver().strip_prefix(object.name()),
                    content: object.download().await?,
                });
            }
            match page.next_page_token {
                Some(token) => options.page_token = Some(token),
                None => return Ok(files),
            }
        }
    }

    /// `prefix/path`, or `path` unchanged without a prefix.
    pub fn get_file_path(path: &str, prefix: Option<&str>) -> String {
        match prefix {
            Some(prefix) => path_resolver::join(prefix, path),
            None => path.to_string(),
        }
    }
}
