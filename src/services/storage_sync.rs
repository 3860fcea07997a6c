//! Bulk copy of one storage into another, guarded by a persisted flag.
//!
//! The guard is advisory: two runs started within the flag TTL of each other
//! race, and the later flag write wins.

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    errors::StorageResult,
    models::{
        media_file::ImportFile,
        sync_flag::{FlagState, SyncFlag},
    },
    services::{bucket::Bucket, path_resolver},
};

pub const FLAG_CODE: &str = "synchronize";

/// A running flag older than this is considered abandoned.
pub const FLAG_TTL_SECS: i64 = 300;

const PAGE_SIZE: usize = 100;

#[derive(Clone)]
pub struct SyncFlagStore {
    db: Arc<SqlitePool>,
}

impl SyncFlagStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Load the flag, or a fresh idle one if it was never saved.
    pub async fn load(&self, code: &str) -> StorageResult<SyncFlag> {
        let flag = sqlx::query_as::<_, SyncFlag>(
            "SELECT code, state, last_update, flag_data, error_data FROM sync_flags WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&*self.db)
        .await?;
        Ok(flag.unwrap_or_else(|| SyncFlag::idle(code)))
    }

    pub async fn save(&self, flag: &SyncFlag) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_flags (code, state, last_update, flag_data, error_data)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(code) DO UPDATE SET
                state = excluded.state,
                last_update = excluded.last_update,
                flag_data = excluded.flag_data,
                error_data = excluded.error_data
            "#,
        )
        .bind(&flag.code)
        .bind(&flag.state)
        .bind(flag.last_update)
        .bind(&flag.flag_data)
        .bind(&flag.error_data)
        .execute(&*self.db)
        .await?;
        Ok(())
    }
}

/// Progress recorded in the flag while a run is in flight.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncProgress {
    pub run_id: Uuid,
    pub source: String,
    pub destination: String,
    pub files: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another run holds a fresh flag.
    AlreadyRunning,
    Finished { files: usize, errors: Vec<String> },
    Failed(String),
}

impl RunOutcome {
    /// Successful only when every file made it across.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Finished { errors, .. } if errors.is_empty())
    }
}

pub struct StorageSync {
    flags: SyncFlagStore,
}

impl StorageSync {
    pub fn new(flags: SyncFlagStore) -> Self {
        Self { flags }
    }

    pub fn flags(&self) -> &SyncFlagStore {
        &self.flags
    }

    /// Copy every file exported by `source` into `destination`.
    pub async fn run(&self, source: &mut Bucket, destination: &mut Bucket) -> StorageResult<RunOutcome> {
        let mut flag = self.flags.load(FLAG_CODE).await?;
        if is_fresh_run(&flag) {
            info!(flag = %flag.code, "synchronization already running");
            return Ok(RunOutcome::AlreadyRunning);
        }

        let mut progress = SyncProgress {
            run_id: Uuid::new_v4(),
            source: source.storage_name().to_string(),
            destination: destination.storage_name().to_string(),
            ..SyncProgress::default()
        };
        flag.set_state(FlagState::Running);
        flag.error_data = None;
        self.heartbeat(&mut flag, &progress).await?;
        info!(run_id = %progress.run_id, "synchronization started");

        match self.transfer(source, destination, &mut flag, &mut progress).await {
            Ok(errors) => {
                flag.set_state(FlagState::Finished);
                if !errors.is_empty() {
                    flag.error_data = Some(errors.join("\n"));
                }
                self.heartbeat(&mut flag, &progress).await?;
                info!(
                    run_id = %progress.run_id,
                    files = progress.files,
                    errors = errors.len(),
                    "synchronization finished"
                );
                Ok(RunOutcome::Finished {
                    files: progress.files,
                    errors,
                })
            }
            Err(err) => {
                let message = err.to_string();
                error!(run_id = %progress.run_id, error = %message, "synchronization failed");
                flag.set_state(FlagState::Error);
                flag.error_data = Some(message.clone());
                self.heartbeat(&mut flag, &progress).await?;
                Ok(RunOutcome::Failed(message))
            }
        }
    }

    async fn transfer(
        &self,
        source: &mut Bucket,
        destination: &mut Bucket,
        flag: &mut SyncFlag,
        progress: &mut SyncProgress,
    ) -> StorageResult<Vec<String>> {
        destination.take_errors();
        let mut offset = 0;

        while let Some(files) = source.export_files(offset, PAGE_SIZE).await? {
            offset += files.len().max(1);
            let batch: Vec<ImportFile> = files
                .into_iter()
                .filter(|file| !path_resolver::has_tmp_segment(&file.filename))
                .map(ImportFile::from)
                .collect();
            let attempted = batch.len();

            let before = destination.errors().len();
            destination.import_files(batch).await;
            let failed = destination.errors().len() - before;

            progress.files += attempted - failed;
            progress.errors += failed;
            debug!(run_id = %progress.run_id, files = progress.files, "imported page");
            self.heartbeat(flag, progress).await?;
        }

        Ok(destination.take_errors())
    }

    async fn heartbeat(&self, flag: &mut SyncFlag, progress: &SyncProgress) -> StorageResult<()> {
        flag.last_update = Some(Utc::now());
        flag.flag_data = match serde_json::to_string(progress) {
            Ok(data) => Some(data),
            Err(err) => {
                warn!(error = %err, "failed to encode sync progress");
                None
            }
        };
        self.flags.save(flag).await
    }
}

fn is_fresh_run(flag: &SyncFlag) -> bool {
    flag.state() == FlagState::Running
        && flag
            .last_update
            .is_some_and(|at| Utc::now() - at < ChronoDuration::seconds(FLAG_TTL_SECS))
}
