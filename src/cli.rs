//! Command implementations behind the `gcs-media` binary.

use anyhow::{Context, Result};
use std::{fs, process::ExitCode, sync::Arc};

use crate::{
    config::{AppConfig, Command, ModuleConfig, StorageKind},
    db,
    services::{
        bucket::Bucket,
        miss_cache::MissCache,
        object_management::StorageObjectManagement,
        storage_sync::{RunOutcome, StorageSync, SyncFlagStore},
        synchronization::{SyncOutcome, Synchronization},
    },
};
use sqlx::SqlitePool;

pub async fn run(cfg: AppConfig, command: Command) -> Result<ExitCode> {
    let db = db::connect(&cfg.database_url).await?;

    match command {
        Command::Migrate => {
            db::run_migrations(&db).await?;
            tracing::info!("Database migration complete.");
            Ok(ExitCode::SUCCESS)
        }
        Command::MediaSync => {
            db::run_migrations(&db).await?;
            let purged = MissCache::new(db.clone(), cfg.module.miss_cache_ttl)
                .purge_expired()
                .await?;
            tracing::debug!(purged, "purged expired miss cache entries");
            media_sync(&cfg, db).await
        }
        Command::MediaFetch { path } => {
            db::run_migrations(&db).await?;
            media_fetch(&cfg, db, &path).await
        }
    }
}

/// Adapter for the configured bucket, with the miss cache attached.
pub fn remote_adapter(module: &ModuleConfig, db: Arc<SqlitePool>) -> Result<StorageObjectManagement> {
    let cache = MissCache::new(db, module.miss_cache_ttl);
    let adapter = StorageObjectManagement::new(module.clone())
        .context("initializing bucket storage")?
        .with_miss_cache(cache);
    Ok(adapter)
}

/// Adapter over the local media directory, without prefix or fallback.
pub fn local_adapter(module: &ModuleConfig) -> Result<StorageObjectManagement> {
    fs::create_dir_all(&module.media_dir)
        .with_context(|| format!("creating media directory {:?}", module.media_dir))?;
    let local = ModuleConfig {
        storage_kind: StorageKind::Filesystem,
        bucket_prefix: String::new(),
        fallback_origin: None,
        ..module.clone()
    };
    StorageObjectManagement::new(local).context("initializing local media storage")
}

async fn media_sync(cfg: &AppConfig, db: Arc<SqlitePool>) -> Result<ExitCode> {
    let outcome = async {
        let mut source = Bucket::new(local_adapter(&cfg.module)?);
        let mut destination = Bucket::new(remote_adapter(&cfg.module, db.clone())?);
        let sync = StorageSync::new(SyncFlagStore::new(db));
        Ok::<_, anyhow::Error>(sync.run(&mut source, &mut destination).await?)
    }
    .await;

    match outcome {
        Ok(outcome) if outcome.is_success() => {
            println!("Media synchronized successfully!");
            Ok(ExitCode::SUCCESS)
        }
        Ok(RunOutcome::AlreadyRunning) => {
            println!("Media synchronization is already running.");
            Ok(ExitCode::SUCCESS)
        }
        Ok(outcome) => {
            if let RunOutcome::Finished { errors, .. } = &outcome {
                for message in errors {
                    eprintln!("{}", message);
                }
            }
            tracing::error!(?outcome, "media synchronization did not complete");
            println!("Media synchronization failed!");
            Ok(ExitCode::FAILURE)
        }
        Err(err) => {
            tracing::error!(error = %format!("{:#}", err), "media synchronization failed");
            println!("Media synchronization failed!");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn media_fetch(cfg: &AppConfig, db: Arc<SqlitePool>, path: &str) -> Result<ExitCode> {
    let sync = Synchronization::new(remote_adapter(&cfg.module, db)?);
    let outcome = sync.synchronize(path).await;
    tracing::info!(path, ?outcome, "fetch complete");

    match outcome {
        SyncOutcome::Written(bytes) => {
            println!("Fetched {} ({} bytes)", path, bytes);
            Ok(ExitCode::SUCCESS)
        }
        SyncOutcome::AlreadyLocal | SyncOutcome::Disabled => Ok(ExitCode::SUCCESS),
        SyncOutcome::NotFound => {
            eprintln!("Not found: {}", path);
            Ok(ExitCode::FAILURE)
        }
        SyncOutcome::WriteFailed | SyncOutcome::RemoteFailed | SyncOutcome::InvalidPath => {
            eprintln!("Unable to fetch {}", path);
            Ok(ExitCode::FAILURE)
        }
    }
}
