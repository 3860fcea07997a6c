use anyhow::Result;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use gcs_media_storage::{cli, config};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = config::AppConfig::from_env_and_args()?;

    tracing::info!(
        bucket = %cfg.module.bucket_name,
        media_dir = %cfg.module.media_dir.display(),
        ?command,
        "Starting gcs-media"
    );
    tracing::debug!("Connecting using raw URL => {}", cfg.database_url);

    cli::run(cfg, command).await
}
