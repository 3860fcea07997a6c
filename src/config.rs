use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{
    collections::BTreeMap,
    env,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use url::Url;

use crate::errors::ConfigError;

const DEFAULT_ACL_POLICY: &str = "publicRead";
const DEFAULT_REGION: &str = "us-central1";
const DEFAULT_STORE_CODE: &str = "default";
const DEFAULT_DATABASE_URL: &str = "sqlite://./var/gcs_media.db";
const DEFAULT_FALLBACK_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MISS_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub module: ModuleConfig,
}

/// Settings consumed by the storage adapter, the bucket façade and the
/// synchronization layer.
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    /// Whether media storage is backed by the bucket at all.
    pub enabled: bool,
    pub storage_kind: StorageKind,
    pub project_id: String,
    /// Absolute, or relative to `app_root`.
    pub service_account_key_path: String,
    pub bucket_name: String,
    /// Raw configured prefix; normalization happens in the path resolver.
    pub bucket_prefix: String,
    pub bucket_acl_policy: AclPolicy,
    pub bucket_region: String,
    pub fallback_origin: Option<FallbackOrigin>,
    pub store_code: String,
    pub app_root: PathBuf,
    pub media_dir: PathBuf,
    pub fallback_timeout: Duration,
    pub miss_cache_ttl: Duration,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        let app_root = PathBuf::from(".");
        Self {
            enabled: true,
            storage_kind: StorageKind::ObjectStore,
            project_id: String::new(),
            service_account_key_path: String::new(),
            bucket_name: String::new(),
            bucket_prefix: String::new(),
            bucket_acl_policy: AclPolicy::PublicRead,
            bucket_region: DEFAULT_REGION.into(),
            fallback_origin: None,
            store_code: DEFAULT_STORE_CODE.into(),
            media_dir: app_root.join("pub").join("media"),
            app_root,
            fallback_timeout: Duration::from_secs(DEFAULT_FALLBACK_TIMEOUT_SECS),
            miss_cache_ttl: Duration::from_secs(DEFAULT_MISS_CACHE_TTL_SECS),
        }
    }
}

impl ModuleConfig {
    /// Check the settings the remote client cannot work without.
    ///
    /// Returns the absolute service account key path on success.
    pub fn validate(&self) -> Result<PathBuf, ConfigError> {
        if self.project_id.trim().is_empty() {
            return Err(ConfigError::Missing("project_id"));
        }
        if self.bucket_name.trim().is_empty() {
            return Err(ConfigError::Missing("bucket_name"));
        }
        self.key_file_path()
    }

    /// Resolve the service account key path against the application root.
    pub fn key_file_path(&self) -> Result<PathBuf, ConfigError> {
        let raw = self.service_account_key_path.trim();
        if raw.is_empty() {
            return Err(ConfigError::Missing("service_account_key_path"));
        }

        let path = Path::new(raw);
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.app_root.join(path)
        };

        match absolute.canonicalize() {
            Ok(real) if real.is_file() => Ok(real),
            _ => Err(ConfigError::KeyFileNotFound(absolute)),
        }
    }

    /// Fallback origin base URL for the configured store code.
    pub fn fallback_base(&self) -> Option<&Url> {
        self.fallback_origin
            .as_ref()
            .and_then(|origin| origin.base_for(&self.store_code))
    }
}

/// Which backend the storage registry hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Filesystem,
    ObjectStore,
}

impl FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "filesystem" | "file" => Ok(Self::Filesystem),
            "object-store" | "objectstore" | "gcs" => Ok(Self::ObjectStore),
            _ => Err(ConfigError::InvalidStorageKind {
                value: value.to_string(),
            }),
        }
    }
}

/// Predefined object ACLs understood by Cloud Storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclPolicy {
    AuthenticatedRead,
    BucketOwnerFullControl,
    BucketOwnerRead,
    Private,
    ProjectPrivate,
    PublicRead,
}

impl AclPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticatedRead => "authenticatedRead",
            Self::BucketOwnerFullControl => "bucketOwnerFullControl",
            Self::BucketOwnerRead => "bucketOwnerRead",
            Self::Private => "private",
            Self::ProjectPrivate => "projectPrivate",
            Self::PublicRead => "publicRead",
        }
    }
}

impl fmt::Display for AclPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AclPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let policy = match value.trim() {
            "authenticatedRead" => Self::AuthenticatedRead,
            "bucketOwnerFullControl" => Self::BucketOwnerFullControl,
            "bucketOwnerRead" => Self::BucketOwnerRead,
            "private" => Self::Private,
            "projectPrivate" => Self::ProjectPrivate,
            "publicRead" => Self::PublicRead,
            _ => {
                return Err(ConfigError::InvalidAclPolicy {
                    value: value.to_string(),
                });
            }
        };
        Ok(policy)
    }
}

/// Where missing objects are re-fetched from.
///
/// Either one URL for every store, or a JSON object keyed by store code with
/// an optional `default` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackOrigin {
    Single(Url),
    Scoped(BTreeMap<String, Url>),
}

impl FallbackOrigin {
    pub fn base_for(&self, store_code: &str) -> Option<&Url> {
        match self {
            Self::Single(url) => Some(url),
            Self::Scoped(map) => map.get(store_code).or_else(|| map.get(DEFAULT_STORE_CODE)),
        }
    }
}

impl FromStr for FallbackOrigin {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.starts_with('{') {
            let raw: BTreeMap<String, String> =
                serde_json::from_str(trimmed).map_err(|err| ConfigError::InvalidFallbackOrigin {
                    value: value.to_string(),
                    reason: err.to_string(),
                })?;
            let mut scoped = BTreeMap::new();
            for (code, url) in raw {
                scoped.insert(code, parse_origin_url(&url)?);
            }
            return Ok(Self::Scoped(scoped));
        }
        parse_origin_url(trimmed).map(Self::Single)
    }
}

fn parse_origin_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim()).map_err(|err| ConfigError::InvalidFallbackOrigin {
        value: value.to_string(),
        reason: err.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidFallbackOrigin {
            value: value.to_string(),
            reason: "scheme must be http or https".into(),
        });
    }
    Ok(url)
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Google Cloud Storage media adapter")]
pub struct Args {
    /// Database URL for sync flags and the miss cache (overrides GCS_MEDIA_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Application root used to resolve relative paths (overrides GCS_MEDIA_APP_ROOT)
    #[arg(long, global = true)]
    pub app_root: Option<PathBuf>,

    /// Local media directory (overrides GCS_MEDIA_MEDIA_DIR)
    #[arg(long, global = true)]
    pub media_dir: Option<PathBuf>,

    /// Bucket name (overrides GCS_MEDIA_BUCKET_NAME)
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Bucket prefix (overrides GCS_MEDIA_BUCKET_PREFIX)
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    /// Store code used to pick a scoped fallback origin (overrides GCS_MEDIA_STORE_CODE)
    #[arg(long, global = true)]
    pub store_code: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Synchronize media storage with Google Cloud Storage.
    #[command(name = "media:sync")]
    MediaSync,
    /// Pull a single media path from the bucket into the local media directory.
    #[command(name = "media:fetch")]
    MediaFetch { path: String },
    /// Run database migrations and exit.
    Migrate,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        // Parse CLI once
        let args = Args::parse();
        let command = args.command.clone();
        let cfg = Self::merge(args, |name| env::var(name).ok())?;
        Ok((cfg, command))
    }

    /// Merge CLI args over environment values over built-in defaults.
    pub fn merge(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = ModuleConfig::default();

        let app_root = args
            .app_root
            .or_else(|| lookup("GCS_MEDIA_APP_ROOT").map(PathBuf::from))
            .unwrap_or(defaults.app_root);
        let media_dir = args
            .media_dir
            .or_else(|| lookup("GCS_MEDIA_MEDIA_DIR").map(PathBuf::from))
            .unwrap_or_else(|| app_root.join("pub").join("media"));

        let enabled = match lookup("GCS_MEDIA_ENABLED") {
            Some(value) => parse_flag(&value)
                .with_context(|| format!("parsing GCS_MEDIA_ENABLED value `{}`", value))?,
            None => defaults.enabled,
        };
        let storage_kind = match lookup("GCS_MEDIA_STORAGE_KIND") {
            Some(value) => value.parse().context("reading GCS_MEDIA_STORAGE_KIND")?,
            None => defaults.storage_kind,
        };
        let bucket_acl_policy = match lookup("GCS_MEDIA_BUCKET_ACL") {
            Some(value) => value.parse().context("reading GCS_MEDIA_BUCKET_ACL")?,
            None => DEFAULT_ACL_POLICY.parse()?,
        };
        let fallback_origin = match lookup("GCS_MEDIA_FALLBACK_ORIGIN_URL") {
            Some(value) if !value.trim().is_empty() => Some(
                value
                    .parse()
                    .context("reading GCS_MEDIA_FALLBACK_ORIGIN_URL")?,
            ),
            _ => None,
        };
        let fallback_timeout = Duration::from_secs(parse_secs(
            &lookup,
            "GCS_MEDIA_FALLBACK_TIMEOUT_SECS",
            DEFAULT_FALLBACK_TIMEOUT_SECS,
        )?);
        let miss_cache_ttl = Duration::from_secs(parse_secs(
            &lookup,
            "GCS_MEDIA_MISS_CACHE_TTL_SECS",
            DEFAULT_MISS_CACHE_TTL_SECS,
        )?);

        let module = ModuleConfig {
            enabled,
            storage_kind,
            project_id: lookup("GCS_MEDIA_PROJECT_ID").unwrap_or_default(),
            service_account_key_path: lookup("GCS_MEDIA_KEY_FILE_PATH").unwrap_or_default(),
            bucket_name: args
                .bucket
                .or_else(|| lookup("GCS_MEDIA_BUCKET_NAME"))
                .unwrap_or_default(),
            bucket_prefix: args
                .prefix
                .or_else(|| lookup("GCS_MEDIA_BUCKET_PREFIX"))
                .unwrap_or_default(),
            bucket_acl_policy,
            bucket_region: lookup("GCS_MEDIA_BUCKET_REGION").unwrap_or(defaults.bucket_region),
            fallback_origin,
            store_code: args
                .store_code
                .or_else(|| lookup("GCS_MEDIA_STORE_CODE"))
                .unwrap_or(defaults.store_code),
            app_root,
            media_dir,
            fallback_timeout,
            miss_cache_ttl,
        };

        let database_url = args
            .database_url
            .or_else(|| lookup("GCS_MEDIA_DATABASE_URL"))
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.into());

        Ok(Self {
            database_url,
            module,
        })
    }
}

fn parse_flag(value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name: "enabled",
            value: value.to_string(),
        }),
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<u64> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue {
                name,
                value: value.clone(),
            })
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(default),
    }
}
