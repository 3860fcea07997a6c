//! Error taxonomy shared by the adapter, the bucket façade and the CLI.
//!
//! Absence of an object is never an error: operations return `Option::None`
//! (or `false`) for "does not exist". The enums below only cover hard failures.

use std::{io, path::PathBuf};
use thiserror::Error;

/// Raised while building the adapter from configuration.
///
/// Construction fails fast with one of these; the adapter is never handed out
/// half-initialized.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required setting `{0}` is missing")]
    Missing(&'static str),
    #[error("service account key file `{}` is not a readable file", .0.display())]
    KeyFileNotFound(PathBuf),
    #[error("`{value}` is not a valid bucket ACL policy")]
    InvalidAclPolicy { value: String },
    #[error("`{value}` is not a valid storage kind (expected `filesystem` or `object-store`)")]
    InvalidStorageKind { value: String },
    #[error("fallback origin `{value}` is invalid: {reason}")]
    InvalidFallbackOrigin { value: String, reason: String },
    #[error("setting `{name}` has invalid value `{value}`")]
    InvalidValue { name: &'static str, value: String },
    #[error("failed to build object store client: {0}")]
    Client(#[source] object_store::Error),
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("object `{0}` no longer exists")]
    ObjectNotFound(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("remote object store error: {0}")]
    Remote(#[from] object_store::Error),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("bucket rejected the acl for `{key}` with status {status}")]
    AclRejected { key: String, status: u16 },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;
