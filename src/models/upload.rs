//! Upload inputs accepted by the storage adapter.

use bytes::Bytes;
use std::path::PathBuf;

use crate::config::AclPolicy;

/// Content to upload.
#[derive(Clone, Debug)]
pub enum UploadSource {
    /// In-memory bytes or text.
    Bytes(Bytes),
    /// A local file; its path is used to derive the object name when no
    /// explicit name is given.
    File(PathBuf),
}

impl From<Bytes> for UploadSource {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for UploadSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<String> for UploadSource {
    fn from(value: String) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<&'static str> for UploadSource {
    fn from(value: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(value.as_bytes()))
    }
}

impl From<PathBuf> for UploadSource {
    fn from(value: PathBuf) -> Self {
        Self::File(value)
    }
}

#[derive(Clone, Debug, Default)]
pub struct UploadOptions {
    /// Destination name; prefixed unless already prefix-qualified.
    pub name: Option<String>,
    /// Overrides the configured bucket ACL policy.
    pub predefined_acl: Option<AclPolicy>,
}

impl UploadOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            predefined_acl: None,
        }
    }

    pub fn with_acl(mut self, acl: AclPolicy) -> Self {
        self.predefined_acl = Some(acl);
        self
    }
}
