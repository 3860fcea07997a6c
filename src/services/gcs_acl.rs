//! Predefined ACLs on Cloud Storage objects.
//!
//! `object_store` uploads through the XML API and has no way to pass a
//! `predefinedAcl`, so the policy is applied right after the upload with a
//! JSON API `PATCH` using the same bucket credentials.

use async_trait::async_trait;
use object_store::gcp::GcpCredentialProvider;
use reqwest::{Client, header::CONTENT_TYPE};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::{
    config::AclPolicy,
    errors::{ConfigError, StorageError, StorageResult},
};

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Applies a predefined ACL to an object that already exists.
#[async_trait]
pub trait AclClient: Send + Sync {
    async fn apply(&self, key: &str, acl: AclPolicy) -> StorageResult<()>;
}

pub struct GcsAclClient {
    http: Client,
    endpoint: Url,
    bucket: String,
    credentials: GcpCredentialProvider,
}

impl GcsAclClient {
    pub fn new(
        endpoint: Url,
        bucket: impl Into<String>,
        credentials: GcpCredentialProvider,
    ) -> Result<Self, ConfigError> {
        if endpoint.cannot_be_a_base() {
            return Err(ConfigError::InvalidValue {
                name: "storage endpoint",
                value: endpoint.to_string(),
            });
        }
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ConfigError::HttpClient)?;
        Ok(Self {
            http,
            endpoint,
            bucket: bucket.into(),
            credentials,
        })
    }

    /// `{endpoint}/storage/v1/b/{bucket}/o/{key}` with the key as one
    /// percent-encoded segment.
    pub fn object_url(&self, key: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["storage", "v1", "b", self.bucket.as_str(), "o", key]);
        }
        url
    }
}

#[async_trait]
impl AclClient for GcsAclClient {
    async fn apply(&self, key: &str, acl: AclPolicy) -> StorageResult<()> {
        let mut url = self.object_url(key);
        url.query_pairs_mut().append_pair("predefinedAcl", acl.as_str());

        let credential = self.credentials.get_credential().await?;
        let response = self
            .http
            .patch(url)
            .bearer_auth(&credential.bearer)
            .header(CONTENT_TYPE, "application/json")
            .body("{}")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::AclRejected {
                key: key.to_string(),
                status: status.as_u16(),
            });
        }
        debug!(key, %acl, "applied predefined acl");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::{StaticCredentialProvider, gcp::GcpCredential};
    use std::sync::Arc;

    fn client(endpoint: &str) -> GcsAclClient {
        let credentials: GcpCredentialProvider =
            Arc::new(StaticCredentialProvider::new(GcpCredential {
                bearer: "token".into(),
            }));
        GcsAclClient::new(endpoint.parse().unwrap(), "media-bucket", credentials).unwrap()
    }

    #[test]
    fn object_url_encodes_the_key_as_one_segment() {
        let url = client(DEFAULT_ENDPOINT).object_url("prod/catalog/a b.jpg");
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/media-bucket/o/prod%2Fcatalog%2Fa%20b.jpg"
        );
    }

    #[test]
    fn endpoint_path_is_kept() {
        let url = client("http://localhost:4443/gcs/").object_url("a.jpg");
        assert_eq!(
            url.as_str(),
            "http://localhost:4443/gcs/storage/v1/b/media-bucket/o/a.jpg"
        );
    }
}
