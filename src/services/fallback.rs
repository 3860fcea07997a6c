//! HTTP fallback origin used to backfill objects missing from the bucket.

use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::{errors::StorageResult, services::path_resolver};

#[derive(Clone, Debug)]
pub struct FallbackFetcher {
    client: Client,
    base: Url,
}

impl FallbackFetcher {
    pub fn new(base: Url, timeout: Duration) -> StorageResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `base + "/" + path`, with the path normalized.
    pub fn url_for(&self, path: &str) -> String {
        path_resolver::join(self.base.as_str(), &path_resolver::normalize(path))
    }

    /// Fetch `path` from the origin.
    ///
    /// Only an HTTP 200 counts as a hit. Non-200 statuses, timeouts and
    /// network errors all yield `None`.
    pub async fn fetch(&self, path: &str) -> Option<Bytes> {
        let url = self.url_for(path);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(%url, error = %err, "fallback origin request failed");
                return None;
            }
        };

        if response.status() != StatusCode::OK {
            debug!(%url, status = %response.status(), "fallback origin has no copy");
            return None;
        }

        match response.bytes().await {
            Ok(body) => {
                debug!(%url, size = body.len(), "fetched object from fallback origin");
                Some(body)
            }
            Err(err) => {
                warn!(%url, error = %err, "failed to read fallback origin response");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_for_joins_with_single_separator() {
        let fetcher = FallbackFetcher::new(
            Url::parse("https://origin.example/media/").unwrap(),
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(
            fetcher.url_for("/img//a.jpg"),
            "https://origin.example/media/img/a.jpg"
        );
    }
}
