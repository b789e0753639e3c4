//! HTTP fetcher backed by reqwest.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Url};
use tracing::debug;

use super::Fetcher;
use crate::cache::RequestDescriptor;
use crate::error::FetchError;

/// Fetches `GET <locator>?<params>` over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport {
                locator: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Builds the request URL: the locator with variant params appended as query pairs.
    pub fn request_url(descriptor: &RequestDescriptor) -> Result<Url, FetchError> {
        let mut url = Url::parse(descriptor.locator()).map_err(|e| FetchError::InvalidLocator {
            locator: descriptor.locator().to_string(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(FetchError::InvalidLocator {
                    locator: descriptor.locator().to_string(),
                    reason: format!("unsupported scheme {other}"),
                })
            }
        }
        if !descriptor.params().is_empty() {
            url.query_pairs_mut().extend_pairs(descriptor.params());
        }
        Ok(url)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, descriptor: &RequestDescriptor) -> Result<Bytes, FetchError> {
        let url = Self::request_url(descriptor)?;
        let locator = descriptor.locator().to_string();
        debug!(%url, "Fetching from network");

        let transport = |e: reqwest::Error| FetchError::Transport {
            locator: locator.clone(),
            reason: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                locator: locator.clone(),
                status: status.as_u16(),
            });
        }
        response.bytes().await.map_err(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_builds_client() {
        assert!(HttpFetcher::new(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_request_url_appends_params_in_order() {
        let d = RequestDescriptor::new("https://picsum.photos/400")
            .param("grayscale", "1")
            .param("blur", "2");
        let url = HttpFetcher::request_url(&d).unwrap();
        assert_eq!(url.as_str(), "https://picsum.photos/400?grayscale=1&blur=2");
    }

    #[test]
    fn test_request_url_keeps_existing_query() {
        let d = RequestDescriptor::new("https://example.com/posts?page=2").param("limit", "20");
        let url = HttpFetcher::request_url(&d).unwrap();
        assert_eq!(url.query(), Some("page=2&limit=20"));
    }

    #[test]
    fn test_request_url_rejects_bad_locators() {
        let relative = RequestDescriptor::new("/posts");
        assert!(matches!(
            HttpFetcher::request_url(&relative),
            Err(FetchError::InvalidLocator { .. })
        ));

        let file = RequestDescriptor::new("file:///etc/passwd");
        assert!(matches!(
            HttpFetcher::request_url(&file),
            Err(FetchError::InvalidLocator { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host_is_transport_error() {
        let client = Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let fetcher = HttpFetcher::with_client(client);
        // Port 9 on localhost: nothing listens there
        let d = RequestDescriptor::new("http://127.0.0.1:9/nothing");
        let result = fetcher.fetch(&d).await;
        assert!(matches!(result, Err(FetchError::Transport { .. })));
    }
}
