//! Live fetches against the app origin.

use std::future::Future;

use http::header::CONTENT_TYPE;

use crate::error::{ShellError, ShellResult};
use crate::request::{CachedResponse, ShellRequest};

/// Trait for fetching a request from the network
pub trait Network: Send + Sync {
    /// Fetch `request`. A non-success status is still an `Ok` response;
    /// `Err` means the request never completed.
    fn fetch(&self, request: &ShellRequest)
        -> impl Future<Output = ShellResult<CachedResponse>> + Send;
}

/// Network backed by `reqwest` against a fixed origin.
#[derive(Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
    origin: String,
}

impl HttpNetwork {
    pub fn new(origin: &str) -> ShellResult<Self> {
        Self::with_client(origin, reqwest::Client::new())
    }

    pub fn with_client(origin: &str, client: reqwest::Client) -> ShellResult<Self> {
        let origin = origin.trim().trim_end_matches('/');
        if origin.is_empty() {
            return Err(ShellError::InvalidOrigin("origin is empty".to_string()));
        }
        if !(origin.starts_with("http://") || origin.starts_with("https://")) {
            return Err(ShellError::InvalidOrigin(format!(
                "{origin} must start with http:// or https://"
            )));
        }

        Ok(Self {
            client,
            origin: origin.to_string(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.origin)
        } else {
            format!("{}/{path}", self.origin)
        }
    }
}

impl Network for HttpNetwork {
    async fn fetch(&self, request: &ShellRequest) -> ShellResult<CachedResponse> {
        let url = self.url_for(&request.path);
        tracing::debug!("Fetching {} {url}", request.method);

        let response = self
            .client
            .request(request.method.clone(), &url)
            .send()
            .await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(CachedResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_is_normalized() {
        let network = HttpNetwork::new(" https://vanbox.example/ ").unwrap();
        assert_eq!(network.origin(), "https://vanbox.example");
        assert_eq!(network.url_for("/login"), "https://vanbox.example/login");
        assert_eq!(network.url_for("manifest.json"), "https://vanbox.example/manifest.json");
    }

    #[test]
    fn rejects_bad_origin() {
        assert!(matches!(
            HttpNetwork::new("   "),
            Err(ShellError::InvalidOrigin(_))
        ));
        assert!(matches!(
            HttpNetwork::new("vanbox.example"),
            Err(ShellError::InvalidOrigin(_))
        ));
    }
}
