//! Requests seen by the shell worker and the responses it caches.

use http::{Method, StatusCode};

/// What the requesting context intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// Top-level page navigation
    Document,
    Script,
    Style,
    Image,
    Manifest,
    #[default]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRequest {
    pub method: Method,
    /// Origin-relative path including any query string
    pub path: String,
    pub destination: Destination,
}

impl ShellRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            destination: Destination::Other,
        }
    }

    /// A page navigation to `path`.
    pub fn navigate(path: impl Into<String>) -> Self {
        Self::get(path).with_destination(Destination::Document)
    }

    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub const fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.destination == Destination::Document
    }
}

/// A response body as stored in a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn new(status: StatusCode, content_type: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body: body.into(),
        }
    }

    pub fn html(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status, Some("text/html; charset=utf-8"), body.into())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
