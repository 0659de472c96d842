// src/http.rs - shared HTTP client plumbing for adapters, scanner and uploads
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;

pub const STATUS_USER_AGENT: &str = "PrintFleet Status";
pub const SCAN_USER_AGENT: &str = "PrintFleet NetScan";
pub const UPLOAD_USER_AGENT: &str = "PrintFleet Upload";

/// Upper bound on how much of a fingerprinted page is read.
pub const PAGE_BODY_LIMIT: usize = 8192;

/// Why a single request did not yield usable data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("authentication rejected (HTTP {0})")]
    Auth(u16),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Parse(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl FetchError {
    pub fn is_auth(&self) -> bool {
        matches!(self, FetchError::Auth(_))
    }

    /// True when no HTTP response was received at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, FetchError::Timeout | FetchError::Connect(_))
    }

    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            code @ (401 | 403) => FetchError::Auth(code),
            code => FetchError::Status(code),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_connect() {
            FetchError::Connect(e.to_string())
        } else if e.is_decode() {
            FetchError::Parse(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::from_status(status)
        } else {
            FetchError::Request(e.to_string())
        }
    }
}

/// Build a client with a per-request timeout. Certificate validation is off: printers on the
/// LAN almost always serve self-signed certificates.
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<Client, FetchError> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| FetchError::Request(e.to_string()))
}

/// Build a header map, skipping entries whose value is not a valid header value.
pub fn headers<'a>(pairs: impl IntoIterator<Item = (&'static str, &'a str)>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                map.insert(HeaderName::from_static(name), v);
            }
            Err(_) => tracing::warn!("Dropping invalid value for header {}", name),
        }
    }
    map
}

/// GET a JSON document. Non-2xx statuses become errors; 401/403 are reported as [`FetchError::Auth`].
pub async fn fetch_json(client: &Client, url: &str, headers: HeaderMap) -> Result<Value, FetchError> {
    tracing::debug!("GET {}", url);
    let response = client.get(url).headers(headers).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::from_status(status));
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
}

/// A fetched page, truncated to [`PAGE_BODY_LIMIT`] bytes.
#[derive(Debug, Clone)]
pub struct Page {
    pub status: u16,
    pub server: Option<String>,
    pub body: String,
}

/// GET a page regardless of its status code.
pub async fn fetch_page(client: &Client, url: &str) -> Result<Page, FetchError> {
    tracing::debug!("GET {}", url);
    let mut response = client.get(url).send().await?;
    let status = response.status().as_u16();
    let server = response
        .headers()
        .get(reqwest::header::SERVER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        body.extend_from_slice(&chunk);
        if body.len() >= PAGE_BODY_LIMIT {
            body.truncate(PAGE_BODY_LIMIT);
            break;
        }
    }
    Ok(Page {
        status,
        server,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_statuses_are_distinguished() {
        assert_eq!(FetchError::from_status(StatusCode::UNAUTHORIZED), FetchError::Auth(401));
        assert_eq!(FetchError::from_status(StatusCode::FORBIDDEN), FetchError::Auth(403));
        assert_eq!(FetchError::from_status(StatusCode::CONFLICT), FetchError::Status(409));
        assert!(FetchError::Auth(401).is_auth());
        assert!(FetchError::Timeout.is_unreachable());
        assert!(!FetchError::Status(500).is_unreachable());
    }

    #[test]
    fn test_headers_skip_invalid_values() {
        let map = headers([("x-api-key", "abc"), ("authorization", "Bearer bad\nvalue")]);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("x-api-key").unwrap(), "abc");
    }
}
