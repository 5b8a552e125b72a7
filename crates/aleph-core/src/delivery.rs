//! Conditional delivery: cache validators and the not-modified short cut.

use axum::http::header::{HeaderName, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use axum::http::HeaderMap;
use std::path::Path;
use std::time::SystemTime;

use crate::cache::hash_parts;
use crate::paths::http_date;

/// A derived validator; never stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validator {
    /// For generated code: fingerprint salted with the build version
    ETag(String),
    /// For files: modification time
    LastModified(String),
}

impl Validator {
    pub fn for_module(build_version: &str, fingerprint: &str) -> Self {
        Self::ETag(format!("\"{}\"", hash_parts(&[build_version, fingerprint])))
    }

    /// Uses the current time when the modification time is unavailable.
    pub async fn for_file(path: &Path) -> Self {
        let modified = tokio::fs::metadata(path)
            .await
            .and_then(|meta| meta.modified())
            .unwrap_or_else(|_| SystemTime::now());
        Self::LastModified(http_date(modified))
    }

    pub fn value(&self) -> &str {
        match self {
            Self::ETag(v) | Self::LastModified(v) => v,
        }
    }

    /// Response header carrying this validator
    pub fn header(&self) -> HeaderName {
        match self {
            Self::ETag(_) => ETAG,
            Self::LastModified(_) => LAST_MODIFIED,
        }
    }

    /// Request header the client echoes it back in
    pub fn request_header(&self) -> HeaderName {
        match self {
            Self::ETag(_) => IF_NONE_MATCH,
            Self::LastModified(_) => IF_MODIFIED_SINCE,
        }
    }

    /// Exact match against the client's validator
    pub fn matches(&self, request_headers: &HeaderMap) -> bool {
        request_headers
            .get(self.request_header())
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == self.value())
    }
}
