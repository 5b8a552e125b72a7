use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, Response, StatusCode};
use indexmap::IndexMap;
use tracing::warn;

use crate::locator::NormalizedUrl;

pub const JSON_UTF8: &str = "application/json; charset=utf-8";
pub const HTML_UTF8: &str = "text/html; charset=utf-8";
pub const JS_UTF8: &str = "application/javascript; charset=utf-8";
pub const TEXT_UTF8: &str = "text/plain; charset=utf-8";

/// Parse configured headers once; invalid entries are skipped with a warning.
pub fn default_headers(configured: &IndexMap<String, String>, dev: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in configured {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("ignoring invalid header in config: {}: {}", name, value),
        }
    }
    // dev relies on ETag / Last-Modified instead of browser caching
    if dev {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    }
    headers
}

/// Per-request response state.
///
/// Header and status writes are last-write-wins. The finishing methods take
/// `self`, so nothing can be written after the response is built.
#[derive(Debug)]
pub struct RequestContext {
    pub url: NormalizedUrl,
    pub dev: bool,
    status: StatusCode,
    headers: HeaderMap,
}

impl RequestContext {
    pub fn new(url: NormalizedUrl, headers: HeaderMap, dev: bool) -> Self {
        Self {
            url,
            dev,
            status: StatusCode::OK,
            headers,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    pub fn header(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    /// Values that are not valid header text are dropped with a warning.
    pub fn set_header(&mut self, name: HeaderName, value: &str) -> &mut Self {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => warn!("dropping invalid {} header value", name),
        }
        self
    }

    /// Copy `headers` over the current ones
    pub fn merge_headers(&mut self, headers: HeaderMap) -> &mut Self {
        for (name, value) in headers {
            if let Some(name) = name {
                self.headers.insert(name, value);
            }
        }
        self
    }

    pub fn send(mut self, body: impl Into<Body>, content_type: &str) -> Response<Body> {
        self.set_header(CONTENT_TYPE, content_type);
        self.finish(body.into())
    }

    pub fn json(mut self, status: StatusCode, value: &serde_json::Value) -> Response<Body> {
        self.status = status;
        self.send(value.to_string(), JSON_UTF8)
    }

    /// Finish with the headers already set, adding no content type
    pub fn body(self, body: impl Into<Body>) -> Response<Body> {
        self.finish(body.into())
    }

    /// Empty 304 response
    pub fn not_modified(mut self) -> Response<Body> {
        self.status = StatusCode::NOT_MODIFIED;
        self.finish(Body::empty())
    }

    fn finish(self, body: Body) -> Response<Body> {
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::normalize;

    fn ctx(dev: bool) -> RequestContext {
        let mut configured = IndexMap::new();
        configured.insert("X-Powered-By".to_string(), "aleph".to_string());
        configured.insert("bad header".to_string(), "x".to_string());
        let url = normalize("/", "/", &IndexMap::new());
        RequestContext::new(url, default_headers(&configured, dev), dev)
    }

    #[test]
    fn test_seeded_headers() {
        let response = ctx(true).send("hi", TEXT_UTF8);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-powered-by"], "aleph");
        assert_eq!(response.headers()[CACHE_CONTROL], "max-age=0");
        assert_eq!(response.headers().len(), 3);

        let response = ctx(false).send("hi", TEXT_UTF8);
        assert!(response.headers().get(CACHE_CONTROL).is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let mut ctx = ctx(false);
        ctx.set_status(StatusCode::NOT_FOUND)
            .set_header(HeaderName::from_static("etag"), "\"a\"")
            .set_header(HeaderName::from_static("etag"), "\"b\"");
        ctx.set_status(StatusCode::CREATED);
        let response = ctx.send("", TEXT_UTF8);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["etag"], "\"b\"");
    }

    #[test]
    fn test_not_modified_is_empty() {
        let response = ctx(true).not_modified();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(response.headers().get(CONTENT_TYPE).is_none());
    }
}
