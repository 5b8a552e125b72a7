use aleph_core::App;
use axum::body::Body;
use axum::http::{HeaderName, Method, Request, Response};
use std::sync::Arc;

pub fn request(method: Method, uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(body.into())
        .expect("build request")
}

pub fn get(uri: &str) -> Request<Body> {
    request(Method::GET, uri, Body::empty())
}

/// GET with one extra header, e.g. `If-None-Match`
pub fn get_with(uri: &str, name: HeaderName, value: &str) -> Request<Body> {
    let mut request = get(uri);
    request
        .headers_mut()
        .insert(name, value.parse().expect("valid header value"));
    request
}

pub async fn send(app: &Arc<App>, request: Request<Body>) -> Response<Body> {
    Arc::clone(app).handle(request).await
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
