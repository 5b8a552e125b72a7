//! API route dispatch.
//!
//! Handlers are registered up front against their module specifier. A route
//! discovered on disk with no handler is kept as [`ApiExport::NotInvokable`],
//! so it still matches and answers with a "bad handler" error.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use futures::FutureExt;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error};

use crate::context::{JSON_UTF8, TEXT_UTF8};
use crate::routing::{Params, Route, RouteTable};

/// Request view handed to an API handler
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub pathname: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Values bound by the route pattern
    pub params: Params,
    pub query: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// First query value for `name`
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string()).with_content_type(JSON_UTF8)
    }

    pub fn text(status: StatusCode, text: impl Into<String>) -> Self {
        Self::new(status, text.into()).with_content_type(TEXT_UTF8)
    }

    pub fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        self
    }

    /// Error envelope: `{"status": <code>, "message": <message>}`
    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::json(
            status,
            &json!({ "status": status.as_u16(), "message": message }),
        )
    }
}

#[async_trait]
pub trait ApiHandler: Send + Sync {
    async fn handle(&self, request: ApiRequest) -> anyhow::Result<ApiResponse>;
}

/// What an API module exposes, decided when it is registered
#[derive(Clone)]
pub enum ApiExport {
    Handler(Arc<dyn ApiHandler>),
    NotInvokable,
}

impl std::fmt::Debug for ApiExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("Handler"),
            Self::NotInvokable => f.write_str("NotInvokable"),
        }
    }
}

pub struct ApiRegistry {
    routes: RouteTable,
    exports: RwLock<FxHashMap<String, ApiExport>>,
}

impl Default for ApiRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiRegistry {
    pub fn new() -> Self {
        Self {
            routes: RouteTable::new("/api"),
            exports: RwLock::new(FxHashMap::default()),
        }
    }

    /// Register `handler` for the module `specifier` and add its route.
    /// Returns the route pattern, or `None` for a specifier outside `/api`.
    pub fn register(&self, specifier: &str, handler: Arc<dyn ApiHandler>) -> Option<String> {
        let pattern = self.routes.add(specifier)?;
        self.exports
            .write()
            .insert(specifier.to_string(), ApiExport::Handler(handler));
        Some(pattern)
    }

    /// Add a route for a module found on disk. A handler registered earlier
    /// is kept; otherwise the module is not invokable.
    pub fn add_route(&self, specifier: &str) -> Option<String> {
        let pattern = self.routes.add(specifier)?;
        self.exports
            .write()
            .entry(specifier.to_string())
            .or_insert(ApiExport::NotInvokable);
        Some(pattern)
    }

    pub fn remove(&self, specifier: &str) -> bool {
        self.exports.write().remove(specifier);
        self.routes.remove(specifier)
    }

    pub fn owns(&self, specifier: &str) -> bool {
        self.routes.owns(specifier)
    }

    pub fn contains(&self, specifier: &str) -> bool {
        self.routes.contains(specifier)
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes.routes()
    }

    pub fn lookup(&self, pathname: &str) -> Option<(Params, Route, ApiExport)> {
        let (params, route) = self.routes.find(pathname)?;
        let export = self
            .exports
            .read()
            .get(&route.specifier)
            .cloned()
            .unwrap_or(ApiExport::NotInvokable);
        Some((params, route, export))
    }

    /// Route and invoke. Handler faults, panics included, become a 500
    /// envelope; nothing propagates to the caller.
    pub async fn dispatch(
        &self,
        method: Method,
        pathname: &str,
        query: Vec<(String, String)>,
        headers: HeaderMap,
        body: Bytes,
    ) -> ApiResponse {
        let Some((params, route, export)) = self.lookup(pathname) else {
            return ApiResponse::error(StatusCode::NOT_FOUND, "not found");
        };
        let ApiExport::Handler(handler) = export else {
            error!("api module {} has no handler", route.specifier);
            return ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "bad handler");
        };

        debug!("{} {} -> {}", method, pathname, route.specifier);
        let request = ApiRequest {
            method,
            pathname: pathname.to_string(),
            headers,
            body,
            params,
            query,
        };
        match AssertUnwindSafe(handler.handle(request)).catch_unwind().await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!("api handler {} failed: {:#}", route.specifier, e);
                ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("api handler {} panicked: {}", route.specifier, message);
                ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, &message)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ApiHandler for Echo {
        async fn handle(&self, request: ApiRequest) -> anyhow::Result<ApiResponse> {
            Ok(ApiResponse::json(
                StatusCode::OK,
                &json!({
                    "id": request.param("id"),
                    "q": request.query_value("q"),
                }),
            ))
        }
    }

    #[test]
    fn test_registered_handler_survives_discovery() {
        let registry = ApiRegistry::new();
        registry.register("/api/users/[id].ts", Arc::new(Echo));
        registry.add_route("/api/users/[id].ts");
        registry.add_route("/api/raw.ts");

        let (params, _, export) = registry.lookup("/api/users/7").unwrap();
        assert_eq!(params["id"], "7");
        assert!(matches!(export, ApiExport::Handler(_)));

        let (_, _, export) = registry.lookup("/api/raw").unwrap();
        assert!(matches!(export, ApiExport::NotInvokable));
        assert!(registry.register("/lib/x.ts", Arc::new(Echo)).is_none());
    }

    #[tokio::test]
    async fn test_dispatch_passes_params_and_query() {
        let registry = ApiRegistry::new();
        registry.register("/api/users/[id].ts", Arc::new(Echo));

        let response = registry
            .dispatch(
                Method::GET,
                "/api/users/42",
                vec![("q".into(), "x".into())],
                HeaderMap::new(),
                Bytes::new(),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body, json!({"id": "42", "q": "x"}));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(3);
        assert_eq!(panic_message(payload.as_ref()), "handler panicked");
    }
}
