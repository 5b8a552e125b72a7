//! Request dispatch: every request is classified once and answered by
//! exactly one branch.

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use futures::{future, SinkExt, StreamExt};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::api::ApiResponse;
use crate::app::App;
use crate::bundle::main_js;
use crate::context::{RequestContext, HTML_UTF8, JSON_UTF8, JS_UTF8, TEXT_UTF8};
use crate::delivery::Validator;
use crate::error::{Result, ServerError};
use crate::hmr::Frame;
use crate::locator::{classify, normalize, BuildAsset, Resource};
use crate::paths::{content_type, decode_base64_url, resolve_under};

impl App {
    /// Router sending every request through [`App::handle`]
    pub fn router(self: Arc<Self>) -> Router {
        Router::new().fallback(move |request: Request| {
            let app = Arc::clone(&self);
            async move { app.handle(request).await }
        })
    }

    /// Answer one request. Errors that escape dispatch become a 500 page;
    /// the server keeps serving.
    pub async fn handle(self: Arc<Self>, request: Request) -> Response<Body> {
        let started = Instant::now();
        let method = request.method().clone();
        let uri = request.uri().clone();

        let response = match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                error!("{} {} failed: {}", method, uri, error_chain(&e));
                error_page(&e)
            }
        };
        debug!(
            "{} {} {} in {:?}",
            method,
            uri,
            response.status().as_u16(),
            started.elapsed()
        );
        response
    }

    async fn dispatch(self: &Arc<Self>, request: Request) -> Result<Response<Body>> {
        let config = self.config();
        let raw = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = normalize(raw, &config.base_path, &config.rewrites);
        let resource = classify(&url, &config.public_root()).await;
        let ctx = RequestContext::new(url, self.default_headers().clone(), self.dev());

        match resource {
            Resource::Hmr => Ok(self.upgrade_hmr(request).await),
            Resource::BuildAsset(BuildAsset::SsrData { encoded }) => {
                self.serve_ssr_data(ctx, &encoded).await
            }
            Resource::BuildAsset(BuildAsset::MainBundle) => {
                let code = main_js(&config.base_path, self.dev(), self.pages());
                Ok(ctx.send(code, JS_UTF8))
            }
            Resource::BuildAsset(BuildAsset::Artifact { rel_path }) => {
                self.serve_artifact(ctx, &rel_path, request.headers()).await
            }
            Resource::Static(path) => serve_file(ctx, &path, request.headers()).await,
            Resource::Api => self.serve_api(ctx, request).await,
            Resource::Page => self.serve_page(ctx).await,
        }
    }

    async fn upgrade_hmr(self: &Arc<Self>, request: Request) -> Response<Body> {
        let (mut parts, _) = request.into_parts();
        match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(ws) => {
                let app = Arc::clone(self);
                ws.on_upgrade(move |socket| async move { app.run_hmr(socket).await })
            }
            Err(rejection) => rejection.into_response(),
        }
    }

    async fn run_hmr(&self, socket: WebSocket) {
        let (mut sink, stream) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let writer = tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        let incoming = stream.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Frame::Text(text.as_str().to_string())),
                Ok(Message::Close(_)) | Err(_) => Some(Frame::Close),
                Ok(_) => None,
            })
        });
        self.hmr_channel().run(incoming, tx).await;
        writer.abort();
    }

    async fn serve_ssr_data(&self, ctx: RequestContext, encoded: &str) -> Result<Response<Body>> {
        let Some(pathname) = decode_base64_url(encoded) else {
            return Ok(null_data(ctx));
        };
        let data = self
            .renderer()
            .ssr_data(&pathname)
            .await
            .map_err(|source| ServerError::Render {
                pathname: pathname.clone(),
                source,
            })?;
        match data {
            Some(data) => Ok(ctx.json(StatusCode::OK, &data)),
            None => Ok(null_data(ctx)),
        }
    }

    /// Compiled modules go through validation and variant selection;
    /// anything else is looked up in the build directory.
    async fn serve_artifact(
        &self,
        ctx: RequestContext,
        rel_path: &str,
        request_headers: &HeaderMap,
    ) -> Result<Response<Body>> {
        if rel_path.ends_with(".js") {
            if let Some(record) = self.gateway().resolve(rel_path).await? {
                let validator =
                    Validator::for_module(&self.config().build_version, record.fingerprint());
                if validator.matches(request_headers) {
                    return Ok(ctx.not_modified());
                }
                let code = self.variants().select(&record, self.dev()).await?;
                let mut ctx = ctx;
                ctx.set_header(validator.header(), validator.value());
                return Ok(ctx.send(code.to_string(), JS_UTF8));
            }
        }

        let file = resolve_under(&self.config().build_root(), rel_path);
        if is_file(&file).await {
            return serve_file(ctx, &file, request_headers).await;
        }
        let mut ctx = ctx;
        ctx.set_status(StatusCode::NOT_FOUND);
        Ok(ctx.send("file not found", TEXT_UTF8))
    }

    async fn serve_api(&self, ctx: RequestContext, request: Request) -> Result<Response<Body>> {
        let (parts, body) = request.into_parts();
        let limit = self.config().max_body_size;
        let body = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                warn!("{} body exceeds {} bytes", ctx.url.pathname, limit);
                let response =
                    ApiResponse::error(StatusCode::PAYLOAD_TOO_LARGE, "request body too large");
                return Ok(finish_api(ctx, response));
            }
            Err(e) => return Err(ServerError::Body(axum::Error::new(e))),
        };
        let response = self
            .apis()
            .dispatch(
                parts.method,
                &ctx.url.pathname,
                ctx.url.query.clone(),
                parts.headers,
                body,
            )
            .await;
        Ok(finish_api(ctx, response))
    }

    async fn serve_page(&self, ctx: RequestContext) -> Result<Response<Body>> {
        let pathname = ctx.url.pathname.clone();
        let page = self
            .renderer()
            .render_page(&pathname, &ctx.url.search)
            .await
            .map_err(|source| ServerError::Render {
                pathname: pathname.clone(),
                source,
            })?;

        let status = StatusCode::from_u16(page.status).map_err(|_| ServerError::Render {
            pathname,
            source: anyhow::anyhow!("renderer returned invalid status {}", page.status),
        })?;

        let mut ctx = ctx;
        ctx.set_status(status);
        Ok(ctx.send(page.html, HTML_UTF8))
    }
}

fn finish_api(mut ctx: RequestContext, response: ApiResponse) -> Response<Body> {
    ctx.set_status(response.status).merge_headers(response.headers);
    ctx.body(response.body)
}

/// File body with `Last-Modified` validation
async fn serve_file(
    ctx: RequestContext,
    path: &Path,
    request_headers: &HeaderMap,
) -> Result<Response<Body>> {
    let validator = Validator::for_file(path).await;
    if validator.matches(request_headers) {
        return Ok(ctx.not_modified());
    }
    let body = tokio::fs::read(path)
        .await
        .map_err(|e| ServerError::io(path, e))?;

    let mut ctx = ctx;
    ctx.set_header(validator.header(), validator.value());
    Ok(ctx.send(body, &content_type(path)))
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

fn null_data(mut ctx: RequestContext) -> Response<Body> {
    ctx.set_status(StatusCode::NOT_FOUND);
    ctx.send(Value::Null.to_string(), JSON_UTF8)
}

/// `e` followed by each of its sources, one per line
pub fn error_chain(e: &dyn std::error::Error) -> String {
    let mut chain = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        chain.push_str("\n  caused by: ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

fn error_page(e: &ServerError) -> Response<Body> {
    let html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>500 - internal server error</title>\n</head>\n<body>\n<h1>500 - {}</h1>\n<pre>{}</pre>\n</body>\n</html>",
        escape_html(&e.to_string()),
        escape_html(&error_chain(e)),
    );
    let mut response = Response::new(Body::from(html));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(HTML_UTF8));
    response
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
