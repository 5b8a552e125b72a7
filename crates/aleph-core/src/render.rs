//! Page rendering contract and the client-side fallback renderer.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::paths::clean_path;
use crate::routing::RouteTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub status: u16,
    pub html: String,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render the page for `pathname`; `search` is the serialized query.
    async fn render_page(&self, pathname: &str, search: &str) -> anyhow::Result<RenderedPage>;

    /// Pre-rendered data of the page at `pathname`, if it has any
    async fn ssr_data(&self, pathname: &str) -> anyhow::Result<Option<Value>>;
}

/// Serves the same HTML shell for every page and leaves rendering to the
/// browser. Unknown pages get a 404 status.
pub struct SpaRenderer {
    pages: Arc<RouteTable>,
    base_path: String,
}

impl SpaRenderer {
    pub fn new(pages: Arc<RouteTable>, base_path: impl Into<String>) -> Self {
        Self {
            pages,
            base_path: base_path.into(),
        }
    }

    fn shell(&self) -> String {
        let main = clean_path(&format!("{}/_aleph/main.js", self.base_path));
        [
            "<!DOCTYPE html>",
            "<html>",
            "<head>",
            "<meta charset=\"utf-8\">",
            "</head>",
            "<body>",
            "<main></main>",
            &format!("<script type=\"module\" src=\"{main}\"></script>"),
            "</body>",
            "</html>",
        ]
        .join("\n")
    }
}

#[async_trait]
impl Renderer for SpaRenderer {
    async fn render_page(&self, pathname: &str, _search: &str) -> anyhow::Result<RenderedPage> {
        let status = if self.pages.find(pathname).is_some() {
            200
        } else {
            404
        };
        Ok(RenderedPage {
            status,
            html: self.shell(),
        })
    }

    async fn ssr_data(&self, _pathname: &str) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }
}
