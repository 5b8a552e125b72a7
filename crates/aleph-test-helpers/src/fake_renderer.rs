use aleph_core::render::{RenderedPage, Renderer};
use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;

/// Renderer that echoes the pathname and query into the HTML and serves
/// data registered with [`FakeRenderer::with_data`].
#[derive(Default)]
pub struct FakeRenderer {
    data: Mutex<FxHashMap<String, Value>>,
    statuses: Mutex<FxHashMap<String, u16>>,
    fail: bool,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renderer whose every call fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_data(self, pathname: &str, data: Value) -> Self {
        self.data.lock().insert(pathname.to_string(), data);
        self
    }

    pub fn with_status(self, pathname: &str, status: u16) -> Self {
        self.statuses.lock().insert(pathname.to_string(), status);
        self
    }

    /// HTML produced for a page
    pub fn html(pathname: &str, search: &str) -> String {
        format!("<html><body>{pathname}?{search}</body></html>")
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render_page(&self, pathname: &str, search: &str) -> anyhow::Result<RenderedPage> {
        if self.fail {
            anyhow::bail!("render exploded");
        }
        let status = self.statuses.lock().get(pathname).copied().unwrap_or(200);
        Ok(RenderedPage {
            status,
            html: Self::html(pathname, search),
        })
    }

    async fn ssr_data(&self, pathname: &str) -> anyhow::Result<Option<Value>> {
        if self.fail {
            anyhow::bail!("data exploded");
        }
        Ok(self.data.lock().get(pathname).cloned())
    }
}
