//! Long-lived application context shared by every request and HMR channel.

use axum::http::HeaderMap;
use glob::Pattern;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::api::{ApiHandler, ApiRegistry};
use crate::cache::{CompilerGateway, ModuleStore};
use crate::compiler::Compiler;
use crate::config::ServerConfig;
use crate::context::default_headers;
use crate::hmr::{HmrChannel, WatchHub};
use crate::paths::module_ext;
use crate::render::{Renderer, SpaRenderer};
use crate::routing::RouteTable;
use crate::variant::{CodeInjects, CodeTransform, InjectPhase, VariantSelector};

pub struct App {
    config: ServerConfig,
    headers: HeaderMap,
    gateway: CompilerGateway,
    variants: VariantSelector,
    hub: WatchHub,
    pages: Arc<RouteTable>,
    apis: ApiRegistry,
    renderer: Arc<dyn Renderer>,
}

impl App {
    pub fn builder(config: ServerConfig, compiler: Arc<dyn Compiler>) -> AppBuilder {
        AppBuilder {
            config,
            compiler,
            renderer: None,
            store: None,
            injects: Arc::new(CodeInjects::new()),
            handlers: Vec::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn dev(&self) -> bool {
        self.config.dev
    }

    /// Response headers every request starts from
    pub fn default_headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn store(&self) -> &Arc<ModuleStore> {
        self.gateway.store()
    }

    pub fn gateway(&self) -> &CompilerGateway {
        &self.gateway
    }

    pub fn variants(&self) -> &VariantSelector {
        &self.variants
    }

    pub fn hub(&self) -> &WatchHub {
        &self.hub
    }

    pub fn pages(&self) -> &Arc<RouteTable> {
        &self.pages
    }

    pub fn apis(&self) -> &ApiRegistry {
        &self.apis
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    pub fn hmr_channel(&self) -> HmrChannel {
        HmrChannel::new(
            self.hub.clone(),
            Arc::clone(self.store()),
            self.config.base_path.clone(),
        )
    }
}

pub struct AppBuilder {
    config: ServerConfig,
    compiler: Arc<dyn Compiler>,
    renderer: Option<Arc<dyn Renderer>>,
    store: Option<Arc<ModuleStore>>,
    injects: Arc<CodeInjects>,
    handlers: Vec<(String, Arc<dyn ApiHandler>)>,
}

impl AppBuilder {
    /// Defaults to [`SpaRenderer`]
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn store(mut self, store: Arc<ModuleStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Handler for the API module `specifier`, e.g. `/api/users/[id].ts`
    pub fn api_handler(mut self, specifier: impl Into<String>, handler: Arc<dyn ApiHandler>) -> Self {
        self.handlers.push((specifier.into(), handler));
        self
    }

    pub fn inject(self, phase: InjectPhase, test: Option<Pattern>, transform: CodeTransform) -> Self {
        self.injects.register(phase, test, transform);
        self
    }

    pub fn build(self) -> Arc<App> {
        let config = self.config;
        let store = self.store.unwrap_or_default();
        let pages = Arc::new(RouteTable::new("/pages"));
        let apis = ApiRegistry::new();

        for (specifier, handler) in self.handlers {
            if apis.register(&specifier, handler).is_none() {
                warn!("ignoring api handler for {}: not an api module", specifier);
            }
        }
        for specifier in discover_modules(&config.working_dir, "pages") {
            pages.add(&specifier);
        }
        for specifier in discover_modules(&config.working_dir, "api") {
            apis.add_route(&specifier);
        }
        info!(
            "found {} page routes and {} api routes",
            pages.len(),
            apis.routes().len()
        );

        let renderer = self.renderer.unwrap_or_else(|| {
            Arc::new(SpaRenderer::new(
                Arc::clone(&pages),
                config.base_path.clone(),
            ))
        });
        let gateway = CompilerGateway::new(
            store,
            Arc::clone(&self.compiler),
            config.working_dir.clone(),
            config.dev,
        );

        Arc::new(App {
            headers: default_headers(&config.headers, config.dev),
            variants: VariantSelector::new(self.compiler, self.injects),
            gateway,
            hub: WatchHub::new(),
            pages,
            apis,
            renderer,
            config,
        })
    }
}

/// Module specifiers below `<working_dir>/<dir>`, sorted
pub fn discover_modules(working_dir: &Path, dir: &str) -> Vec<String> {
    let root = working_dir.join(dir);
    if !root.is_dir() {
        return Vec::new();
    }

    let mut specifiers = Vec::new();
    for entry in WalkDir::new(&root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(working_dir) else {
            continue;
        };
        let specifier = format!(
            "/{}",
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        );
        if module_ext(&specifier).is_some() {
            debug!("discovered {}", specifier);
            specifiers.push(specifier);
        }
    }
    specifiers.sort();
    specifiers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_discover_modules() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("pages/blog")).unwrap();
        fs::write(dir.path().join("pages/index.tsx"), "").unwrap();
        fs::write(dir.path().join("pages/blog/[slug].tsx"), "").unwrap();
        fs::write(dir.path().join("pages/notes.md"), "").unwrap();

        assert_eq!(
            discover_modules(dir.path(), "pages"),
            vec!["/pages/blog/[slug].tsx", "/pages/index.tsx"]
        );
        assert!(discover_modules(dir.path(), "api").is_empty());
    }
}
