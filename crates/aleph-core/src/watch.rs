//! Turns filesystem changes in the project into cache updates, route
//! updates and HMR events.

use serde_json::{json, Map, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::app::App;
use crate::cache::is_hmr_eligible;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsChange {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
}

impl FsChange {
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(path) | Self::Modified(path) | Self::Removed(path) => path,
        }
    }
}

pub struct ChangeRouter {
    app: Arc<App>,
}

impl ChangeRouter {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    /// Specifier of a watched project file, `None` for paths the server
    /// does not track.
    pub fn specifier_of(&self, path: &Path) -> Option<String> {
        let config = self.app.config();
        if path.starts_with(config.public_root()) || path.starts_with(config.build_root()) {
            return None;
        }
        let rel = path.strip_prefix(&config.working_dir).ok()?;

        let mut segments = Vec::new();
        for component in rel.components() {
            let Component::Normal(name) = component else {
                return None;
            };
            let name = name.to_str()?;
            if name.starts_with('.') || name == "node_modules" {
                return None;
            }
            segments.push(name);
        }
        if segments.is_empty() {
            return None;
        }
        Some(format!("/{}", segments.join("/")))
    }

    pub async fn apply(&self, change: FsChange) -> Result<()> {
        let Some(specifier) = self.specifier_of(change.path()) else {
            return Ok(());
        };
        // editors saving through a rename report a known file as created
        match change {
            FsChange::Removed(_) => {
                self.removed(&specifier);
                Ok(())
            }
            _ if self.app.store().contains(&specifier) => self.modified(&specifier).await,
            // routed but never compiled: the next request compiles it fresh
            _ if self.is_routed(&specifier) => {
                debug!("{} changed; nothing compiled yet", specifier);
                Ok(())
            }
            _ => self.created(&specifier).await,
        }
    }

    fn is_routed(&self, specifier: &str) -> bool {
        self.app.pages().contains(specifier) || self.app.apis().contains(specifier)
    }

    async fn modified(&self, specifier: &str) -> Result<()> {
        let previous = self.app.store().get(specifier);
        let record = self.app.gateway().compile(specifier).await?;

        if let Some(previous) = previous {
            if previous.fingerprint() == record.fingerprint() {
                debug!("{} unchanged after recompile", specifier);
                return Ok(());
            }
            let mut payload = Map::new();
            payload.insert(
                "refreshPage".into(),
                Value::Bool(previous.hooks != record.hooks),
            );
            info!("modified {}", specifier);
            self.app.hub().emit_modify(specifier, payload);
        }
        Ok(())
    }

    async fn created(&self, specifier: &str) -> Result<()> {
        let pages = self.app.pages();
        let apis = self.app.apis();
        let is_api = apis.owns(specifier);
        if !pages.owns(specifier) && !is_api && !is_hmr_eligible(specifier) {
            return Ok(());
        }

        if !is_api {
            self.app.gateway().compile(specifier).await?;
        }
        let route = if is_api {
            apis.add_route(specifier)
        } else {
            pages.add(specifier)
        };

        let mut module = Map::new();
        module.insert("specifier".into(), json!(specifier));
        if let Some(route) = route {
            module.insert("routePath".into(), json!(route));
        }
        info!("added {}", specifier);
        self.app.hub().emit_add(module);
        Ok(())
    }

    fn removed(&self, specifier: &str) {
        let known = self.app.store().remove(specifier).is_some();
        let routed = self.app.pages().remove(specifier) | self.app.apis().remove(specifier);
        self.app.variants().cache().remove(specifier);
        if known || routed {
            info!("removed {}", specifier);
            self.app.hub().emit_remove(specifier);
        }
    }
}
