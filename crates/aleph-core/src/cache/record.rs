use std::sync::Arc;

use crate::compiler::ModuleHooks;
use crate::paths::{is_remote, js_file_of, trim_module_ext};

/// Compiled state of one module.
///
/// Records are immutable once stored; recompiling a module stores a new
/// record in place of the old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    /// Module identifier, e.g. `/pages/index.tsx`
    pub specifier: String,

    /// Build-relative output path, e.g. `/pages/index.js`
    pub js_file: String,

    /// Compiled code
    pub code: Arc<str>,

    /// Hash of the module source
    pub source_hash: String,

    /// Hash of the compiled code, when compiled output is known
    pub hash: Option<String>,

    pub hooks: ModuleHooks,

    /// Whether clients may hot-reload this module
    pub hmr: bool,
}

impl ModuleRecord {
    pub fn new(specifier: impl Into<String>, code: impl Into<Arc<str>>, source_hash: String) -> Self {
        let specifier = specifier.into();
        Self {
            js_file: js_file_of(&specifier),
            hmr: is_hmr_eligible(&specifier),
            code: code.into(),
            source_hash,
            hash: None,
            hooks: ModuleHooks::empty(),
            specifier,
        }
    }

    pub fn with_hash(mut self, hash: String) -> Self {
        self.hash = Some(hash);
        self
    }

    pub fn with_hooks(mut self, hooks: ModuleHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Cache validator input: the compiled hash reflects the exact bytes a
    /// client receives, so it wins over the source hash.
    pub fn fingerprint(&self) -> &str {
        self.hash.as_deref().unwrap_or(&self.source_hash)
    }
}

const STYLE_EXTS: &[&str] = &[".css", ".pcss", ".sass", ".scss"];

/// Local pages, components, the app and 404 entries, and style sheets can
/// be hot-reloaded.
pub fn is_hmr_eligible(specifier: &str) -> bool {
    if is_remote(specifier) {
        return false;
    }
    if STYLE_EXTS.iter().any(|ext| specifier.ends_with(ext)) {
        return true;
    }
    let stem = trim_module_ext(specifier);
    if stem == specifier {
        return false;
    }
    specifier.starts_with("/pages/")
        || specifier.starts_with("/components/")
        || stem == "/app"
        || stem == "/404"
}
