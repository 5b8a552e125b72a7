//! Code-Variant Selector
//!
//! Decides what a dev client receives for a compiled module: the plain
//! compiled code, or a client-only variant (server code stripped, `hmr`
//! injections applied, hot-context wrapper added).

use glob::Pattern;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

use crate::cache::ModuleRecord;
use crate::compiler::Compiler;
use crate::error::{Result, ServerError};

/// Phase a code injection runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectPhase {
    Hmr,
}

/// Receives the specifier and the current code, returns the new code
pub type CodeTransform = Arc<dyn Fn(&str, String) -> String + Send + Sync>;

struct CodeInject {
    phase: InjectPhase,
    test: Option<Pattern>,
    transform: CodeTransform,
}

/// Registered code injections, applied in registration order
#[derive(Default)]
pub struct CodeInjects {
    injects: RwLock<Vec<CodeInject>>,
}

impl CodeInjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `transform` for `phase`. When `test` is set only specifiers
    /// matching the glob are transformed.
    pub fn register(&self, phase: InjectPhase, test: Option<Pattern>, transform: CodeTransform) {
        self.injects.write().push(CodeInject {
            phase,
            test,
            transform,
        });
    }

    pub fn for_specifier(&self, phase: InjectPhase, specifier: &str) -> Vec<CodeTransform> {
        self.injects
            .read()
            .iter()
            .filter(|inject| inject.phase == phase)
            .filter(|inject| inject.test.as_ref().map_or(true, |p| p.matches(specifier)))
            .map(|inject| Arc::clone(&inject.transform))
            .collect()
    }

    pub fn apply(&self, phase: InjectPhase, specifier: &str, code: String) -> String {
        self.for_specifier(phase, specifier)
            .iter()
            .fold(code, |code, transform| transform(specifier, code))
    }
}

/// Client-only code addressed by `(specifier, fingerprint)`.
///
/// Holds at most one entry per specifier; a lookup with a different
/// fingerprint misses, so recompiling a module invalidates its variant.
#[derive(Debug, Default)]
pub struct VariantCache {
    entries: RwLock<FxHashMap<String, (String, Arc<str>)>>,
}

impl VariantCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, specifier: &str, fingerprint: &str) -> Option<Arc<str>> {
        self.entries
            .read()
            .get(specifier)
            .filter(|(fp, _)| fp == fingerprint)
            .map(|(_, code)| Arc::clone(code))
    }

    pub fn insert(&self, specifier: &str, fingerprint: &str, code: Arc<str>) {
        self.entries
            .write()
            .insert(specifier.to_string(), (fingerprint.to_string(), code));
    }

    pub fn remove(&self, specifier: &str) {
        self.entries.write().remove(specifier);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Wrap module code with the hot-context registration and accept call.
pub fn wrap_hot_module(specifier: &str, code: &str) -> String {
    let specifier = serde_json::Value::String(specifier.to_string());
    [
        format!("import.meta.hot = $createHotContext({specifier});"),
        String::new(),
        code.to_string(),
        String::new(),
        "import.meta.hot.accept();".to_string(),
    ]
    .join("\n")
}

pub struct VariantSelector {
    compiler: Arc<dyn Compiler>,
    cache: VariantCache,
    injects: Arc<CodeInjects>,
}

impl VariantSelector {
    pub fn new(compiler: Arc<dyn Compiler>, injects: Arc<CodeInjects>) -> Self {
        Self {
            compiler,
            cache: VariantCache::new(),
            injects,
        }
    }

    pub fn cache(&self) -> &VariantCache {
        &self.cache
    }

    /// Code to serve for `record`
    pub async fn select(&self, record: &ModuleRecord, dev: bool) -> Result<Arc<str>> {
        if !dev || !record.hmr || !record.hooks.has_server_only() {
            return Ok(Arc::clone(&record.code));
        }

        let client_code = self.client_only(record).await?;
        let code = self.injects.apply(
            InjectPhase::Hmr,
            &record.specifier,
            client_code.to_string(),
        );
        Ok(wrap_hot_module(&record.specifier, &code).into())
    }

    async fn client_only(&self, record: &ModuleRecord) -> Result<Arc<str>> {
        let fingerprint = record.fingerprint();
        if let Some(code) = self.cache.get(&record.specifier, fingerprint) {
            return Ok(code);
        }

        debug!("stripping server code from {}", record.specifier);
        let stripped: Arc<str> = self
            .compiler
            .strip_server_code(&record.specifier, &record.code)
            .await
            .map_err(|source| ServerError::Strip {
                specifier: record.specifier.clone(),
                source,
            })?
            .into();
        self.cache
            .insert(&record.specifier, fingerprint, Arc::clone(&stripped));
        Ok(stripped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_hot_module() {
        let wrapped = wrap_hot_module("/pages/\"q\".tsx", "export default 1");
        assert_eq!(
            wrapped,
            "import.meta.hot = $createHotContext(\"/pages/\\\"q\\\".tsx\");\n\nexport default 1\n\nimport.meta.hot.accept();"
        );
    }

    #[test]
    fn test_injects_apply_in_order_and_filter() {
        let injects = CodeInjects::new();
        injects.register(
            InjectPhase::Hmr,
            None,
            Arc::new(|_: &str, code: String| format!("{code}+a")),
        );
        injects.register(
            InjectPhase::Hmr,
            Some(Pattern::new("/components/**").unwrap()),
            Arc::new(|_: &str, code: String| format!("{code}+b")),
        );
        injects.register(
            InjectPhase::Hmr,
            None,
            Arc::new(|specifier: &str, code: String| format!("{code}+{specifier}")),
        );

        assert_eq!(
            injects.apply(InjectPhase::Hmr, "/pages/x.tsx", "c".into()),
            "c+a+/pages/x.tsx"
        );
        assert_eq!(
            injects.apply(InjectPhase::Hmr, "/components/y.tsx", "c".into()),
            "c+a+b+/components/y.tsx"
        );
    }

    #[test]
    fn test_variant_cache_keyed_by_fingerprint() {
        let cache = VariantCache::new();
        cache.insert("/pages/a.tsx", "fp1", "one".into());
        assert_eq!(cache.get("/pages/a.tsx", "fp1").as_deref(), Some("one"));
        assert!(cache.get("/pages/a.tsx", "fp2").is_none());

        cache.insert("/pages/a.tsx", "fp2", "two".into());
        assert!(cache.get("/pages/a.tsx", "fp1").is_none());
        assert_eq!(cache.len(), 1);
    }
}
