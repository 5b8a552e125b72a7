use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::{hash_bytes, ModuleRecord, ModuleStore};
use crate::compiler::Compiler;
use crate::error::{Result, ServerError};
use crate::paths::{resolve_under, trim_suffix, MODULE_EXTS};

/// `.tsx`, `.jsx`, `.ts`, `.js`, `.mjs`, then no extension
static CANDIDATE_EXTS: Lazy<Vec<String>> = Lazy::new(|| {
    MODULE_EXTS
        .iter()
        .map(|ext| format!(".{ext}"))
        .chain([String::new()])
        .collect()
});

/// Resolves build-output paths to compiled modules, compiling on demand in
/// development.
pub struct CompilerGateway {
    store: Arc<ModuleStore>,
    compiler: Arc<dyn Compiler>,
    working_dir: PathBuf,
    dev: bool,
}

impl CompilerGateway {
    pub fn new(
        store: Arc<ModuleStore>,
        compiler: Arc<dyn Compiler>,
        working_dir: PathBuf,
        dev: bool,
    ) -> Self {
        Self {
            store,
            compiler,
            working_dir,
            dev,
        }
    }

    pub fn store(&self) -> &Arc<ModuleStore> {
        &self.store
    }

    pub fn compiler(&self) -> &Arc<dyn Compiler> {
        &self.compiler
    }

    /// Find the module served at `js_path` (e.g. `/pages/index.js`).
    ///
    /// Known records win. In development the source is looked up by trying
    /// each module extension, then the bare path; the first file found is
    /// compiled. Returns `Ok(None)` when nothing backs the path.
    pub async fn resolve(&self, js_path: &str) -> Result<Option<Arc<ModuleRecord>>> {
        if let Some(record) = self.store.find_by_js_file(js_path) {
            return Ok(Some(record));
        }
        if !self.dev {
            return Ok(None);
        }

        let stem = trim_suffix(js_path, ".js");
        for ext in CANDIDATE_EXTS.iter() {
            let specifier = format!("{stem}{ext}");
            if self.source_exists(&specifier).await {
                debug!("compiling {} on demand for {}", specifier, js_path);
                return self.compile(&specifier).await.map(Some);
            }
        }
        Ok(None)
    }

    /// Compile `specifier` from disk and store the resulting record,
    /// replacing any previous one.
    pub async fn compile(&self, specifier: &str) -> Result<Arc<ModuleRecord>> {
        let path = resolve_under(&self.working_dir, specifier);
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ServerError::io(&path, e))?;

        let artifact = self
            .compiler
            .compile(specifier, &source)
            .await
            .map_err(|source| ServerError::Compile {
                specifier: specifier.to_string(),
                source,
            })?;

        let hash = hash_bytes(artifact.code.as_bytes());
        let record = Arc::new(
            ModuleRecord::new(specifier, artifact.code, hash_bytes(source.as_bytes()))
                .with_hash(hash)
                .with_hooks(artifact.hooks),
        );
        info!("compiled {}", specifier);

        self.store.insert(Arc::clone(&record));
        Ok(record)
    }

    pub async fn source_exists(&self, specifier: &str) -> bool {
        let path = resolve_under(&self.working_dir, specifier);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.is_file(),
            Err(_) => false,
        }
    }
}
