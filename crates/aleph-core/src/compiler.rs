//! Contract with the module compiler.
//!
//! The compiler is a black box that turns module source into browser
//! executable code and can remove server-only exports from that code.

use async_trait::async_trait;
use bitflags::bitflags;

bitflags! {
    /// Server-only hooks a module declares
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModuleHooks: u8 {
        /// Server-side data fetching (`ssr` props)
        const SSR_PROPS = 0b001;
        /// Static path generation (`ssg` paths)
        const SSG_PATHS = 0b010;
        /// Custom framework hooks that only run on the server
        const CUSTOM = 0b100;
    }
}

impl ModuleHooks {
    pub fn has_server_only(&self) -> bool {
        !self.is_empty()
    }
}

/// Output of one compilation
#[derive(Debug, Clone, Default)]
pub struct CompiledArtifact {
    pub code: String,
    pub hooks: ModuleHooks,
}

impl CompiledArtifact {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            hooks: ModuleHooks::empty(),
        }
    }

    pub fn with_hooks(mut self, hooks: ModuleHooks) -> Self {
        self.hooks = hooks;
        self
    }
}

#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compile `source` of the module `specifier`
    async fn compile(&self, specifier: &str, source: &str) -> anyhow::Result<CompiledArtifact>;

    /// Remove server-only code from already compiled `code`
    async fn strip_server_code(&self, specifier: &str, code: &str) -> anyhow::Result<String>;
}
