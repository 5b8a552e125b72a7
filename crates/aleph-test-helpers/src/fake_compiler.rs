use aleph_core::compiler::{CompiledArtifact, Compiler, ModuleHooks};
use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Marker lines the fake treats as server-only code
const SERVER_MARKERS: &[(&str, ModuleHooks)] = &[
    ("export const ssr", ModuleHooks::SSR_PROPS),
    ("export const ssg", ModuleHooks::SSG_PATHS),
    ("useDeno(", ModuleHooks::CUSTOM),
];

/// Compiler that prefixes the source with a banner comment and detects hooks
/// by marker lines. Stripping removes those lines.
#[derive(Default)]
pub struct FakeCompiler {
    compiles: AtomicUsize,
    strips: AtomicUsize,
    failing: Mutex<FxHashSet<String>>,
}

impl FakeCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later compilation of `specifier` fail
    pub fn fail_on(&self, specifier: &str) {
        self.failing.lock().insert(specifier.to_string());
    }

    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    pub fn strip_count(&self) -> usize {
        self.strips.load(Ordering::SeqCst)
    }

    /// What `compile` produces for `source`
    pub fn compiled(specifier: &str, source: &str) -> String {
        format!("/* compiled {specifier} */\n{source}")
    }

    fn hooks(source: &str) -> ModuleHooks {
        SERVER_MARKERS
            .iter()
            .filter(|(marker, _)| source.contains(marker))
            .fold(ModuleHooks::empty(), |hooks, (_, hook)| hooks | *hook)
    }
}

#[async_trait]
impl Compiler for FakeCompiler {
    async fn compile(&self, specifier: &str, source: &str) -> anyhow::Result<CompiledArtifact> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().contains(specifier) {
            anyhow::bail!("unexpected token in {}", specifier);
        }
        Ok(CompiledArtifact::new(Self::compiled(specifier, source))
            .with_hooks(Self::hooks(source)))
    }

    async fn strip_server_code(&self, _specifier: &str, code: &str) -> anyhow::Result<String> {
        self.strips.fetch_add(1, Ordering::SeqCst);
        let kept: Vec<&str> = code
            .lines()
            .filter(|line| !SERVER_MARKERS.iter().any(|(marker, _)| line.contains(marker)))
            .collect();
        Ok(kept.join("\n"))
    }
}
