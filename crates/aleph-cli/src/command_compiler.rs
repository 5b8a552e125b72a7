//! Compiler backed by external commands from `aleph.config.yaml`.
//!
//! Each command receives the code on stdin and writes the result to stdout.
//! `{specifier}` in an argument is replaced with the module specifier. With
//! no command configured, source passes through unchanged.

use aleph_core::compiler::{CompiledArtifact, Compiler, ModuleHooks};
use aleph_core::config::CompilerConfig;
use anyhow::{bail, Context};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Export prefixes that mark server-only code
const SERVER_EXPORTS: &[(&str, ModuleHooks)] = &[
    ("export const ssr", ModuleHooks::SSR_PROPS),
    ("export const ssg", ModuleHooks::SSG_PATHS),
    ("export function getStaticPaths", ModuleHooks::SSG_PATHS),
];

/// Call marking a module with a custom server hook
const CUSTOM_HOOK_MARKER: &str = "useDeno(";

pub struct CommandCompiler {
    config: CompilerConfig,
    working_dir: PathBuf,
}

impl CommandCompiler {
    pub fn new(config: CompilerConfig, working_dir: PathBuf) -> Self {
        Self {
            config,
            working_dir,
        }
    }

    async fn run(
        &self,
        command: &str,
        args: &[String],
        specifier: &str,
        input: &str,
    ) -> anyhow::Result<String> {
        let args: Vec<String> = args
            .iter()
            .map(|arg| arg.replace("{specifier}", specifier))
            .collect();
        debug!("running {} {:?}", command, args);

        let mut child = Command::new(command)
            .args(&args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start `{command}`"))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .with_context(|| format!("failed to write to `{command}`"))?;
        }

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("failed to wait for `{command}`"))?;
        if !output.status.success() {
            bail!(
                "`{}` exited with {}: {}",
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        String::from_utf8(output.stdout)
            .with_context(|| format!("`{command}` wrote invalid UTF-8"))
    }
}

pub fn detect_hooks(source: &str) -> ModuleHooks {
    let mut hooks = ModuleHooks::empty();
    for line in source.lines().map(str::trim_start) {
        for (prefix, hook) in SERVER_EXPORTS {
            if line.starts_with(prefix) {
                hooks |= *hook;
            }
        }
        if line.contains(CUSTOM_HOOK_MARKER) {
            hooks |= ModuleHooks::CUSTOM;
        }
    }
    hooks
}

/// Drop single-line server-only exports
fn strip_server_exports(code: &str) -> String {
    code.lines()
        .filter(|line| {
            let line = line.trim_start();
            !SERVER_EXPORTS.iter().any(|(prefix, _)| line.starts_with(prefix))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn compile(&self, specifier: &str, source: &str) -> anyhow::Result<CompiledArtifact> {
        let hooks = detect_hooks(source);
        let code = match &self.config.command {
            Some(command) => self.run(command, &self.config.args, specifier, source).await?,
            None => source.to_string(),
        };
        Ok(CompiledArtifact::new(code).with_hooks(hooks))
    }

    async fn strip_server_code(&self, specifier: &str, code: &str) -> anyhow::Result<String> {
        match &self.config.strip_command {
            Some(command) => self.run(command, &self.config.strip_args, specifier, code).await,
            None => Ok(strip_server_exports(code)),
        }
    }
}
