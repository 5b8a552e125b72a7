//! Server configuration loaded from `aleph.config.yaml`.
//!
//! Every field has a default so an empty (or missing) file yields a working
//! configuration. Paths are resolved against the working directory by
//! [`ServerConfig::public_root`] and [`ServerConfig::build_root`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, ServerError};

/// Config file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "aleph.config.yaml";

/// Largest API request body read into memory (2 MiB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Server build version; salts every module ETag
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Project root; specifiers are resolved against it
    #[serde(skip)]
    pub working_dir: PathBuf,

    /// Development mode (on-demand compilation, HMR, no browser caching)
    #[serde(skip)]
    pub dev: bool,

    /// URL prefix the app is mounted under
    pub base_path: String,

    /// Ordered rewrite rules: route pattern -> target pattern
    pub rewrites: IndexMap<String, String>,

    /// Headers added to every response
    pub headers: IndexMap<String, String>,

    /// Mixed into module ETags so a new server build invalidates client caches
    pub build_version: String,

    /// Directory of hand-authored public files, relative to the working dir
    pub public_dir: PathBuf,

    /// Directory of build output served under `/_aleph/`
    pub build_dir: PathBuf,

    /// API request bodies above this many bytes are rejected with 413
    pub max_body_size: usize,

    pub compiler: CompilerConfig,
}

/// External compiler invocation used by the CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerConfig {
    /// Command that reads module source on stdin and writes JavaScript to stdout
    pub command: Option<String>,
    pub args: Vec<String>,

    /// Command that removes server-only exports from compiled code
    pub strip_command: Option<String>,
    pub strip_args: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            dev: false,
            base_path: "/".to_string(),
            rewrites: IndexMap::new(),
            headers: IndexMap::new(),
            build_version: VERSION.to_string(),
            public_dir: PathBuf::from("public"),
            build_dir: PathBuf::from(".aleph"),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            compiler: CompilerConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load `aleph.config.yaml` from `working_dir`, falling back to defaults
    /// when the file does not exist.
    pub fn load(working_dir: &Path, dev: bool) -> Result<Self> {
        let path = working_dir.join(CONFIG_FILE_NAME);
        let mut config = if path.is_file() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| ServerError::io(&path, e))?;
            Self::from_yaml(&content).map_err(|source| ServerError::Config { path, source })?
        } else {
            Self::default()
        };

        config.working_dir = working_dir.to_path_buf();
        config.dev = dev;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Normalize the base path and reject values the locator cannot use.
    pub fn validate(&mut self) -> Result<()> {
        if !self.base_path.starts_with('/') {
            return Err(ServerError::InvalidConfig(format!(
                "basePath must start with '/': {}",
                self.base_path
            )));
        }
        self.base_path = crate::paths::clean_path(&self.base_path);
        if self.build_version.is_empty() {
            self.build_version = VERSION.to_string();
        }
        Ok(())
    }

    pub fn public_root(&self) -> PathBuf {
        self.working_dir.join(&self.public_dir)
    }

    pub fn build_root(&self) -> PathBuf {
        self.working_dir.join(&self.build_dir)
    }
}
