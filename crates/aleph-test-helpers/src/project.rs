use aleph_core::config::ServerConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Project tree in a temporary directory, removed on drop
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp project"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of `rel` inside the project
    pub fn join(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel.trim_start_matches('/'))
    }

    pub fn file(self, rel: &str, content: &str) -> Self {
        self.write(rel, content);
        self
    }

    /// Write `content` to `rel`, creating parent directories
    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, content).expect("write project file");
        path
    }

    pub fn remove(&self, rel: &str) -> PathBuf {
        let path = self.join(rel);
        fs::remove_file(&path).expect("remove project file");
        path
    }

    /// Config loaded from the project's `aleph.config.yaml`, if any
    pub fn config(&self, dev: bool) -> ServerConfig {
        ServerConfig::load(self.path(), dev).expect("load project config")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}
