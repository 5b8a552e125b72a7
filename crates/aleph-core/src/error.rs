use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while serving a request or preparing the application.
///
/// Anything that reaches the dispatcher's outermost boundary is rendered as
/// a 500 page; handler faults are caught earlier and never become a
/// `ServerError`.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("compile {specifier}: {source}")]
    Compile {
        specifier: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("strip server code from {specifier}: {source}")]
    Strip {
        specifier: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("render {pathname}: {source}")]
    Render {
        pathname: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("read request body: {0}")]
    Body(#[from] axum::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
