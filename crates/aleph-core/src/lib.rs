pub mod api;
pub mod app;
pub mod bundle;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod context;
pub mod delivery;
pub mod error;
pub mod hmr;
pub mod locator;
pub mod paths;
pub mod render;
pub mod routing;
pub mod server;
pub mod variant;
pub mod watch;

// Re-export the types an embedding server needs
pub use api::{ApiExport, ApiHandler, ApiRegistry, ApiRequest, ApiResponse};
pub use app::{App, AppBuilder};
pub use cache::{CompilerGateway, ModuleRecord, ModuleStore};
pub use compiler::{CompiledArtifact, Compiler, ModuleHooks};
pub use config::{CompilerConfig, ServerConfig, VERSION};
pub use error::{Result, ServerError};
pub use hmr::{HmrChannel, WatchHub};
pub use render::{RenderedPage, Renderer, SpaRenderer};
pub use variant::{CodeInjects, CodeTransform, InjectPhase};
pub use watch::{ChangeRouter, FsChange};
