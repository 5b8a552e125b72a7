//! Module cache for the dev server
//!
//! Keeps one compiled record per module specifier and compiles modules on
//! demand when a build-output path has no record yet.

mod gateway;
mod hash;
mod record;
mod store;

pub use gateway::CompilerGateway;
pub use hash::{hash_bytes, hash_parts};
pub use record::{is_hmr_eligible, ModuleRecord};
pub use store::ModuleStore;
