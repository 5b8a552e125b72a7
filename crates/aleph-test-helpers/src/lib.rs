//! Test utilities for the Aleph dev server
//!
//! Fakes for the compiler and renderer collaborators, a temporary project
//! builder and request/response helpers.

mod fake_compiler;
mod fake_renderer;
mod http;
mod project;

pub use fake_compiler::FakeCompiler;
pub use fake_renderer::FakeRenderer;
pub use http::{body_string, get, get_with, request, send};
pub use project::TestProject;
