//! Render Graph Engine - render-pass dependency graph and technique composer
//!
//! Passes declare the resource views they read and write; the graph derives
//! execution order and resource-state transitions from those declarations.
//!
//! # Features
//! - Resource registry with image/buffer subresource views
//! - Implicit ordering edges, cycle and ambiguous-write detection
//! - Deterministic scheduling with compile-time barrier placement
//! - Per-frame enable predicates without recompilation
//! - Capability-driven prepass variants behind one output contract
//!
//! Everything talks to the GPU through [`backend::GraphicsBackend`]; the
//! [`backend::DummyBackend`] records commands for headless use.

pub mod backend;
pub mod pipeline;
pub mod render_graph;
pub mod technique;

pub use backend::{CommandStream, DummyBackend, GraphicsBackend};
pub use render_graph::{CompiledGraph, FrameExecutor, GraphError, GraphResult, RenderGraph};
pub use technique::{Capabilities, RenderTechnique, TechniqueConfig, TechniqueVariant};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize `env_logger` from `RUST_LOG`, defaulting to `info`.
///
/// Safe to call more than once.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
