//! Render pass dependency graph
//!
//! Passes declare the views they read and write. The graph infers ordering
//! and resource transitions from those declarations, compiles once per
//! configuration and is then executed every frame with per-pass enable
//! predicates.

pub mod access;
pub mod compiler;
pub mod dag;
pub mod error;
pub mod executor;
pub mod graph;
pub mod pass;
pub mod resource;
pub mod visitor;

pub use access::*;
pub use compiler::{CompiledGraph, Schedule, TrackedState, Transition};
pub use dag::{DependencyGraph, Edge, EdgeKind};
pub use error::{GraphError, GraphResult};
pub use executor::{FrameExecutor, FrameSummary, PassFrameState};
pub use graph::RenderGraph;
pub use pass::*;
pub use resource::*;
pub use visitor::{GraphDump, GraphVisitor};
