//! Render graph error types

use thiserror::Error;

use crate::backend::traits::BackendError;
use crate::render_graph::resource::ResourceId;

/// Errors raised while declaring, compiling or composing a graph.
///
/// Every variant is fatal for the graph or technique being built. Capability
/// downgrades are not errors and never show up here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Resource '{name}' is already declared")]
    DuplicateResource { name: String },

    #[error("Pass '{name}' is already declared")]
    DuplicatePassName { name: String },

    #[error("Pass '{pass}' depends on unknown pass '{dependency}'")]
    MissingDependency { pass: String, dependency: String },

    #[error("Dependency cycle between passes '{from}' and '{to}'")]
    CyclicDependency { from: String, to: String },

    #[error("Passes '{first}' and '{second}' both write '{resource}' without a declared order")]
    AmbiguousWriteOrder {
        first: String,
        second: String,
        resource: String,
    },

    #[error("Output '{output}' does not match the technique contract: {reason}")]
    OutputContractMismatch { output: String, reason: String },

    #[error("Invalid subrange on '{resource}': {reason}")]
    InvalidSubrange { resource: String, reason: String },

    #[error("Pass '{pass}' cannot use '{resource}' this way: {reason}")]
    AccessMismatch {
        pass: String,
        resource: String,
        reason: String,
    },

    #[error("Unknown resource {0:?}")]
    UnknownResource(ResourceId),

    #[error("No shader registered for pass '{pass}'")]
    MissingShader { pass: String },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type GraphResult<T> = Result<T, GraphError>;
