//! Render techniques
//!
//! A technique picks one prepass variant from the device capabilities,
//! composes it with the passes that consume the prepass outputs and owns the
//! resulting compiled graph.

pub mod capabilities;
pub mod composer;
pub mod config;
pub mod contract;
pub mod prepass;
pub mod shaders;
pub mod updater;

pub use capabilities::{Capabilities, ResolveMode, TechniqueVariant};
pub use composer::RenderTechnique;
pub use config::{RenderSettings, SharedSettings, TechniqueConfig};
pub use contract::{OutputContract, OutputShape, OutputSpec};
pub use prepass::{node_names, register_prepass, Prepass, PrepassOutputs};
pub use shaders::{ShaderLibrary, ShaderProvider};
pub use updater::{
    Camera, CpuUpdater, GpuUpdater, SharedCamera, SharedUniforms, UniformUploader, ViewUniforms, ViewUniformsUpdater,
};
