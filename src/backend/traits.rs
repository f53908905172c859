//! Core backend abstraction traits
//!
//! The render graph never talks to a GPU API directly. Physical allocation,
//! pipeline creation and command submission go through [`GraphicsBackend`].

use crate::backend::command::CommandStream;
use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Failed to submit commands: {0}")]
    SubmitFailed(String),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a raster or compute pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineHandle(pub(crate) u64);

impl BufferHandle {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl TextureHandle {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl PipelineHandle {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Physical backing of a graph resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalResource {
    Texture(TextureHandle),
    Buffer(BufferHandle),
}

impl PhysicalResource {
    pub fn as_texture(&self) -> Option<TextureHandle> {
        match self {
            PhysicalResource::Texture(handle) => Some(*handle),
            PhysicalResource::Buffer(_) => None,
        }
    }

    pub fn as_buffer(&self) -> Option<BufferHandle> {
        match self {
            PhysicalResource::Buffer(handle) => Some(*handle),
            PhysicalResource::Texture(_) => None,
        }
    }
}

/// Graphics backend used by the graph compiler and the frame executor.
///
/// Compilation allocates resources and pipelines through it once; every
/// frame hands it exactly one linear [`CommandStream`].
pub trait GraphicsBackend {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Create a GPU buffer
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    /// Create a GPU texture
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Create a raster or compute pipeline from an opaque shader payload
    fn create_pipeline(&mut self, desc: &PipelineDescriptor) -> BackendResult<PipelineHandle>;

    /// Submit one frame worth of recorded commands
    fn submit(&mut self, stream: CommandStream) -> BackendResult<()>;

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    fn destroy_texture(&mut self, texture: TextureHandle);

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle);
}
