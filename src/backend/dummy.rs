//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It hands out
//! sequential handles, remembers every descriptor it was asked to create and
//! keeps every submitted command stream so tests can inspect them.

use std::collections::HashMap;

use crate::backend::command::CommandStream;
use crate::backend::traits::*;
use crate::backend::types::*;

/// Dummy GPU backend.
#[derive(Debug, Default)]
pub struct DummyBackend {
    next_handle: u64,
    textures: HashMap<TextureHandle, TextureDescriptor>,
    buffers: HashMap<BufferHandle, BufferDescriptor>,
    pipelines: HashMap<PipelineHandle, PipelineDescriptor>,
    submitted: Vec<CommandStream>,
    /// Maximum number of live textures before allocation fails.
    texture_budget: Option<usize>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail texture creation with [`BackendError::OutOfMemory`] once `budget`
    /// textures are alive.
    pub fn with_texture_budget(mut self, budget: usize) -> Self {
        self.texture_budget = Some(budget);
        self
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&handle)
    }

    pub fn buffer(&self, handle: BufferHandle) -> Option<&BufferDescriptor> {
        self.buffers.get(&handle)
    }

    pub fn pipeline(&self, handle: PipelineHandle) -> Option<&PipelineDescriptor> {
        self.pipelines.get(&handle)
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// All command streams submitted so far, oldest first.
    pub fn submitted(&self) -> &[CommandStream] {
        &self.submitted
    }

    pub fn last_submission(&self) -> Option<&CommandStream> {
        self.submitted.last()
    }
}

impl GraphicsBackend for DummyBackend {
    fn name(&self) -> &str {
        "Dummy"
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        if desc.size == 0 {
            return Err(BackendError::BufferCreationFailed(format!(
                "{:?}: zero-sized buffer",
                desc.label
            )));
        }
        let handle = BufferHandle(self.next_id());
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        self.buffers.insert(handle, desc.clone());
        Ok(handle)
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if self
            .texture_budget
            .is_some_and(|budget| self.textures.len() >= budget)
        {
            return Err(BackendError::OutOfMemory);
        }
        let handle = TextureHandle(self.next_id());
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}x{}, {} mips)",
            desc.label,
            desc.size.width,
            desc.size.height,
            desc.size.depth,
            desc.mip_levels
        );
        self.textures.insert(handle, desc.clone());
        Ok(handle)
    }

    fn create_pipeline(&mut self, desc: &PipelineDescriptor) -> BackendResult<PipelineHandle> {
        let handle = PipelineHandle(self.next_id());
        log::trace!(
            "DummyBackend: creating {:?} pipeline {:?} ({} shader bytes)",
            desc.kind,
            desc.label,
            desc.shader.bytes.len()
        );
        self.pipelines.insert(handle, desc.clone());
        Ok(handle)
    }

    fn submit(&mut self, stream: CommandStream) -> BackendResult<()> {
        log::trace!("DummyBackend: submitted {} commands", stream.len());
        self.submitted.push(stream);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle) {
        self.pipelines.remove(&pipeline);
    }
}
