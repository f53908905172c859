//! Linear command stream recorded once per frame.
//!
//! Runnables, updaters and the executor all append to the same stream in
//! compiled order. The backend receives the finished stream in
//! [`GraphicsBackend::submit`](super::GraphicsBackend::submit).

use crate::backend::traits::*;
use crate::backend::types::LoadOp;
use crate::render_graph::access::{ImageLayout, ResourceState};
use crate::render_graph::resource::{ResourceId, Subrange};

/// A resource state change issued before a pass runs.
#[derive(Debug, Clone, PartialEq)]
pub struct BarrierCommand {
    pub resource: ResourceId,
    pub physical: PhysicalResource,
    pub subrange: Subrange,
    pub before: ResourceState,
    pub after: ResourceState,
}

impl BarrierCommand {
    /// Layout the image leaves; `None` for buffers.
    pub fn old_layout(&self) -> Option<ImageLayout> {
        self.physical.as_texture().map(|_| self.before.layout())
    }

    /// Layout the image enters; `None` for buffers.
    pub fn new_layout(&self) -> Option<ImageLayout> {
        self.physical.as_texture().map(|_| self.after.layout())
    }
}

/// Attachment bound by a raster pass.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentBinding {
    pub texture: TextureHandle,
    pub mip_level: u32,
    pub array_layer: u32,
    pub load: LoadOp,
}

/// One recorded GPU command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Barrier(BarrierCommand),
    PushDebugGroup(String),
    PopDebugGroup,
    BeginRenderPass {
        label: String,
        color: Vec<AttachmentBinding>,
        depth: Option<AttachmentBinding>,
    },
    EndRenderPass,
    BeginComputePass {
        label: String,
    },
    EndComputePass,
    SetPipeline(PipelineHandle),
    /// Bind the physical resources a pass reads.
    BindResources(Vec<PhysicalResource>),
    /// Hand-off to the scene/material system to draw its visible geometry.
    DrawScene {
        filter: String,
    },
    Draw {
        vertices: u32,
        instances: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    DispatchIndirect {
        buffer: BufferHandle,
        offset: u64,
    },
    WriteBuffer {
        buffer: BufferHandle,
        offset: u64,
        data: Vec<u8>,
    },
}

/// Ordered list of commands for one frame.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CommandStream {
    commands: Vec<Command>,
}

impl CommandStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Iterate over the barrier commands only.
    pub fn barriers(&self) -> impl Iterator<Item = &BarrierCommand> {
        self.commands.iter().filter_map(|command| match command {
            Command::Barrier(barrier) => Some(barrier),
            _ => None,
        })
    }

    /// Names of the debug groups in recording order.
    pub fn debug_groups(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|command| match command {
            Command::PushDebugGroup(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}
