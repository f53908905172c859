//! Access kinds and resource states used for barrier placement.
//!
//! A view declares *how* a pass touches a resource ([`AccessKind`]). Combined
//! with the kind of pass it becomes a [`ResourceState`], which is what the
//! compiler tracks between passes and what barriers move between.

use bitflags::bitflags;

use crate::backend::types::{BufferUsage, TextureUsage};
use crate::render_graph::pass::PassType;

/// How a view is accessed by the pass that declares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    /// Sampled in a shader (texture read).
    Sampled,
    /// Written as color render target.
    ColorAttachment,
    /// Written as depth/stencil render target.
    DepthAttachment,
    /// Read-only depth/stencil (depth test without writes).
    DepthReadOnly,
    /// Read as storage image or storage buffer.
    StorageRead,
    /// Written as storage image or storage buffer.
    StorageWrite,
    /// Read and written as storage image or storage buffer.
    StorageReadWrite,
    /// Read as uniform buffer.
    UniformRead,
    /// Read as indirect draw/dispatch arguments.
    IndirectRead,
    /// Source of a copy.
    TransferRead,
    /// Destination of a copy.
    TransferWrite,
}

impl AccessKind {
    /// Check if this access writes the resource.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::ColorAttachment
                | Self::DepthAttachment
                | Self::StorageWrite
                | Self::StorageReadWrite
                | Self::TransferWrite
        )
    }

    /// Check if this access reads the resource.
    pub fn is_read(self) -> bool {
        matches!(
            self,
            Self::Sampled
                | Self::DepthReadOnly
                | Self::StorageRead
                | Self::StorageReadWrite
                | Self::UniformRead
                | Self::IndirectRead
                | Self::TransferRead
        )
    }

    /// Whether the access may target an image.
    pub fn supports_image(self) -> bool {
        !matches!(self, Self::UniformRead | Self::IndirectRead)
    }

    /// Whether the access may target a buffer.
    pub fn supports_buffer(self) -> bool {
        !matches!(
            self,
            Self::Sampled | Self::ColorAttachment | Self::DepthAttachment | Self::DepthReadOnly
        )
    }

    /// Depth accesses require a depth format; attachments/sampling of colour
    /// targets require a colour format.
    pub fn is_depth(self) -> bool {
        matches!(self, Self::DepthAttachment | Self::DepthReadOnly)
    }

    /// Texture usage flag the resource must carry for this access.
    pub fn required_texture_usage(self) -> TextureUsage {
        match self {
            Self::Sampled => TextureUsage::TEXTURE_BINDING,
            Self::ColorAttachment | Self::DepthAttachment | Self::DepthReadOnly => {
                TextureUsage::RENDER_ATTACHMENT
            }
            Self::StorageRead | Self::StorageWrite | Self::StorageReadWrite => {
                TextureUsage::STORAGE_BINDING
            }
            Self::TransferRead => TextureUsage::COPY_SRC,
            Self::TransferWrite => TextureUsage::COPY_DST,
            Self::UniformRead | Self::IndirectRead => TextureUsage::empty(),
        }
    }

    /// Buffer usage flag the resource must carry for this access.
    pub fn required_buffer_usage(self) -> BufferUsage {
        match self {
            Self::StorageRead | Self::StorageWrite | Self::StorageReadWrite => BufferUsage::STORAGE,
            Self::UniformRead => BufferUsage::UNIFORM,
            Self::IndirectRead => BufferUsage::INDIRECT,
            Self::TransferRead => BufferUsage::COPY_SRC,
            Self::TransferWrite => BufferUsage::COPY_DST,
            Self::Sampled | Self::ColorAttachment | Self::DepthAttachment | Self::DepthReadOnly => {
                BufferUsage::empty()
            }
        }
    }

    /// Whether a pass of the given type may perform this access.
    pub fn allowed_in(self, pass_type: PassType) -> bool {
        match pass_type {
            PassType::Graphics => !matches!(self, Self::TransferRead | Self::TransferWrite),
            PassType::Compute => !matches!(
                self,
                Self::ColorAttachment
                    | Self::DepthAttachment
                    | Self::DepthReadOnly
                    | Self::TransferRead
                    | Self::TransferWrite
            ),
            PassType::Transfer => matches!(self, Self::TransferRead | Self::TransferWrite),
        }
    }

    /// Layout an image must be in for this access.
    pub fn layout(self) -> ImageLayout {
        match self {
            Self::ColorAttachment => ImageLayout::ColorAttachment,
            Self::DepthAttachment => ImageLayout::DepthStencilAttachment,
            Self::DepthReadOnly => ImageLayout::DepthStencilReadOnly,
            Self::Sampled => ImageLayout::ShaderReadOnly,
            Self::StorageRead | Self::StorageWrite | Self::StorageReadWrite => ImageLayout::General,
            Self::TransferRead => ImageLayout::TransferSrc,
            Self::TransferWrite => ImageLayout::TransferDst,
            Self::UniformRead | Self::IndirectRead => ImageLayout::General,
        }
    }

    /// Pipeline stages touching the resource when a pass of `pass_type`
    /// performs this access.
    pub fn stages(self, pass_type: PassType) -> PipelineStages {
        match self {
            Self::ColorAttachment => PipelineStages::COLOR_OUTPUT,
            Self::DepthAttachment | Self::DepthReadOnly => PipelineStages::FRAGMENT_TESTS,
            Self::IndirectRead => PipelineStages::DRAW_INDIRECT,
            Self::TransferRead | Self::TransferWrite => PipelineStages::TRANSFER,
            Self::Sampled
            | Self::StorageRead
            | Self::StorageWrite
            | Self::StorageReadWrite
            | Self::UniformRead => match pass_type {
                PassType::Graphics => PipelineStages::VERTEX_SHADER | PipelineStages::FRAGMENT_SHADER,
                PassType::Compute => PipelineStages::COMPUTE_SHADER,
                PassType::Transfer => PipelineStages::TRANSFER,
            },
        }
    }
}

bitflags! {
    /// Pipeline stages a resource state is bound to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const DRAW_INDIRECT = 1 << 0;
        const VERTEX_SHADER = 1 << 1;
        const FRAGMENT_SHADER = 1 << 2;
        const FRAGMENT_TESTS = 1 << 3;
        const COLOR_OUTPUT = 1 << 4;
        const COMPUTE_SHADER = 1 << 5;
        const TRANSFER = 1 << 6;
    }
}

/// Image layouts a texture moves between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    General,
    ColorAttachment,
    DepthStencilAttachment,
    DepthStencilReadOnly,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
}

/// Access plus the stages performing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceState {
    pub access: AccessKind,
    pub stages: PipelineStages,
}

impl ResourceState {
    pub fn new(access: AccessKind, stages: PipelineStages) -> Self {
        Self { access, stages }
    }

    /// State a pass of `pass_type` puts a resource in when accessing it with `access`.
    pub fn for_pass(access: AccessKind, pass_type: PassType) -> Self {
        Self::new(access, access.stages(pass_type))
    }

    pub fn layout(&self) -> ImageLayout {
        self.access.layout()
    }

    pub fn is_write(&self) -> bool {
        self.access.is_write()
    }

    /// Whether moving from `self` to `next` requires a barrier.
    ///
    /// Any write on either side needs one. Read after read only needs one
    /// when an image changes layout.
    pub fn needs_barrier(&self, next: &ResourceState, is_image: bool) -> bool {
        self.is_write() || next.is_write() || (is_image && self.layout() != next.layout())
    }
}
