//! Opaque shading
//!
//! Draws opaque geometry against the prepass depth without writing it and
//! shades into the HDR colour target.

use crate::backend::types::LoadOp;
use crate::pipeline::{built_in, raster_pass, PassSettings, RasterDraw};
use crate::render_graph::*;
use crate::technique::shaders::ShaderProvider;

/// Inputs of the opaque pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpaqueInputs {
    pub depth: ResourceId,
    pub uniforms: ResourceId,
    pub ssao: Option<ResourceId>,
    /// Deferred prepass normals
    pub normal: Option<ResourceId>,
}

pub fn add_opaque_pass(
    graph: &mut RenderGraph,
    settings: PassSettings,
    shaders: &dyn ShaderProvider,
    inputs: OpaqueInputs,
    hdr: ResourceId,
) -> GraphResult<PassHandle> {
    let mut desc = built_in("Opaque", PassType::Graphics, PassKind::Opaque, settings, shaders)
        .input(graph.full_view(inputs.depth, AccessKind::DepthReadOnly)?)
        .input(graph.full_view(inputs.uniforms, AccessKind::UniformRead)?);
    for optional in [inputs.ssao, inputs.normal].into_iter().flatten() {
        desc = desc.input(graph.full_view(optional, AccessKind::Sampled)?);
    }
    let desc = desc.output(graph.full_view(hdr, AccessKind::ColorAttachment)?);
    graph.create_pass(desc)
}

pub(crate) fn build(_settings: PassSettings, ctx: &mut BuildContext<'_>) -> GraphResult<Box<dyn Runnable>> {
    raster_pass(ctx, RasterDraw::Scene("opaque"), LoadOp::Clear([0.0, 0.0, 0.0, 1.0]))
}
