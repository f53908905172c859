//! Depth prepass
//!
//! Writes the depth attachment and the linear depth object every later
//! stage samples. The deferred flavour also writes view-space normals.

use crate::backend::types::LoadOp;
use crate::pipeline::{built_in, raster_pass, PassSettings, RasterDraw};
use crate::render_graph::*;
use crate::technique::shaders::ShaderProvider;

/// Add the forward depth-only prepass.
pub fn add_depth_pass(
    graph: &mut RenderGraph,
    settings: PassSettings,
    shaders: &dyn ShaderProvider,
    depth: ResourceId,
    depth_obj: ResourceId,
) -> GraphResult<PassHandle> {
    let desc = built_in("Depth", PassType::Graphics, PassKind::Depth, settings, shaders)
        .output(graph.full_view(depth, AccessKind::DepthAttachment)?)
        .output(graph.full_view(depth_obj, AccessKind::ColorAttachment)?);
    graph.create_pass(desc)
}

/// Add the deferred depth + normal prepass.
pub fn add_depth_normal_pass(
    graph: &mut RenderGraph,
    settings: PassSettings,
    shaders: &dyn ShaderProvider,
    depth: ResourceId,
    depth_obj: ResourceId,
    normal: ResourceId,
) -> GraphResult<PassHandle> {
    let desc = built_in(
        "DepthNormal",
        PassType::Graphics,
        PassKind::DepthNormal,
        settings,
        shaders,
    )
    .output(graph.full_view(depth, AccessKind::DepthAttachment)?)
    .output(graph.full_view(depth_obj, AccessKind::ColorAttachment)?)
    .output(graph.full_view(normal, AccessKind::ColorAttachment)?);
    graph.create_pass(desc)
}

pub(crate) fn build(_settings: PassSettings, ctx: &mut BuildContext<'_>) -> GraphResult<Box<dyn Runnable>> {
    let filter = match ctx.kind() {
        PassKind::DepthNormal => "opaque_normals",
        _ => "opaque_depth",
    };
    // Far plane for the depth object
    raster_pass(ctx, RasterDraw::Scene(filter), LoadOp::Clear([1.0, 1.0, 1.0, 1.0]))
}
