//! Screen-space ambient occlusion

use crate::backend::types::LoadOp;
use crate::pipeline::{built_in, raster_pass, PassSettings, RasterDraw};
use crate::render_graph::*;
use crate::technique::config::SharedSettings;
use crate::technique::shaders::ShaderProvider;

/// Add the SSAO pass. It only runs on frames where `ssao_enabled` is set.
pub fn add_ssao_pass(
    graph: &mut RenderGraph,
    settings: PassSettings,
    shaders: &dyn ShaderProvider,
    runtime: SharedSettings,
    depth_obj: ResourceId,
    uniforms: ResourceId,
    ssao: ResourceId,
) -> GraphResult<PassHandle> {
    let desc = built_in("Ssao", PassType::Graphics, PassKind::Ssao, settings, shaders)
        .input(graph.full_view(depth_obj, AccessKind::Sampled)?)
        .input(graph.full_view(uniforms, AccessKind::UniformRead)?)
        .output(graph.full_view(ssao, AccessKind::ColorAttachment)?)
        .enabled_if(move |_| runtime.read().ssao_enabled);
    graph.create_pass(desc)
}

pub(crate) fn build(_settings: PassSettings, ctx: &mut BuildContext<'_>) -> GraphResult<Box<dyn Runnable>> {
    // Unoccluded
    raster_pass(ctx, RasterDraw::Fullscreen, LoadOp::Clear([1.0; 4]))
}
