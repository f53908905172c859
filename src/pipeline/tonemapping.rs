//! Tone mapping and colour grading
//!
//! Last pass of a technique: combines HDR colour with the bloom chain and
//! writes the display-referred `Target` image. Exposure and bloom intensity
//! come from the view uniforms so runtime changes need no rebuild.

use crate::backend::types::LoadOp;
use crate::pipeline::{built_in, raster_pass, PassSettings, RasterDraw};
use crate::render_graph::*;
use crate::technique::shaders::ShaderProvider;

pub fn add_tonemapping_pass(
    graph: &mut RenderGraph,
    settings: PassSettings,
    shaders: &dyn ShaderProvider,
    hdr: ResourceId,
    bloom: Option<ResourceId>,
    uniforms: ResourceId,
    target: ResourceId,
) -> GraphResult<PassHandle> {
    let mut desc = built_in(
        "ToneMapping",
        PassType::Graphics,
        PassKind::ToneMapping,
        settings,
        shaders,
    )
    .input(graph.full_view(hdr, AccessKind::Sampled)?)
    .input(graph.full_view(uniforms, AccessKind::UniformRead)?);
    if let Some(bloom) = bloom {
        desc = desc.input(graph.full_view(bloom, AccessKind::Sampled)?);
    }
    let desc = desc.output(graph.full_view(target, AccessKind::ColorAttachment)?);
    graph.create_pass(desc)
}

pub(crate) fn build(_settings: PassSettings, ctx: &mut BuildContext<'_>) -> GraphResult<Box<dyn Runnable>> {
    raster_pass(ctx, RasterDraw::Fullscreen, LoadOp::DontCare)
}
