//! Bloom post-processing effect
//!
//! A prefilter pass extracts bright pixels into mip 0 of the bloom image,
//! then one downsample pass per mip reads the level above it. All passes
//! follow the runtime `bloom_enabled` toggle.

use crate::backend::types::LoadOp;
use crate::pipeline::{built_in, raster_pass, PassSettings, RasterDraw};
use crate::render_graph::*;
use crate::technique::config::SharedSettings;
use crate::technique::shaders::ShaderProvider;

/// Add the prefilter and downsample chain; returns the passes in chain order.
pub fn add_bloom_chain(
    graph: &mut RenderGraph,
    settings: PassSettings,
    shaders: &dyn ShaderProvider,
    runtime: SharedSettings,
    hdr: ResourceId,
    bloom: ResourceId,
) -> GraphResult<Vec<PassHandle>> {
    let levels = graph
        .resources()
        .get(bloom)
        .and_then(|resource| resource.desc.as_image())
        .map_or(1, |image| image.mip_levels);

    let enabled = runtime.clone();
    let prefilter = built_in(
        "BloomPrefilter",
        PassType::Graphics,
        PassKind::BloomPrefilter,
        settings,
        shaders,
    )
    .input(graph.full_view(hdr, AccessKind::Sampled)?)
    .output(graph.view(bloom, Subrange::mip(0), AccessKind::ColorAttachment)?)
    .enabled_if(move |_| enabled.read().bloom_enabled);

    let mut passes = vec![graph.create_pass(prefilter)?];
    for mip in 1..levels {
        let enabled = runtime.clone();
        let downsample = built_in(
            format!("BloomDownsample{}", mip),
            PassType::Graphics,
            PassKind::BloomDownsample,
            settings,
            shaders,
        )
        .input(graph.view(bloom, Subrange::mip(mip - 1), AccessKind::Sampled)?)
        .output(graph.view(bloom, Subrange::mip(mip), AccessKind::ColorAttachment)?)
        .enabled_if(move |_| enabled.read().bloom_enabled);
        passes.push(graph.create_pass(downsample)?);
    }

    log::trace!("Bloom chain with {} passes", passes.len());
    Ok(passes)
}

pub(crate) fn build(_settings: PassSettings, ctx: &mut BuildContext<'_>) -> GraphResult<Box<dyn Runnable>> {
    raster_pass(ctx, RasterDraw::Fullscreen, LoadOp::DontCare)
}
