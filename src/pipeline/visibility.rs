//! Visibility buffer prepass
//!
//! The raster pass writes a packed (instance, triangle) id per pixel plus
//! depth. A resolve turns it into the depth object: either a full-screen
//! raster pass, or a compute chain that bins pixels per material first:
//!
//! 1. MaterialCount - count pixels per material
//! 2. MaterialStart - prefix sum into start offsets and indirect arguments
//! 3. PixelList - scatter pixel coordinates into per-material lists
//! 4. ResolveCompute - resolve every list, dispatched indirectly

use crate::backend::types::LoadOp;
use crate::pipeline::{built_in, compute_pass, raster_pass, Dispatch, PassSettings, RasterDraw};
use crate::render_graph::*;
use crate::technique::shaders::ShaderProvider;

/// Upper bound on material slots tracked by the compute resolve.
pub const MAX_MATERIALS: u64 = 1024;

/// Storage buffers shared by the compute resolve chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveBuffers {
    pub material_counts: ResourceId,
    /// Start offsets followed by one indirect dispatch per material
    pub material_starts: ResourceId,
    pub pixel_list: ResourceId,
}

pub fn add_visibility_pass(
    graph: &mut RenderGraph,
    settings: PassSettings,
    shaders: &dyn ShaderProvider,
    visibility: ResourceId,
    depth: ResourceId,
) -> GraphResult<PassHandle> {
    let desc = built_in(
        "Visibility",
        PassType::Graphics,
        PassKind::Visibility,
        settings,
        shaders,
    )
    .output(graph.full_view(visibility, AccessKind::ColorAttachment)?)
    .output(graph.full_view(depth, AccessKind::DepthAttachment)?);
    graph.create_pass(desc)
}

/// Full-screen raster resolve into the depth object.
pub fn add_raster_resolve(
    graph: &mut RenderGraph,
    settings: PassSettings,
    shaders: &dyn ShaderProvider,
    visibility: ResourceId,
    depth_obj: ResourceId,
) -> GraphResult<PassHandle> {
    let desc = built_in(
        "VisibilityResolve",
        PassType::Graphics,
        PassKind::VisibilityResolve,
        settings,
        shaders,
    )
    .input(graph.full_view(visibility, AccessKind::Sampled)?)
    .output(graph.full_view(depth_obj, AccessKind::ColorAttachment)?);
    graph.create_pass(desc)
}

/// Compute resolve chain; returns the four passes in chain order.
pub fn add_compute_resolve(
    graph: &mut RenderGraph,
    settings: PassSettings,
    shaders: &dyn ShaderProvider,
    visibility: ResourceId,
    depth_obj: ResourceId,
    buffers: ResolveBuffers,
) -> GraphResult<Vec<PassHandle>> {
    let ids = graph.full_view(visibility, AccessKind::Sampled)?;

    let count = built_in(
        "VisibilityMaterialCount",
        PassType::Compute,
        PassKind::VisibilityMaterialCount,
        settings,
        shaders,
    )
    .input(ids)
    .output(graph.full_view(buffers.material_counts, AccessKind::StorageWrite)?);

    let start = built_in(
        "VisibilityMaterialStart",
        PassType::Compute,
        PassKind::VisibilityMaterialStart,
        settings,
        shaders,
    )
    .input(graph.full_view(buffers.material_counts, AccessKind::StorageRead)?)
    .output(graph.full_view(buffers.material_starts, AccessKind::StorageWrite)?);

    let pixels = built_in(
        "VisibilityPixelList",
        PassType::Compute,
        PassKind::VisibilityPixelList,
        settings,
        shaders,
    )
    .input(ids)
    .input(graph.full_view(buffers.material_starts, AccessKind::StorageRead)?)
    .output(graph.full_view(buffers.pixel_list, AccessKind::StorageWrite)?);

    let resolve = built_in(
        "VisibilityResolveCompute",
        PassType::Compute,
        PassKind::VisibilityResolveCompute,
        settings,
        shaders,
    )
    .input(ids)
    .input(graph.full_view(buffers.material_starts, AccessKind::IndirectRead)?)
    .input(graph.full_view(buffers.pixel_list, AccessKind::StorageRead)?)
    .output(graph.full_view(depth_obj, AccessKind::StorageWrite)?);

    [count, start, pixels, resolve]
        .into_iter()
        .map(|desc| graph.create_pass(desc))
        .collect()
}

pub(crate) fn build_visibility(
    _settings: PassSettings,
    ctx: &mut BuildContext<'_>,
) -> GraphResult<Box<dyn Runnable>> {
    // Zero is the "no triangle" id
    raster_pass(ctx, RasterDraw::Scene("opaque_visibility"), LoadOp::Clear([0.0; 4]))
}

pub(crate) fn build_resolve(
    _settings: PassSettings,
    ctx: &mut BuildContext<'_>,
) -> GraphResult<Box<dyn Runnable>> {
    raster_pass(ctx, RasterDraw::Fullscreen, LoadOp::DontCare)
}

/// Count, prefix-sum and scatter passes.
pub(crate) fn build_classify(
    settings: PassSettings,
    ctx: &mut BuildContext<'_>,
) -> GraphResult<Box<dyn Runnable>> {
    let (x, y, z) = match ctx.kind() {
        // One thread per material slot
        PassKind::VisibilityMaterialStart => (MAX_MATERIALS.div_ceil(64) as u32, 1, 1),
        _ => settings.screen_groups(),
    };
    compute_pass(ctx, Dispatch::Groups(x, y, z))
}

pub(crate) fn build_resolve_compute(
    _settings: PassSettings,
    ctx: &mut BuildContext<'_>,
) -> GraphResult<Box<dyn Runnable>> {
    let arguments = ctx
        .inputs()
        .iter()
        .find(|view| view.access == AccessKind::IndirectRead)
        .map(|view| view.resource)
        .ok_or_else(|| GraphError::AccessMismatch {
            pass: ctx.pass_name().to_string(),
            resource: "<indirect arguments>".to_string(),
            reason: "compute resolve needs an indirect argument buffer".to_string(),
        })?;
    let buffer = ctx.buffer(arguments)?;
    // Arguments follow the start offsets
    let offset = MAX_MATERIALS * 4;
    compute_pass(ctx, Dispatch::Indirect { buffer, offset })
}
