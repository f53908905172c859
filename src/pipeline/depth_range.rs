//! Depth range reduction
//!
//! Reduces the depth object to its min/max pair, consumed by shadow cascade
//! fitting and auto-exposure.

use crate::pipeline::{built_in, compute_pass, Dispatch, PassSettings};
use crate::render_graph::*;
use crate::technique::shaders::ShaderProvider;

/// Two `f32`: min then max depth.
pub const DEPTH_RANGE_SIZE: u64 = 8;

pub fn add_depth_range_pass(
    graph: &mut RenderGraph,
    settings: PassSettings,
    shaders: &dyn ShaderProvider,
    depth_obj: ResourceId,
    range: ResourceId,
) -> GraphResult<PassHandle> {
    let desc = built_in(
        "DepthRange",
        PassType::Compute,
        PassKind::DepthRange,
        settings,
        shaders,
    )
    .input(graph.full_view(depth_obj, AccessKind::Sampled)?)
    .output(graph.full_view(range, AccessKind::StorageWrite)?);
    graph.create_pass(desc)
}

pub(crate) fn build(settings: PassSettings, ctx: &mut BuildContext<'_>) -> GraphResult<Box<dyn Runnable>> {
    let (x, y, z) = settings.screen_groups();
    compute_pass(ctx, Dispatch::Groups(x, y, z))
}
