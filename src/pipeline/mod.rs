//! Built-in passes
//!
//! Every [`PassKind`] with engine-provided behaviour maps to one builder
//! function in [`build_fn`]. Builders receive a [`PassSettings`] by value and
//! the [`BuildContext`] of their pass; everything else they need comes from
//! the pass's declared views.
//!
//! Pass families:
//! 1. Depth prepass - depth only or depth + normals
//! 2. Visibility buffer - raster pass plus raster or compute resolve
//! 3. Depth range - min/max depth reduction into a small buffer
//! 4. SSAO, opaque shading, bloom chain and tone mapping

pub mod bloom;
pub mod depth_prepass;
pub mod depth_range;
pub mod opaque;
pub mod ssao;
pub mod tonemapping;
pub mod visibility;

use crate::backend::command::{AttachmentBinding, Command};
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::{
    AccessKind, BuildContext, GraphResult, PassBuilder, PassDesc, PassKind, PassType, RecordContext,
    ResourceId, Runnable, Subrange,
};
use crate::technique::shaders::ShaderProvider;

/// Values every built-in builder receives by value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassSettings {
    /// Full render resolution
    pub extent: Extent3d,
    /// Workgroup edge used by full-screen compute passes
    pub workgroup_size: u32,
}

impl PassSettings {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            extent: Extent3d::new_2d(width, height),
            workgroup_size: 8,
        }
    }

    /// Workgroups covering the whole render extent.
    pub fn screen_groups(&self) -> (u32, u32, u32) {
        let size = self.workgroup_size.max(1);
        (
            self.extent.width.div_ceil(size),
            self.extent.height.div_ceil(size),
            1,
        )
    }
}

pub type BuildFn = fn(PassSettings, &mut BuildContext<'_>) -> GraphResult<Box<dyn Runnable>>;

/// Builder table. `None` for [`PassKind::Custom`], which brings its own.
pub fn build_fn(kind: PassKind) -> Option<BuildFn> {
    match kind {
        PassKind::Depth | PassKind::DepthNormal => Some(depth_prepass::build),
        PassKind::Visibility => Some(visibility::build_visibility),
        PassKind::VisibilityResolve => Some(visibility::build_resolve),
        PassKind::VisibilityMaterialCount
        | PassKind::VisibilityMaterialStart
        | PassKind::VisibilityPixelList => Some(visibility::build_classify),
        PassKind::VisibilityResolveCompute => Some(visibility::build_resolve_compute),
        PassKind::DepthRange => Some(depth_range::build),
        PassKind::Ssao => Some(ssao::build),
        PassKind::Opaque => Some(opaque::build),
        PassKind::BloomPrefilter | PassKind::BloomDownsample => Some(bloom::build),
        PassKind::ToneMapping => Some(tonemapping::build),
        PassKind::Custom => None,
    }
}

/// Wrap the table entry for `kind` into a deferred pass builder.
pub fn builder(kind: PassKind, settings: PassSettings) -> Option<PassBuilder> {
    build_fn(kind).map(|build| Box::new(move |ctx: &mut BuildContext<'_>| build(settings, ctx)) as PassBuilder)
}

/// Start a built-in pass description with its kind, shader and builder set.
pub(crate) fn built_in(
    name: impl Into<String>,
    pass_type: PassType,
    kind: PassKind,
    settings: PassSettings,
    shaders: &dyn ShaderProvider,
) -> PassDesc {
    let desc = PassDesc::new(name, pass_type)
        .kind(kind)
        .shader(shaders.shader(kind));
    match builder(kind, settings) {
        Some(builder) => desc.build_with_boxed(builder),
        None => desc,
    }
}

/// What a raster pass draws
#[derive(Debug, Clone, PartialEq)]
pub enum RasterDraw {
    /// Visible geometry matching a material filter
    Scene(&'static str),
    /// Single full-screen triangle
    Fullscreen,
}

/// Generic raster pass recorded from attachments and bindings.
#[derive(Debug)]
pub struct RasterRunnable {
    label: String,
    pipeline: PipelineHandle,
    color: Vec<AttachmentBinding>,
    depth: Option<AttachmentBinding>,
    bindings: Vec<PhysicalResource>,
    draw: RasterDraw,
}

impl Runnable for RasterRunnable {
    fn record(&self, ctx: &mut RecordContext<'_>) {
        ctx.push(Command::BeginRenderPass {
            label: self.label.clone(),
            color: self.color.clone(),
            depth: self.depth.clone(),
        });
        ctx.push(Command::SetPipeline(self.pipeline));
        if !self.bindings.is_empty() {
            ctx.push(Command::BindResources(self.bindings.clone()));
        }
        match &self.draw {
            RasterDraw::Scene(filter) => ctx.push(Command::DrawScene {
                filter: filter.to_string(),
            }),
            RasterDraw::Fullscreen => ctx.push(Command::Draw {
                vertices: 3,
                instances: 1,
            }),
        }
        ctx.push(Command::EndRenderPass);
    }
}

/// How a compute pass is dispatched
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dispatch {
    Groups(u32, u32, u32),
    Indirect { buffer: BufferHandle, offset: u64 },
}

/// Generic compute pass binding every declared view.
#[derive(Debug)]
pub struct ComputeRunnable {
    label: String,
    pipeline: PipelineHandle,
    bindings: Vec<PhysicalResource>,
    dispatch: Dispatch,
}

impl Runnable for ComputeRunnable {
    fn record(&self, ctx: &mut RecordContext<'_>) {
        ctx.push(Command::BeginComputePass {
            label: self.label.clone(),
        });
        ctx.push(Command::SetPipeline(self.pipeline));
        ctx.push(Command::BindResources(self.bindings.clone()));
        match self.dispatch {
            Dispatch::Groups(x, y, z) => ctx.push(Command::Dispatch { x, y, z }),
            Dispatch::Indirect { buffer, offset } => {
                ctx.push(Command::DispatchIndirect { buffer, offset })
            }
        }
        ctx.push(Command::EndComputePass);
    }
}

fn attachment(
    ctx: &BuildContext<'_>,
    resource: ResourceId,
    subrange: Subrange,
    load: LoadOp,
) -> GraphResult<(AttachmentBinding, TextureFormat)> {
    let texture = ctx.texture(resource)?;
    let format = ctx
        .resource(resource)?
        .desc
        .as_image()
        .map(|image| image.format)
        .unwrap_or(TextureFormat::Rgba8Unorm);
    let (mip_level, array_layer) = match subrange {
        Subrange::Image {
            base_mip,
            base_layer,
            ..
        } => (base_mip, base_layer),
        Subrange::Buffer { .. } => (0, 0),
    };
    Ok((
        AttachmentBinding {
            texture,
            mip_level,
            array_layer,
            load,
        },
        format,
    ))
}

/// Build a raster runnable from the pass's views.
///
/// Colour and depth outputs become attachments, a read-only depth input is
/// bound as a loaded depth attachment, every other view is a binding.
pub(crate) fn raster_pass(
    ctx: &mut BuildContext<'_>,
    draw: RasterDraw,
    color_load: LoadOp,
) -> GraphResult<Box<dyn Runnable>> {
    let mut color = Vec::new();
    let mut color_formats = Vec::new();
    let mut depth = None;
    let mut depth_format = None;
    let mut bindings = Vec::new();

    let views: Vec<_> = ctx.inputs().iter().chain(ctx.outputs()).copied().collect();
    for view in views {
        match view.access {
            AccessKind::ColorAttachment => {
                let (binding, format) = attachment(ctx, view.resource, view.subrange, color_load)?;
                color.push(binding);
                color_formats.push(format);
            }
            AccessKind::DepthAttachment => {
                let (binding, format) =
                    attachment(ctx, view.resource, view.subrange, LoadOp::Clear([1.0, 0.0, 0.0, 0.0]))?;
                depth = Some(binding);
                depth_format = Some(format);
            }
            AccessKind::DepthReadOnly => {
                let (binding, format) = attachment(ctx, view.resource, view.subrange, LoadOp::Load)?;
                depth = Some(binding);
                depth_format = Some(format);
            }
            _ => bindings.push(ctx.physical(view.resource)?),
        }
    }

    let shader = ctx.shader()?.clone();
    let label = ctx.pass_name().to_string();
    let pipeline = ctx.create_pipeline(&PipelineDescriptor {
        label: Some(label.clone()),
        kind: PipelineKind::Raster,
        shader,
        color_formats,
        depth_format,
    })?;

    Ok(Box::new(RasterRunnable {
        label,
        pipeline,
        color,
        depth,
        bindings,
        draw,
    }))
}

/// Build a compute runnable binding every declared view in order.
pub(crate) fn compute_pass(ctx: &mut BuildContext<'_>, dispatch: Dispatch) -> GraphResult<Box<dyn Runnable>> {
    let views: Vec<_> = ctx.inputs().iter().chain(ctx.outputs()).copied().collect();
    let bindings = views
        .iter()
        .map(|view| ctx.physical(view.resource))
        .collect::<GraphResult<Vec<_>>>()?;

    let shader = ctx.shader()?.clone();
    let label = ctx.pass_name().to_string();
    let pipeline = ctx.create_pipeline(&PipelineDescriptor {
        label: Some(label.clone()),
        kind: PipelineKind::Compute,
        shader,
        color_formats: Vec::new(),
        depth_format: None,
    })?;

    Ok(Box::new(ComputeRunnable {
        label,
        pipeline,
        bindings,
        dispatch,
    }))
}
