//! Prepass sub-graphs
//!
//! Each [`TechniqueVariant`] declares its own intermediate resources and
//! registers a different set of passes, but all of them end up writing the
//! outputs named by the [`OutputContract`](super::contract::OutputContract).

use crate::backend::types::{BufferUsage, TextureFormat, TextureUsage};
use crate::pipeline::depth_prepass::{add_depth_normal_pass, add_depth_pass};
use crate::pipeline::depth_range::{add_depth_range_pass, DEPTH_RANGE_SIZE};
use crate::pipeline::visibility::{
    add_compute_resolve, add_raster_resolve, add_visibility_pass, ResolveBuffers, MAX_MATERIALS,
};
use crate::pipeline::PassSettings;
use crate::render_graph::{GraphResult, PassHandle, RenderGraph, ResourceDesc, ResourceId};
use crate::technique::capabilities::{ResolveMode, TechniqueVariant};
use crate::technique::config::TechniqueConfig;
use crate::technique::contract::{DEPTH, DEPTH_FORMAT, DEPTH_OBJ, DEPTH_OBJ_FORMAT, DEPTH_RANGE};
use crate::technique::shaders::ShaderProvider;

/// Resources written by the prepass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepassOutputs {
    pub depth: ResourceId,
    pub depth_obj: ResourceId,
    /// View-space normals of the deferred variant
    pub normal: Option<ResourceId>,
    pub depth_range: Option<ResourceId>,
}

/// A registered prepass sub-graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepass {
    pub variant: TechniqueVariant,
    pub outputs: PrepassOutputs,
    /// Passes in registration order
    pub passes: Vec<PassHandle>,
}

/// Names of the passes `variant` registers, in registration order.
pub fn node_names(variant: TechniqueVariant, config: &TechniqueConfig) -> Vec<&'static str> {
    let mut names = match variant {
        TechniqueVariant::Forward => vec!["Depth"],
        TechniqueVariant::Deferred => vec!["DepthNormal"],
        TechniqueVariant::VisibilityBuffer {
            resolve: ResolveMode::Raster,
        } => vec!["Visibility", "VisibilityResolve"],
        TechniqueVariant::VisibilityBuffer {
            resolve: ResolveMode::Compute,
        } => vec![
            "Visibility",
            "VisibilityMaterialCount",
            "VisibilityMaterialStart",
            "VisibilityPixelList",
            "VisibilityResolveCompute",
        ],
    };
    if config.depth_range {
        names.push("DepthRange");
    }
    names
}

/// Declare the variant's resources and register its passes.
pub fn register_prepass(
    graph: &mut RenderGraph,
    variant: TechniqueVariant,
    config: &TechniqueConfig,
    shaders: &dyn ShaderProvider,
) -> GraphResult<Prepass> {
    let settings = PassSettings::new(config.width, config.height);
    let (width, height) = (config.width, config.height);
    let attachment = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;

    let depth = graph.declare_resource(
        DEPTH,
        ResourceDesc::image_2d(width, height, DEPTH_FORMAT, attachment),
    )?;
    let depth_obj_usage = match variant {
        TechniqueVariant::VisibilityBuffer {
            resolve: ResolveMode::Compute,
        } => TextureUsage::STORAGE_BINDING | TextureUsage::TEXTURE_BINDING,
        _ => attachment,
    };
    let depth_obj = graph.declare_resource(
        DEPTH_OBJ,
        ResourceDesc::image_2d(width, height, DEPTH_OBJ_FORMAT, depth_obj_usage),
    )?;

    let mut normal = None;
    let mut passes = match variant {
        TechniqueVariant::Forward => {
            vec![add_depth_pass(graph, settings, shaders, depth, depth_obj)?]
        }
        TechniqueVariant::Deferred => {
            let id = graph.declare_resource(
                "Normal",
                ResourceDesc::image_2d(width, height, TextureFormat::Rgba16Float, attachment),
            )?;
            normal = Some(id);
            vec![add_depth_normal_pass(graph, settings, shaders, depth, depth_obj, id)?]
        }
        TechniqueVariant::VisibilityBuffer { resolve } => {
            let visibility = graph.declare_resource(
                "Visibility",
                ResourceDesc::image_2d(width, height, TextureFormat::Rg32Uint, attachment),
            )?;
            let mut passes = vec![add_visibility_pass(graph, settings, shaders, visibility, depth)?];
            match resolve {
                ResolveMode::Raster => {
                    passes.push(add_raster_resolve(graph, settings, shaders, visibility, depth_obj)?);
                }
                ResolveMode::Compute => {
                    let buffers = declare_resolve_buffers(graph, width, height)?;
                    passes.extend(add_compute_resolve(
                        graph, settings, shaders, visibility, depth_obj, buffers,
                    )?);
                }
            }
            passes
        }
    };

    let mut depth_range = None;
    if config.depth_range {
        let range = graph.declare_resource(
            DEPTH_RANGE,
            ResourceDesc::buffer(DEPTH_RANGE_SIZE, BufferUsage::STORAGE | BufferUsage::COPY_SRC),
        )?;
        passes.push(add_depth_range_pass(graph, settings, shaders, depth_obj, range)?);
        depth_range = Some(range);
    }

    log::debug!("Registered {:?} prepass with {} passes", variant, passes.len());
    Ok(Prepass {
        variant,
        outputs: PrepassOutputs {
            depth,
            depth_obj,
            normal,
            depth_range,
        },
        passes,
    })
}

fn declare_resolve_buffers(graph: &mut RenderGraph, width: u32, height: u32) -> GraphResult<ResolveBuffers> {
    let pixels = u64::from(width) * u64::from(height);
    let material_counts = graph.declare_resource(
        "VisibilityMaterialCounts",
        ResourceDesc::buffer(MAX_MATERIALS * 4, BufferUsage::STORAGE),
    )?;
    // Start offsets followed by one (x, y, z) dispatch per material
    let material_starts = graph.declare_resource(
        "VisibilityMaterialStarts",
        ResourceDesc::buffer(
            MAX_MATERIALS * 4 + MAX_MATERIALS * 12,
            BufferUsage::STORAGE | BufferUsage::INDIRECT,
        ),
    )?;
    // Packed (x, y) per pixel
    let pixel_list = graph.declare_resource(
        "VisibilityPixelList",
        ResourceDesc::buffer(pixels * 4, BufferUsage::STORAGE),
    )?;
    Ok(ResolveBuffers {
        material_counts,
        material_starts,
        pixel_list,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::technique::shaders::ShaderLibrary;

    fn registered(variant: TechniqueVariant, config: &TechniqueConfig) -> (RenderGraph, Prepass) {
        let mut graph = RenderGraph::new();
        let prepass = register_prepass(&mut graph, variant, config, &ShaderLibrary::placeholder()).unwrap();
        (graph, prepass)
    }

    #[test]
    fn test_registered_names_match_node_names() {
        let config = TechniqueConfig::new(320, 240);
        for variant in [
            TechniqueVariant::Forward,
            TechniqueVariant::Deferred,
            TechniqueVariant::VisibilityBuffer {
                resolve: ResolveMode::Raster,
            },
            TechniqueVariant::VisibilityBuffer {
                resolve: ResolveMode::Compute,
            },
        ] {
            let (graph, prepass) = registered(variant, &config);
            let names: Vec<_> = prepass
                .passes
                .iter()
                .map(|&handle| graph.pass(handle).name())
                .collect();
            assert_eq!(names, node_names(variant, &config), "{:?}", variant);
        }
    }

    #[test]
    fn test_deferred_declares_normals() {
        let config = TechniqueConfig::new(64, 64).with_depth_range(false);
        let (graph, prepass) = registered(TechniqueVariant::Deferred, &config);
        assert_eq!(prepass.outputs.normal, graph.resource_id("Normal"));
        assert!(prepass.outputs.normal.is_some());
        assert!(prepass.outputs.depth_range.is_none());
        assert!(graph.resource_id(DEPTH_RANGE).is_none());
    }

    #[test]
    fn test_compute_resolve_buffers() {
        let config = TechniqueConfig::new(16, 8);
        let (graph, _) = registered(
            TechniqueVariant::VisibilityBuffer {
                resolve: ResolveMode::Compute,
            },
            &config,
        );
        let pixels = graph
            .resource_id("VisibilityPixelList")
            .and_then(|id| graph.resources().get(id))
            .and_then(|resource| resource.desc.as_buffer())
            .unwrap();
        assert_eq!(pixels.size, 16 * 8 * 4);
        let starts = graph
            .resource_id("VisibilityMaterialStarts")
            .and_then(|id| graph.resources().get(id))
            .and_then(|resource| resource.desc.as_buffer())
            .unwrap();
        assert!(starts.usage.contains(BufferUsage::INDIRECT));
    }
}
