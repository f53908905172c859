//! Prepass output contract
//!
//! Whatever variant builds the prepass, later stages see the same named
//! outputs with the same shape, each written by at least one pass. The
//! contract is checked against the graph before compilation.

use crate::backend::types::{BufferUsage, Extent3d, TextureFormat};
use crate::pipeline::depth_range::DEPTH_RANGE_SIZE;
use crate::render_graph::{GraphError, GraphResult, PassNode, ResourceDesc, ResourceRegistry};
use crate::technique::config::TechniqueConfig;

pub const DEPTH: &str = "Depth";
pub const DEPTH_OBJ: &str = "DepthObj";
pub const DEPTH_RANGE: &str = "DepthRange";

pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;
pub const DEPTH_OBJ_FORMAT: TextureFormat = TextureFormat::Rgba32Float;

/// Expected shape of one output
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputShape {
    Image { format: TextureFormat, extent: Extent3d },
    Buffer { size: u64, usage: BufferUsage },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub name: &'static str,
    pub shape: OutputShape,
}

/// Named outputs every prepass variant must expose
#[derive(Debug, Clone, PartialEq)]
pub struct OutputContract {
    outputs: Vec<OutputSpec>,
}

impl OutputContract {
    pub fn for_config(config: &TechniqueConfig) -> Self {
        let extent = Extent3d::new_2d(config.width, config.height);
        let mut outputs = vec![
            OutputSpec {
                name: DEPTH,
                shape: OutputShape::Image {
                    format: DEPTH_FORMAT,
                    extent,
                },
            },
            OutputSpec {
                name: DEPTH_OBJ,
                shape: OutputShape::Image {
                    format: DEPTH_OBJ_FORMAT,
                    extent,
                },
            },
        ];
        if config.depth_range {
            outputs.push(OutputSpec {
                name: DEPTH_RANGE,
                shape: OutputShape::Buffer {
                    size: DEPTH_RANGE_SIZE,
                    usage: BufferUsage::STORAGE,
                },
            });
        }
        Self { outputs }
    }

    pub fn outputs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.outputs.iter().map(|output| output.name)
    }

    /// Check every output against what the variant declared and registered.
    pub fn verify(&self, registry: &ResourceRegistry, passes: &[PassNode]) -> GraphResult<()> {
        for output in &self.outputs {
            let mismatch = |reason: String| GraphError::OutputContractMismatch {
                output: output.name.to_string(),
                reason,
            };
            let resource = registry
                .lookup(output.name)
                .and_then(|id| registry.get(id))
                .ok_or_else(|| mismatch("not declared".to_string()))?;

            match (&output.shape, &resource.desc) {
                (OutputShape::Image { format, extent }, ResourceDesc::Image(image)) => {
                    if image.format != *format {
                        return Err(mismatch(format!(
                            "format {:?}, expected {:?}",
                            image.format, format
                        )));
                    }
                    if image.extent != *extent {
                        return Err(mismatch(format!(
                            "extent {:?}, expected {:?}",
                            image.extent, extent
                        )));
                    }
                }
                (OutputShape::Buffer { size, usage }, ResourceDesc::Buffer(buffer)) => {
                    if buffer.size != *size {
                        return Err(mismatch(format!("size {}, expected {}", buffer.size, size)));
                    }
                    if !buffer.usage.contains(*usage) {
                        return Err(mismatch(format!(
                            "usage {:?} lacks {:?}",
                            buffer.usage, usage
                        )));
                    }
                }
                (OutputShape::Image { .. }, ResourceDesc::Buffer(_)) => {
                    return Err(mismatch("declared as a buffer".to_string()));
                }
                (OutputShape::Buffer { .. }, ResourceDesc::Image(_)) => {
                    return Err(mismatch("declared as an image".to_string()));
                }
            }

            let written = passes
                .iter()
                .any(|pass| pass.outputs().iter().any(|view| view.resource == resource.id));
            if !written {
                return Err(mismatch("no pass writes it".to_string()));
            }
        }
        log::debug!("Output contract verified ({} outputs)", self.outputs.len());
        Ok(())
    }
}
