//! Logical resources and the views passes declare on them.
//!
//! The registry only tracks metadata. Physical memory is requested from the
//! backend when the graph is compiled.

use std::collections::HashMap;

use crate::backend::types::*;
use crate::render_graph::access::AccessKind;
use crate::render_graph::error::{GraphError, GraphResult};

/// Unique identifier for a render graph resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u32);

impl ResourceId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Logical image description
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    pub format: TextureFormat,
    pub extent: Extent3d,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub usage: TextureUsage,
}

/// Logical buffer description
#[derive(Debug, Clone, PartialEq)]
pub struct BufferInfo {
    pub size: u64,
    pub usage: BufferUsage,
}

/// Resource type enumeration
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDesc {
    Image(ImageInfo),
    Buffer(BufferInfo),
}

impl ResourceDesc {
    pub fn image_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        ResourceDesc::Image(ImageInfo {
            format,
            extent: Extent3d::new_2d(width, height),
            mip_levels: 1,
            array_layers: 1,
            usage,
        })
    }

    pub fn buffer(size: u64, usage: BufferUsage) -> Self {
        ResourceDesc::Buffer(BufferInfo { size, usage })
    }

    /// Set the number of mip levels. No effect on buffers.
    pub fn with_mips(mut self, mip_levels: u32) -> Self {
        if let ResourceDesc::Image(image) = &mut self {
            image.mip_levels = mip_levels;
        }
        self
    }

    /// Set the number of array layers. No effect on buffers.
    pub fn with_layers(mut self, array_layers: u32) -> Self {
        if let ResourceDesc::Image(image) = &mut self {
            image.array_layers = array_layers;
        }
        self
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ResourceDesc::Image(_))
    }

    pub fn as_image(&self) -> Option<&ImageInfo> {
        match self {
            ResourceDesc::Image(image) => Some(image),
            ResourceDesc::Buffer(_) => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&BufferInfo> {
        match self {
            ResourceDesc::Buffer(buffer) => Some(buffer),
            ResourceDesc::Image(_) => None,
        }
    }

    /// Subrange covering the whole resource.
    pub fn full_subrange(&self) -> Subrange {
        match self {
            ResourceDesc::Image(image) => Subrange::image(0, image.mip_levels, 0, image.array_layers),
            ResourceDesc::Buffer(buffer) => Subrange::buffer(0, buffer.size),
        }
    }

    /// Check that `subrange` lies inside this resource.
    fn check_subrange(&self, subrange: &Subrange) -> Result<(), String> {
        match (self, subrange) {
            (
                ResourceDesc::Image(image),
                Subrange::Image {
                    base_mip,
                    mip_count,
                    base_layer,
                    layer_count,
                },
            ) => {
                if *mip_count == 0 || *layer_count == 0 {
                    return Err("empty image subrange".to_string());
                }
                match base_mip.checked_add(*mip_count) {
                    Some(end) if end <= image.mip_levels => {}
                    _ => {
                        return Err(format!(
                            "mips {}..{} exceed {} levels",
                            base_mip,
                            base_mip.saturating_add(*mip_count),
                            image.mip_levels
                        ))
                    }
                }
                match base_layer.checked_add(*layer_count) {
                    Some(end) if end <= image.array_layers => Ok(()),
                    _ => Err(format!(
                        "layers {}..{} exceed {} layers",
                        base_layer,
                        base_layer.saturating_add(*layer_count),
                        image.array_layers
                    )),
                }
            }
            (ResourceDesc::Buffer(buffer), Subrange::Buffer { offset, size }) => {
                if *size == 0 {
                    return Err("empty buffer range".to_string());
                }
                match offset.checked_add(*size) {
                    Some(end) if end <= buffer.size => Ok(()),
                    _ => Err(format!(
                        "bytes {}..{} exceed buffer size {}",
                        offset,
                        offset.saturating_add(*size),
                        buffer.size
                    )),
                }
            }
            (ResourceDesc::Image(_), Subrange::Buffer { .. }) => {
                Err("buffer range used on an image".to_string())
            }
            (ResourceDesc::Buffer(_), Subrange::Image { .. }) => {
                Err("image subrange used on a buffer".to_string())
            }
        }
    }
}

/// Subresource range of an image or byte range of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subrange {
    Image {
        base_mip: u32,
        mip_count: u32,
        base_layer: u32,
        layer_count: u32,
    },
    Buffer {
        offset: u64,
        size: u64,
    },
}

fn ranges_overlap(a_start: u64, a_len: u64, b_start: u64, b_len: u64) -> bool {
    a_start < b_start.saturating_add(b_len) && b_start < a_start.saturating_add(a_len)
}

fn range_contains(outer_start: u64, outer_len: u64, inner_start: u64, inner_len: u64) -> bool {
    outer_start <= inner_start && inner_start.saturating_add(inner_len) <= outer_start.saturating_add(outer_len)
}

impl Subrange {
    pub fn image(base_mip: u32, mip_count: u32, base_layer: u32, layer_count: u32) -> Self {
        Subrange::Image {
            base_mip,
            mip_count,
            base_layer,
            layer_count,
        }
    }

    /// A single mip level of layer zero.
    pub fn mip(level: u32) -> Self {
        Self::image(level, 1, 0, 1)
    }

    pub fn buffer(offset: u64, size: u64) -> Self {
        Subrange::Buffer { offset, size }
    }

    /// Whether two subranges share at least one subresource or byte.
    pub fn overlaps(&self, other: &Subrange) -> bool {
        match (self, other) {
            (
                Subrange::Image {
                    base_mip: am,
                    mip_count: amc,
                    base_layer: al,
                    layer_count: alc,
                },
                Subrange::Image {
                    base_mip: bm,
                    mip_count: bmc,
                    base_layer: bl,
                    layer_count: blc,
                },
            ) => {
                ranges_overlap(*am as u64, *amc as u64, *bm as u64, *bmc as u64)
                    && ranges_overlap(*al as u64, *alc as u64, *bl as u64, *blc as u64)
            }
            (
                Subrange::Buffer { offset: ao, size: asz },
                Subrange::Buffer { offset: bo, size: bsz },
            ) => ranges_overlap(*ao, *asz, *bo, *bsz),
            _ => false,
        }
    }

    /// Whether `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Subrange) -> bool {
        match (self, other) {
            (
                Subrange::Image {
                    base_mip: am,
                    mip_count: amc,
                    base_layer: al,
                    layer_count: alc,
                },
                Subrange::Image {
                    base_mip: bm,
                    mip_count: bmc,
                    base_layer: bl,
                    layer_count: blc,
                },
            ) => {
                range_contains(*am as u64, *amc as u64, *bm as u64, *bmc as u64)
                    && range_contains(*al as u64, *alc as u64, *bl as u64, *blc as u64)
            }
            (
                Subrange::Buffer { offset: ao, size: asz },
                Subrange::Buffer { offset: bo, size: bsz },
            ) => range_contains(*ao, *asz, *bo, *bsz),
            _ => false,
        }
    }

    /// Common part of two subranges.
    pub fn intersection(&self, other: &Subrange) -> Option<Subrange> {
        if !self.overlaps(other) {
            return None;
        }
        match (*self, *other) {
            (
                Subrange::Image {
                    base_mip: am,
                    mip_count: amc,
                    base_layer: al,
                    layer_count: alc,
                },
                Subrange::Image {
                    base_mip: bm,
                    mip_count: bmc,
                    base_layer: bl,
                    layer_count: blc,
                },
            ) => {
                let mip = am.max(bm);
                let layer = al.max(bl);
                Some(Subrange::image(
                    mip,
                    (am + amc).min(bm + bmc) - mip,
                    layer,
                    (al + alc).min(bl + blc) - layer,
                ))
            }
            (
                Subrange::Buffer { offset: ao, size: asz },
                Subrange::Buffer { offset: bo, size: bsz },
            ) => {
                let offset = ao.max(bo);
                Some(Subrange::buffer(offset, (ao + asz).min(bo + bsz) - offset))
            }
            _ => None,
        }
    }

    /// Parts of `self` not covered by `other`.
    pub fn subtract(&self, other: &Subrange) -> Vec<Subrange> {
        let Some(common) = self.intersection(other) else {
            return vec![*self];
        };
        let mut rest = Vec::new();
        match (*self, common) {
            (
                Subrange::Image {
                    base_mip,
                    mip_count,
                    base_layer,
                    layer_count,
                },
                Subrange::Image {
                    base_mip: cm,
                    mip_count: cmc,
                    base_layer: cl,
                    layer_count: clc,
                },
            ) => {
                // Mips below and above the common block span every layer.
                if cm > base_mip {
                    rest.push(Subrange::image(base_mip, cm - base_mip, base_layer, layer_count));
                }
                let mip_end = base_mip + mip_count;
                if cm + cmc < mip_end {
                    rest.push(Subrange::image(cm + cmc, mip_end - cm - cmc, base_layer, layer_count));
                }
                if cl > base_layer {
                    rest.push(Subrange::image(cm, cmc, base_layer, cl - base_layer));
                }
                let layer_end = base_layer + layer_count;
                if cl + clc < layer_end {
                    rest.push(Subrange::image(cm, cmc, cl + clc, layer_end - cl - clc));
                }
            }
            (Subrange::Buffer { offset, size }, Subrange::Buffer { offset: co, size: csz }) => {
                if co > offset {
                    rest.push(Subrange::buffer(offset, co - offset));
                }
                if co + csz < offset + size {
                    rest.push(Subrange::buffer(co + csz, offset + size - co - csz));
                }
            }
            _ => rest.push(*self),
        }
        rest
    }
}

/// Typed reference into a resource, used by exactly one access kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct View {
    pub resource: ResourceId,
    pub subrange: Subrange,
    pub access: AccessKind,
}

impl View {
    /// Whether both views touch a common part of the same resource.
    pub fn overlaps(&self, other: &View) -> bool {
        self.resource == other.resource && self.subrange.overlaps(&other.subrange)
    }
}

/// A declared logical resource
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub desc: ResourceDesc,
}

impl Resource {
    pub fn texture_descriptor(&self) -> Option<TextureDescriptor> {
        self.desc.as_image().map(|image| TextureDescriptor {
            label: Some(self.name.clone()),
            size: image.extent,
            mip_levels: image.mip_levels,
            array_layers: image.array_layers,
            format: image.format,
            usage: image.usage,
        })
    }

    pub fn buffer_descriptor(&self) -> Option<BufferDescriptor> {
        self.desc
            .as_buffer()
            .map(|buffer| BufferDescriptor::new(buffer.size, buffer.usage).with_label(&self.name))
    }
}

/// Registry of every logical resource a graph knows about.
#[derive(Debug, Default, Clone)]
pub struct ResourceRegistry {
    resources: Vec<Resource>,
    by_name: HashMap<String, ResourceId>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource. Each name may be declared once.
    pub fn declare(&mut self, name: impl Into<String>, desc: ResourceDesc) -> GraphResult<ResourceId> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(GraphError::DuplicateResource { name });
        }
        desc.check_subrange(&desc.full_subrange())
            .map_err(|reason| GraphError::InvalidSubrange {
                resource: name.clone(),
                reason,
            })?;

        let id = ResourceId(self.resources.len() as u32);
        log::trace!("Declared resource '{}' as {:?}", name, id);
        self.by_name.insert(name.clone(), id);
        self.resources.push(Resource { id, name, desc });
        Ok(id)
    }

    /// Create a view on `subrange` of a resource.
    pub fn view(&self, resource: ResourceId, subrange: Subrange, access: AccessKind) -> GraphResult<View> {
        let declared = self
            .get(resource)
            .ok_or(GraphError::UnknownResource(resource))?;
        declared
            .desc
            .check_subrange(&subrange)
            .map_err(|reason| GraphError::InvalidSubrange {
                resource: declared.name.clone(),
                reason,
            })?;
        Ok(View {
            resource,
            subrange,
            access,
        })
    }

    /// Create a view covering the whole resource.
    pub fn full_view(&self, resource: ResourceId, access: AccessKind) -> GraphResult<View> {
        let declared = self
            .get(resource)
            .ok_or(GraphError::UnknownResource(resource))?;
        self.view(resource, declared.desc.full_subrange(), access)
    }

    pub fn get(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(id.index())
    }

    pub fn lookup(&self, name: &str) -> Option<ResourceId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: ResourceId) -> &str {
        self.get(id).map(|r| r.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
