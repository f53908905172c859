//! Render graph definition

use std::collections::HashMap;

use crate::backend::traits::GraphicsBackend;
use crate::render_graph::access::AccessKind;
use crate::render_graph::compiler::{CompiledGraph, Schedule};
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;

/// Mutable graph under construction
///
/// Collects resources and passes, then compiles into a [`CompiledGraph`].
/// Nothing touches the backend before [`RenderGraph::compile`].
#[derive(Default)]
pub struct RenderGraph {
    registry: ResourceRegistry,
    nodes: Vec<PassNode>,
    by_name: HashMap<String, PassHandle>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a logical resource
    pub fn declare_resource(&mut self, name: impl Into<String>, desc: ResourceDesc) -> GraphResult<ResourceId> {
        self.registry.declare(name, desc)
    }

    pub fn view(&self, resource: ResourceId, subrange: Subrange, access: AccessKind) -> GraphResult<View> {
        self.registry.view(resource, subrange, access)
    }

    pub fn full_view(&self, resource: ResourceId, access: AccessKind) -> GraphResult<View> {
        self.registry.full_view(resource, access)
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn resource_id(&self, name: &str) -> Option<ResourceId> {
        self.registry.lookup(name)
    }

    /// Add a pass to the graph
    ///
    /// Views are validated against their resources here; dependencies by name
    /// are resolved when the graph is scheduled.
    pub fn create_pass(&mut self, desc: PassDesc) -> GraphResult<PassHandle> {
        if self.by_name.contains_key(&desc.name) {
            return Err(GraphError::DuplicatePassName { name: desc.name });
        }
        self.validate(&desc)?;

        let handle = PassHandle(self.nodes.len() as u32);
        log::trace!("Created pass '{}' ({:?})", desc.name, desc.kind);
        self.by_name.insert(desc.name.clone(), handle);
        self.nodes.push(PassNode::from_desc(handle, desc));
        Ok(handle)
    }

    /// Order `dependent` after `dependency`.
    ///
    /// # Panics
    /// If either handle does not belong to this graph.
    pub fn add_dependency(&mut self, dependent: PassHandle, dependency: PassHandle) {
        assert!(dependent.index() < self.nodes.len(), "Invalid dependent pass");
        assert!(dependency.index() < self.nodes.len(), "Invalid dependency pass");
        let node = &mut self.nodes[dependent.index()];
        if !node.explicit.contains(&dependency) {
            node.explicit.push(dependency);
        }
    }

    pub fn pass(&self, handle: PassHandle) -> &PassNode {
        &self.nodes[handle.index()]
    }

    pub fn pass_handle(&self, name: &str) -> Option<PassHandle> {
        self.by_name.get(name).copied()
    }

    pub fn passes(&self) -> &[PassNode] {
        &self.nodes
    }

    /// Validate and order the graph without touching any backend.
    pub fn schedule(&self) -> GraphResult<Schedule> {
        Schedule::build(&self.nodes, &self.registry)
    }

    /// Schedule, allocate physical resources and run every builder once.
    pub fn compile<B: GraphicsBackend>(self, backend: &mut B) -> GraphResult<CompiledGraph> {
        CompiledGraph::compile(self.registry, self.nodes, backend)
    }

    fn validate(&self, desc: &PassDesc) -> GraphResult<()> {
        let views: Vec<(&View, bool)> = desc
            .inputs
            .iter()
            .map(|view| (view, false))
            .chain(desc.outputs.iter().map(|view| (view, true)))
            .collect();

        for (index, (view, is_output)) in views.iter().enumerate() {
            self.validate_view(desc, view, *is_output)?;
            if let Some((other, _)) = views[..index].iter().find(|(other, _)| other.overlaps(view)) {
                return Err(self.mismatch(
                    desc,
                    view.resource,
                    format!("{:?} overlaps {:?} in the same pass", view.access, other.access),
                ));
            }
        }
        Ok(())
    }

    fn validate_view(&self, desc: &PassDesc, view: &View, is_output: bool) -> GraphResult<()> {
        // Re-checks bounds for views built by hand.
        self.registry.view(view.resource, view.subrange, view.access)?;
        let resource = self
            .registry
            .get(view.resource)
            .ok_or(GraphError::UnknownResource(view.resource))?;
        let access = view.access;

        if is_output && !access.is_write() {
            return Err(self.mismatch(desc, view.resource, format!("{:?} is not a write", access)));
        }
        if !is_output && access.is_write() {
            return Err(self.mismatch(desc, view.resource, format!("{:?} input writes", access)));
        }
        if !access.allowed_in(desc.pass_type) {
            return Err(self.mismatch(
                desc,
                view.resource,
                format!("{:?} in a {:?} pass", access, desc.pass_type),
            ));
        }

        match &resource.desc {
            ResourceDesc::Image(image) => {
                if !access.supports_image() {
                    return Err(self.mismatch(desc, view.resource, format!("{:?} on an image", access)));
                }
                if !image.usage.contains(access.required_texture_usage()) {
                    return Err(self.mismatch(
                        desc,
                        view.resource,
                        format!("usage {:?} lacks {:?}", image.usage, access.required_texture_usage()),
                    ));
                }
                let wrong_format = if access.is_depth() {
                    !image.format.is_depth()
                } else {
                    access == AccessKind::ColorAttachment && image.format.is_depth()
                };
                if wrong_format {
                    return Err(self.mismatch(
                        desc,
                        view.resource,
                        format!("{:?} with format {:?}", access, image.format),
                    ));
                }
            }
            ResourceDesc::Buffer(buffer) => {
                if !access.supports_buffer() {
                    return Err(self.mismatch(desc, view.resource, format!("{:?} on a buffer", access)));
                }
                if !buffer.usage.contains(access.required_buffer_usage()) {
                    return Err(self.mismatch(
                        desc,
                        view.resource,
                        format!("usage {:?} lacks {:?}", buffer.usage, access.required_buffer_usage()),
                    ));
                }
            }
        }
        Ok(())
    }

    fn mismatch(&self, desc: &PassDesc, resource: ResourceId, reason: String) -> GraphError {
        GraphError::AccessMismatch {
            pass: desc.name.clone(),
            resource: self.registry.name(resource).to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::*;

    fn graph_with_targets() -> (RenderGraph, ResourceId, ResourceId) {
        let mut graph = RenderGraph::new();
        let depth = graph
            .declare_resource(
                "Depth",
                ResourceDesc::image_2d(
                    32,
                    32,
                    TextureFormat::Depth32Float,
                    TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                ),
            )
            .unwrap();
        let buffer = graph
            .declare_resource("Range", ResourceDesc::buffer(8, BufferUsage::STORAGE))
            .unwrap();
        (graph, depth, buffer)
    }

    #[test]
    fn test_duplicate_pass_name() {
        let mut graph = RenderGraph::new();
        graph.create_pass(PassDesc::graphics("Depth")).unwrap();
        assert_eq!(
            graph.create_pass(PassDesc::compute("Depth")).unwrap_err(),
            GraphError::DuplicatePassName {
                name: "Depth".into()
            }
        );
    }

    #[test]
    fn test_root_pass_is_valid() {
        let mut graph = RenderGraph::new();
        let root = graph.create_pass(PassDesc::graphics("Root")).unwrap();
        assert_eq!(graph.pass_handle("Root"), Some(root));
        assert_eq!(graph.schedule().unwrap().order(), &[root]);
    }

    #[test]
    fn test_input_must_not_write() {
        let (mut graph, depth, _) = graph_with_targets();
        let view = graph.full_view(depth, AccessKind::DepthAttachment).unwrap();
        assert!(matches!(
            graph.create_pass(PassDesc::graphics("Bad").input(view)),
            Err(GraphError::AccessMismatch { .. })
        ));
    }

    #[test]
    fn test_output_must_write() {
        let (mut graph, depth, _) = graph_with_targets();
        let view = graph.full_view(depth, AccessKind::Sampled).unwrap();
        assert!(matches!(
            graph.create_pass(PassDesc::graphics("Bad").output(view)),
            Err(GraphError::AccessMismatch { .. })
        ));
    }

    #[test]
    fn test_access_kind_checks() {
        let (mut graph, depth, buffer) = graph_with_targets();

        // Depth target in a compute pass
        let attachment = graph.full_view(depth, AccessKind::DepthAttachment).unwrap();
        assert!(graph
            .create_pass(PassDesc::compute("A").output(attachment))
            .is_err());

        // Colour write into a depth format
        let color = graph.full_view(depth, AccessKind::ColorAttachment).unwrap();
        assert!(graph.create_pass(PassDesc::graphics("B").output(color)).is_err());

        // Storage on an image without the usage flag
        let storage = graph.full_view(depth, AccessKind::StorageWrite).unwrap();
        assert!(graph.create_pass(PassDesc::compute("C").output(storage)).is_err());

        // Uniform read on a storage-only buffer
        let uniform = graph.full_view(buffer, AccessKind::UniformRead).unwrap();
        assert!(graph.create_pass(PassDesc::compute("D").input(uniform)).is_err());

        // Sampling a buffer
        let sampled = View {
            resource: buffer,
            subrange: Subrange::buffer(0, 8),
            access: AccessKind::Sampled,
        };
        assert!(graph.create_pass(PassDesc::compute("E").input(sampled)).is_err());

        // Failed passes leave no trace
        assert!(graph.passes().is_empty());
    }

    #[test]
    fn test_overlapping_views_in_one_pass() {
        let (mut graph, depth, _) = graph_with_targets();
        let read = graph.full_view(depth, AccessKind::Sampled).unwrap();
        let write = graph.full_view(depth, AccessKind::DepthAttachment).unwrap();
        assert!(matches!(
            graph.create_pass(PassDesc::graphics("Feedback").input(read).output(write)),
            Err(GraphError::AccessMismatch { .. })
        ));
    }

    #[test]
    fn test_hand_built_view_out_of_bounds() {
        let (mut graph, _, buffer) = graph_with_targets();
        let view = View {
            resource: buffer,
            subrange: Subrange::buffer(4, 8),
            access: AccessKind::StorageWrite,
        };
        assert!(matches!(
            graph.create_pass(PassDesc::compute("Bad").output(view)),
            Err(GraphError::InvalidSubrange { .. })
        ));
    }

    #[test]
    fn test_add_dependency_orders_passes() {
        let mut graph = RenderGraph::new();
        let late = graph.create_pass(PassDesc::graphics("Late")).unwrap();
        let early = graph.create_pass(PassDesc::graphics("Early")).unwrap();
        graph.add_dependency(late, early);
        graph.add_dependency(late, early);

        let schedule = graph.schedule().unwrap();
        assert_eq!(schedule.order(), &[early, late]);
        assert_eq!(schedule.dependencies().edges().len(), 1);
    }

    #[test]
    #[should_panic(expected = "Invalid dependency pass")]
    fn test_add_dependency_foreign_handle() {
        let mut graph = RenderGraph::new();
        let pass = graph.create_pass(PassDesc::graphics("Only")).unwrap();
        graph.add_dependency(pass, PassHandle(7));
    }
}
