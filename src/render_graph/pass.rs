//! Pass nodes and the contexts they are built and recorded with.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::backend::command::{Command, CommandStream};
use crate::backend::traits::*;
use crate::backend::types::{PipelineDescriptor, ShaderModule};
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::resource::*;

/// Stable handle of a pass inside its graph's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassHandle(pub(crate) u32);

impl PassHandle {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Type of render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassType {
    /// Graphics render pass
    Graphics,
    /// Compute pass
    Compute,
    /// Transfer/copy pass
    Transfer,
}

/// Closed set of pass families the engine knows how to build.
///
/// Each kind maps to one builder function in the pipeline table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassKind {
    Depth,
    DepthNormal,
    Visibility,
    VisibilityResolve,
    VisibilityMaterialCount,
    VisibilityMaterialStart,
    VisibilityPixelList,
    VisibilityResolveCompute,
    DepthRange,
    Ssao,
    Opaque,
    BloomPrefilter,
    BloomDownsample,
    ToneMapping,
    /// User pass with its own builder closure
    Custom,
}

impl PassKind {
    /// Every kind that has a built-in builder.
    pub const BUILT_IN: [PassKind; 14] = [
        PassKind::Depth,
        PassKind::DepthNormal,
        PassKind::Visibility,
        PassKind::VisibilityResolve,
        PassKind::VisibilityMaterialCount,
        PassKind::VisibilityMaterialStart,
        PassKind::VisibilityPixelList,
        PassKind::VisibilityResolveCompute,
        PassKind::DepthRange,
        PassKind::Ssao,
        PassKind::Opaque,
        PassKind::BloomPrefilter,
        PassKind::BloomDownsample,
        PassKind::ToneMapping,
    ];
}

/// Per-frame information handed to predicates and runnables
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameContext {
    pub frame_index: u64,
    pub delta_time: f32,
}

impl FrameContext {
    pub fn new(frame_index: u64, delta_time: f32) -> Self {
        Self {
            frame_index,
            delta_time,
        }
    }
}

/// Runtime enable predicate. Evaluated once per frame before recording.
pub type EnablePredicate = Arc<dyn Fn(&FrameContext) -> bool + Send + Sync>;

/// Executable unit produced by a pass builder.
///
/// Recording only appends commands; a runnable cannot touch graph structure.
pub trait Runnable: Send + Sync {
    fn record(&self, ctx: &mut RecordContext<'_>);
}

/// Runnable for passes that only exist to order or transition resources.
#[derive(Debug, Default)]
pub struct NoopRunnable;

impl Runnable for NoopRunnable {
    fn record(&self, _ctx: &mut RecordContext<'_>) {}
}

/// Deferred builder invoked exactly once, at compile time.
pub type PassBuilder = Box<dyn FnOnce(&mut BuildContext<'_>) -> GraphResult<Box<dyn Runnable>>>;

/// Context for recording one pass into the frame's command stream
pub struct RecordContext<'a> {
    pub(crate) stream: &'a mut CommandStream,
    pub(crate) frame: &'a FrameContext,
    pub(crate) pass_name: &'a str,
}

impl<'a> RecordContext<'a> {
    pub fn push(&mut self, command: Command) {
        self.stream.push(command);
    }

    pub fn frame(&self) -> &FrameContext {
        self.frame
    }

    pub fn pass_name(&self) -> &str {
        self.pass_name
    }
}

/// Context handed to a pass builder
///
/// Exposes the physical resources behind the pass's views, its shader
/// payload and pipeline creation on the backend.
pub struct BuildContext<'a> {
    pub(crate) node: &'a PassNode,
    pub(crate) registry: &'a ResourceRegistry,
    pub(crate) physical: &'a HashMap<ResourceId, PhysicalResource>,
    pub(crate) backend: &'a mut dyn GraphicsBackend,
    pub(crate) pipelines: &'a mut Vec<PipelineHandle>,
}

impl<'a> BuildContext<'a> {
    pub fn pass_name(&self) -> &str {
        &self.node.name
    }

    pub fn pass_type(&self) -> PassType {
        self.node.pass_type
    }

    pub fn kind(&self) -> PassKind {
        self.node.kind
    }

    pub fn inputs(&self) -> &[View] {
        &self.node.inputs
    }

    pub fn outputs(&self) -> &[View] {
        &self.node.outputs
    }

    pub fn resource(&self, id: ResourceId) -> GraphResult<&Resource> {
        self.registry.get(id).ok_or(GraphError::UnknownResource(id))
    }

    pub fn physical(&self, id: ResourceId) -> GraphResult<PhysicalResource> {
        self.physical
            .get(&id)
            .copied()
            .ok_or(GraphError::UnknownResource(id))
    }

    pub fn texture(&self, id: ResourceId) -> GraphResult<TextureHandle> {
        self.physical(id)?
            .as_texture()
            .ok_or(GraphError::UnknownResource(id))
    }

    pub fn buffer(&self, id: ResourceId) -> GraphResult<BufferHandle> {
        self.physical(id)?
            .as_buffer()
            .ok_or(GraphError::UnknownResource(id))
    }

    /// Shader payload attached to the pass.
    pub fn shader(&self) -> GraphResult<&ShaderModule> {
        self.node
            .shader
            .as_ref()
            .ok_or_else(|| GraphError::MissingShader {
                pass: self.node.name.clone(),
            })
    }

    /// Create a pipeline owned by the compiled graph.
    pub fn create_pipeline(&mut self, desc: &PipelineDescriptor) -> GraphResult<PipelineHandle> {
        let pipeline = self.backend.create_pipeline(desc)?;
        self.pipelines.push(pipeline);
        Ok(pipeline)
    }
}

/// Declaration of a pass before it is added to a graph
pub struct PassDesc {
    pub(crate) name: String,
    pub(crate) pass_type: PassType,
    pub(crate) kind: PassKind,
    pub(crate) inputs: Vec<View>,
    pub(crate) outputs: Vec<View>,
    pub(crate) dependencies: Vec<String>,
    pub(crate) enable: Option<EnablePredicate>,
    pub(crate) shader: Option<ShaderModule>,
    pub(crate) builder: Option<PassBuilder>,
}

impl PassDesc {
    pub fn new(name: impl Into<String>, pass_type: PassType) -> Self {
        Self {
            name: name.into(),
            pass_type,
            kind: PassKind::Custom,
            inputs: Vec::new(),
            outputs: Vec::new(),
            dependencies: Vec::new(),
            enable: None,
            shader: None,
            builder: None,
        }
    }

    pub fn graphics(name: impl Into<String>) -> Self {
        Self::new(name, PassType::Graphics)
    }

    pub fn compute(name: impl Into<String>) -> Self {
        Self::new(name, PassType::Compute)
    }

    pub fn kind(mut self, kind: PassKind) -> Self {
        self.kind = kind;
        self
    }

    /// Declare a view this pass reads.
    pub fn input(mut self, view: View) -> Self {
        self.inputs.push(view);
        self
    }

    /// Declare a view this pass writes.
    pub fn output(mut self, view: View) -> Self {
        self.outputs.push(view);
        self
    }

    /// Run after the pass called `name`.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    pub fn enabled_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&FrameContext) -> bool + Send + Sync + 'static,
    {
        self.enable = Some(Arc::new(predicate));
        self
    }

    pub fn shader(mut self, shader: Option<ShaderModule>) -> Self {
        self.shader = shader;
        self
    }

    pub fn build_with<F>(mut self, builder: F) -> Self
    where
        F: FnOnce(&mut BuildContext<'_>) -> GraphResult<Box<dyn Runnable>> + 'static,
    {
        self.builder = Some(Box::new(builder));
        self
    }

    pub fn build_with_boxed(mut self, builder: PassBuilder) -> Self {
        self.builder = Some(builder);
        self
    }
}

/// A pass registered in a graph
pub struct PassNode {
    pub(crate) handle: PassHandle,
    pub(crate) name: String,
    pub(crate) pass_type: PassType,
    pub(crate) kind: PassKind,
    pub(crate) inputs: Vec<View>,
    pub(crate) outputs: Vec<View>,
    pub(crate) dependencies: Vec<String>,
    pub(crate) explicit: Vec<PassHandle>,
    pub(crate) enable: Option<EnablePredicate>,
    pub(crate) shader: Option<ShaderModule>,
    pub(crate) builder: Option<PassBuilder>,
}

impl PassNode {
    pub(crate) fn from_desc(handle: PassHandle, desc: PassDesc) -> Self {
        Self {
            handle,
            name: desc.name,
            pass_type: desc.pass_type,
            kind: desc.kind,
            inputs: desc.inputs,
            outputs: desc.outputs,
            dependencies: desc.dependencies,
            explicit: Vec::new(),
            enable: desc.enable,
            shader: desc.shader,
            builder: desc.builder,
        }
    }

    pub fn handle(&self) -> PassHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pass_type(&self) -> PassType {
        self.pass_type
    }

    pub fn kind(&self) -> PassKind {
        self.kind
    }

    pub fn inputs(&self) -> &[View] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[View] {
        &self.outputs
    }

    /// Inputs followed by outputs, in declaration order.
    pub fn views(&self) -> impl Iterator<Item = &View> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    /// Names this pass was declared to depend on.
    pub fn dependency_names(&self) -> &[String] {
        &self.dependencies
    }

    pub fn has_predicate(&self) -> bool {
        self.enable.is_some()
    }

    pub fn is_enabled(&self, frame: &FrameContext) -> bool {
        self.enable.as_ref().map_or(true, |predicate| predicate(frame))
    }

    pub fn writes(&self, view: &View) -> bool {
        self.outputs.iter().any(|output| output.overlaps(view))
    }

    pub fn touches(&self, resource: ResourceId, subrange: &Subrange) -> bool {
        self.views()
            .any(|view| view.resource == resource && view.subrange.overlaps(subrange))
    }
}

impl fmt::Debug for PassNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassNode")
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("pass_type", &self.pass_type)
            .field("kind", &self.kind)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("dependencies", &self.dependencies)
            .field("conditional", &self.enable.is_some())
            .finish()
    }
}
