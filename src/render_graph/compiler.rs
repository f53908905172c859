//! Scheduling and compilation
//!
//! Orders passes with Kahn's algorithm, breaking ties by declaration order,
//! and walks that order once to record the transitions every pass needs.
//! Compilation then allocates physical resources and runs each builder.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::backend::traits::*;
use crate::render_graph::access::ResourceState;
use crate::render_graph::dag::DependencyGraph;
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::render_graph::visitor::GraphVisitor;

/// Resource state change issued immediately before a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub resource: ResourceId,
    pub subrange: Subrange,
    pub before: ResourceState,
    pub after: ResourceState,
    /// Pass that left the resource in `before`; `None` across frames.
    pub producer: Option<PassHandle>,
}

/// State of one subresource range at a point of the schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedState {
    pub resource: ResourceId,
    pub subrange: Subrange,
    pub state: ResourceState,
}

#[derive(Debug, Clone, Copy)]
enum Origin {
    Initial(usize),
    Transition(usize, usize),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    resource: ResourceId,
    subrange: Subrange,
    state: ResourceState,
    origin: Origin,
}

/// Linear state tracking over the compiled order.
#[derive(Default)]
struct StateTracker {
    entries: Vec<Entry>,
    transitions: Vec<Vec<Transition>>,
    initial: Vec<TrackedState>,
    last_access: Vec<(ResourceId, Subrange, PassHandle)>,
}

impl StateTracker {
    fn new(pass_count: usize) -> Self {
        Self {
            transitions: vec![Vec::new(); pass_count],
            ..Default::default()
        }
    }

    fn producer_of(&self, resource: ResourceId, subrange: &Subrange) -> Option<PassHandle> {
        self.last_access
            .iter()
            .rev()
            .find(|(id, range, _)| *id == resource && range.overlaps(subrange))
            .map(|(_, _, pass)| *pass)
    }

    fn widen(&mut self, origin: Origin, state: ResourceState) {
        match origin {
            Origin::Initial(index) => self.initial[index].state.stages |= state.stages,
            Origin::Transition(pass, index) => {
                self.transitions[pass][index].after.stages |= state.stages;
            }
        }
    }

    fn access(&mut self, pass: &PassNode, view: &View, is_image: bool) {
        let next = ResourceState::for_pass(view.access, pass.pass_type);
        let mut uncovered = vec![view.subrange];
        let mut kept = Vec::with_capacity(self.entries.len());
        let mut touched = Vec::new();

        for entry in std::mem::take(&mut self.entries) {
            let common = match entry.subrange.intersection(&view.subrange) {
                Some(common) if entry.resource == view.resource => common,
                _ => {
                    kept.push(entry);
                    continue;
                }
            };
            uncovered = uncovered
                .iter()
                .flat_map(|range| range.subtract(&common))
                .collect();
            kept.extend(entry.subrange.subtract(&common).into_iter().map(|rest| Entry {
                subrange: rest,
                ..entry
            }));

            if entry.state.needs_barrier(&next, is_image) {
                let producer = self.producer_of(view.resource, &common);
                let list = &mut self.transitions[pass.handle.index()];
                list.push(Transition {
                    resource: view.resource,
                    subrange: common,
                    before: entry.state,
                    after: next,
                    producer,
                });
                touched.push(Entry {
                    resource: view.resource,
                    subrange: common,
                    state: next,
                    origin: Origin::Transition(pass.handle.index(), list.len() - 1),
                });
            } else {
                // Read after read in the same layout shares the earlier barrier.
                self.widen(entry.origin, next);
                touched.push(Entry {
                    subrange: common,
                    state: ResourceState::new(entry.state.access, entry.state.stages | next.stages),
                    ..entry
                });
            }
        }

        for range in uncovered {
            self.initial.push(TrackedState {
                resource: view.resource,
                subrange: range,
                state: next,
            });
            touched.push(Entry {
                resource: view.resource,
                subrange: range,
                state: next,
                origin: Origin::Initial(self.initial.len() - 1),
            });
        }

        self.last_access.push((view.resource, view.subrange, pass.handle));
        kept.extend(touched);
        self.entries = kept;
    }

    fn final_states(&self) -> Vec<TrackedState> {
        let mut states: Vec<TrackedState> = self
            .entries
            .iter()
            .map(|entry| TrackedState {
                resource: entry.resource,
                subrange: entry.subrange,
                state: entry.state,
            })
            .collect();
        states.sort_by_key(|state| state.resource);
        states
    }
}

/// Pure scheduling result: order, edges and transitions.
#[derive(Debug, Clone)]
pub struct Schedule {
    order: Vec<PassHandle>,
    transitions: Vec<Vec<Transition>>,
    initial_states: Vec<TrackedState>,
    final_states: Vec<TrackedState>,
    prologue: Vec<Transition>,
    dependencies: DependencyGraph,
}

impl Schedule {
    /// Build the DAG over `nodes`, order it and compute transitions.
    pub fn build(nodes: &[PassNode], registry: &ResourceRegistry) -> GraphResult<Self> {
        let dependencies = DependencyGraph::build(nodes, registry)?;
        let order = topological_order(&dependencies);

        let mut tracker = StateTracker::new(nodes.len());
        for handle in &order {
            let node = &nodes[handle.index()];
            for view in node.views() {
                let is_image = registry
                    .get(view.resource)
                    .ok_or(GraphError::UnknownResource(view.resource))?
                    .desc
                    .is_image();
                tracker.access(node, view, is_image);
            }
        }

        let final_states = tracker.final_states();
        let prologue = loop_transitions(&final_states, &tracker.initial, registry);

        for handle in &order {
            for transition in &tracker.transitions[handle.index()] {
                log::trace!(
                    "Transition before '{}': '{}' {:?} -> {:?}",
                    nodes[handle.index()].name,
                    registry.name(transition.resource),
                    transition.before.access,
                    transition.after.access
                );
            }
        }

        Ok(Self {
            order,
            transitions: tracker.transitions,
            initial_states: tracker.initial,
            final_states,
            prologue,
            dependencies,
        })
    }

    pub fn order(&self) -> &[PassHandle] {
        &self.order
    }

    /// Transitions issued before `pass`, in emission order.
    pub fn transitions(&self, pass: PassHandle) -> &[Transition] {
        self.transitions
            .get(pass.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.iter().map(Vec::len).sum()
    }

    /// State of every range at its first access in a frame.
    pub fn initial_states(&self) -> &[TrackedState] {
        &self.initial_states
    }

    /// State of every range once the whole order ran.
    pub fn final_states(&self) -> &[TrackedState] {
        &self.final_states
    }

    /// Transitions bringing last frame's final states back to the initial ones.
    pub fn prologue(&self) -> &[Transition] {
        &self.prologue
    }

    pub fn dependencies(&self) -> &DependencyGraph {
        &self.dependencies
    }
}

fn topological_order(dependencies: &DependencyGraph) -> Vec<PassHandle> {
    let mut in_degree = dependencies.in_degrees();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(index, _)| Reverse(index))
        .collect();

    let mut order = Vec::with_capacity(in_degree.len());
    while let Some(Reverse(index)) = ready.pop() {
        order.push(PassHandle(index as u32));
        for next in dependencies.successors(index) {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }
    debug_assert_eq!(order.len(), in_degree.len());
    order
}

fn loop_transitions(
    finals: &[TrackedState],
    initials: &[TrackedState],
    registry: &ResourceRegistry,
) -> Vec<Transition> {
    let mut transitions = Vec::new();
    for initial in initials {
        let is_image = registry
            .get(initial.resource)
            .is_some_and(|resource| resource.desc.is_image());
        for last in finals.iter().filter(|state| state.resource == initial.resource) {
            let Some(common) = last.subrange.intersection(&initial.subrange) else {
                continue;
            };
            if last.state.needs_barrier(&initial.state, is_image) {
                transitions.push(Transition {
                    resource: initial.resource,
                    subrange: common,
                    before: last.state,
                    after: initial.state,
                    producer: None,
                });
            }
        }
    }
    transitions
}

/// Immutable, ordered, barrier-annotated graph ready to execute.
///
/// Owns the pass arena, the physical resources and the runnables every
/// builder produced.
pub struct CompiledGraph {
    registry: ResourceRegistry,
    nodes: Vec<PassNode>,
    schedule: Schedule,
    runnables: Vec<Box<dyn Runnable>>,
    physical: HashMap<ResourceId, PhysicalResource>,
    pipelines: Vec<PipelineHandle>,
}

impl CompiledGraph {
    pub(crate) fn compile(
        registry: ResourceRegistry,
        mut nodes: Vec<PassNode>,
        backend: &mut dyn GraphicsBackend,
    ) -> GraphResult<Self> {
        let schedule = Schedule::build(&nodes, &registry)?;

        let mut physical = HashMap::new();
        let mut pipelines = Vec::new();
        if let Err(err) = allocate(&registry, backend, &mut physical) {
            release(backend, &physical, &pipelines);
            return Err(err);
        }

        let mut built: Vec<Option<Box<dyn Runnable>>> = (0..nodes.len()).map(|_| None).collect();
        for handle in schedule.order() {
            let index = handle.index();
            let Some(builder) = nodes[index].builder.take() else {
                continue;
            };
            let mut ctx = BuildContext {
                node: &nodes[index],
                registry: &registry,
                physical: &physical,
                backend: &mut *backend,
                pipelines: &mut pipelines,
            };
            match builder(&mut ctx) {
                Ok(runnable) => built[index] = Some(runnable),
                Err(err) => {
                    log::error!("Failed to build pass '{}': {}", nodes[index].name, err);
                    release(backend, &physical, &pipelines);
                    return Err(err);
                }
            }
        }

        let runnables = built
            .into_iter()
            .map(|runnable| runnable.unwrap_or_else(|| Box::new(NoopRunnable) as Box<dyn Runnable>))
            .collect();

        log::debug!(
            "Compiled graph on {}: {} passes, {} resources, {} transitions",
            backend.name(),
            nodes.len(),
            registry.len(),
            schedule.transition_count()
        );

        Ok(Self {
            registry,
            nodes,
            schedule,
            runnables,
            physical,
            pipelines,
        })
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn order(&self) -> &[PassHandle] {
        self.schedule.order()
    }

    /// Pass names in compiled order.
    pub fn order_names(&self) -> Vec<&str> {
        self.order()
            .iter()
            .map(|handle| self.nodes[handle.index()].name())
            .collect()
    }

    pub fn transitions(&self, pass: PassHandle) -> &[Transition] {
        self.schedule.transitions(pass)
    }

    pub fn pass(&self, handle: PassHandle) -> &PassNode {
        &self.nodes[handle.index()]
    }

    pub fn pass_by_name(&self, name: &str) -> Option<&PassNode> {
        self.nodes.iter().find(|node| node.name == name)
    }

    pub fn passes(&self) -> &[PassNode] {
        &self.nodes
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn physical(&self, resource: ResourceId) -> Option<PhysicalResource> {
        self.physical.get(&resource).copied()
    }

    pub(crate) fn runnable(&self, pass: PassHandle) -> &dyn Runnable {
        self.runnables[pass.index()].as_ref()
    }

    /// Read-only traversal for tooling.
    pub fn accept(&self, visitor: &mut dyn GraphVisitor) {
        for resource in self.registry.iter() {
            visitor.visit_resource(resource);
        }
        for (position, handle) in self.order().iter().enumerate() {
            let pass = self.pass(*handle);
            visitor.visit_pass(position, pass);
            for transition in self.transitions(*handle) {
                visitor.visit_transition(pass, transition);
            }
        }
        for edge in self.schedule.dependencies().edges() {
            visitor.visit_edge(self.pass(edge.from), self.pass(edge.to), edge.kind);
        }
        for state in self.schedule.final_states() {
            if let Some(resource) = self.registry.get(state.resource) {
                visitor.visit_final_state(resource, &state.subrange, &state.state);
            }
        }
    }

    /// Return every physical resource and pipeline to the backend.
    ///
    /// Must be called before dropping the graph; the backend owns the memory.
    pub fn release(self, backend: &mut dyn GraphicsBackend) {
        release(backend, &self.physical, &self.pipelines);
    }
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("order", &self.order_names())
            .field("resources", &self.registry.len())
            .field("transitions", &self.schedule.transition_count())
            .finish()
    }
}

fn allocate(
    registry: &ResourceRegistry,
    backend: &mut dyn GraphicsBackend,
    physical: &mut HashMap<ResourceId, PhysicalResource>,
) -> GraphResult<()> {
    for resource in registry.iter() {
        let handle = match &resource.desc {
            ResourceDesc::Image(_) => resource
                .texture_descriptor()
                .map(|desc| backend.create_texture(&desc).map(PhysicalResource::Texture)),
            ResourceDesc::Buffer(_) => resource
                .buffer_descriptor()
                .map(|desc| backend.create_buffer(&desc).map(PhysicalResource::Buffer)),
        };
        if let Some(handle) = handle {
            physical.insert(resource.id, handle?);
        }
    }
    Ok(())
}

fn release(
    backend: &mut dyn GraphicsBackend,
    physical: &HashMap<ResourceId, PhysicalResource>,
    pipelines: &[PipelineHandle],
) {
    for pipeline in pipelines {
        backend.destroy_pipeline(*pipeline);
    }
    for resource in physical.values() {
        match resource {
            PhysicalResource::Texture(texture) => backend.destroy_texture(*texture),
            PhysicalResource::Buffer(buffer) => backend.destroy_buffer(*buffer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::backend::types::*;
    use crate::render_graph::access::{AccessKind, PipelineStages};
    use crate::render_graph::graph::RenderGraph;

    fn color_target(graph: &mut RenderGraph, name: &str) -> ResourceId {
        graph
            .declare_resource(
                name,
                ResourceDesc::image_2d(
                    64,
                    64,
                    TextureFormat::Rgba16Float,
                    TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                ),
            )
            .unwrap()
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let mut graph = RenderGraph::new();
        graph.create_pass(PassDesc::graphics("C")).unwrap();
        graph.create_pass(PassDesc::graphics("A")).unwrap();
        graph.create_pass(PassDesc::graphics("B").depends_on("A")).unwrap();

        let schedule = graph.schedule().unwrap();
        let names: Vec<_> = schedule
            .order()
            .iter()
            .map(|handle| graph.pass(*handle).name())
            .collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_first_access_has_no_transition() {
        let mut graph = RenderGraph::new();
        let color = color_target(&mut graph, "Color");
        let write = graph.full_view(color, AccessKind::ColorAttachment).unwrap();
        let pass = graph.create_pass(PassDesc::graphics("Write").output(write)).unwrap();

        let schedule = graph.schedule().unwrap();
        assert!(schedule.transitions(pass).is_empty());
        assert_eq!(schedule.initial_states().len(), 1);
        assert_eq!(schedule.final_states()[0].state.access, AccessKind::ColorAttachment);
        // Write then write again next frame
        assert_eq!(schedule.prologue().len(), 1);
    }

    #[test]
    fn test_readers_share_one_transition() {
        let mut graph = RenderGraph::new();
        let color = color_target(&mut graph, "Color");
        let write = graph.full_view(color, AccessKind::ColorAttachment).unwrap();
        let read = graph.full_view(color, AccessKind::Sampled).unwrap();
        graph.create_pass(PassDesc::graphics("Write").output(write)).unwrap();
        let fragment = graph.create_pass(PassDesc::graphics("Fragment").input(read)).unwrap();
        let compute = graph.create_pass(PassDesc::compute("Compute").input(read)).unwrap();

        let schedule = graph.schedule().unwrap();
        assert_eq!(schedule.transition_count(), 1);
        assert!(schedule.transitions(compute).is_empty());

        let transition = &schedule.transitions(fragment)[0];
        assert_eq!(transition.before.access, AccessKind::ColorAttachment);
        assert!(transition.after.stages.contains(PipelineStages::FRAGMENT_SHADER));
        assert!(transition.after.stages.contains(PipelineStages::COMPUTE_SHADER));
        assert_eq!(transition.producer, Some(PassHandle(0)));
    }

    #[test]
    fn test_mip_chain_transitions() {
        let mut graph = RenderGraph::new();
        let chain = graph
            .declare_resource(
                "Chain",
                ResourceDesc::image_2d(
                    64,
                    64,
                    TextureFormat::Rgba16Float,
                    TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                )
                .with_mips(3),
            )
            .unwrap();

        let top = graph.view(chain, Subrange::mip(0), AccessKind::ColorAttachment).unwrap();
        graph.create_pass(PassDesc::graphics("Top").output(top)).unwrap();
        let mut downsamples = Vec::new();
        for mip in 1..3 {
            let source = graph.view(chain, Subrange::mip(mip - 1), AccessKind::Sampled).unwrap();
            let target = graph.view(chain, Subrange::mip(mip), AccessKind::ColorAttachment).unwrap();
            downsamples.push(
                graph
                    .create_pass(
                        PassDesc::graphics(format!("Down{}", mip))
                            .input(source)
                            .output(target),
                    )
                    .unwrap(),
            );
        }
        let all = graph.full_view(chain, AccessKind::Sampled).unwrap();
        let composite = graph.create_pass(PassDesc::graphics("Composite").input(all)).unwrap();

        let schedule = graph.schedule().unwrap();
        for (mip, pass) in downsamples.iter().enumerate() {
            let transitions = schedule.transitions(*pass);
            assert_eq!(transitions.len(), 1);
            assert_eq!(transitions[0].subrange, Subrange::mip(mip as u32));
        }
        // Only the last mip is still an attachment
        let transitions = schedule.transitions(composite);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].subrange, Subrange::mip(2));
    }

    #[test]
    fn test_buffer_reads_need_no_barrier() {
        let mut graph = RenderGraph::new();
        let buffer = graph
            .declare_resource(
                "Counts",
                ResourceDesc::buffer(256, BufferUsage::STORAGE | BufferUsage::INDIRECT),
            )
            .unwrap();
        let write = graph.full_view(buffer, AccessKind::StorageWrite).unwrap();
        let storage = graph.full_view(buffer, AccessKind::StorageRead).unwrap();
        let indirect = graph.full_view(buffer, AccessKind::IndirectRead).unwrap();

        graph.create_pass(PassDesc::compute("Count").output(write)).unwrap();
        let first = graph.create_pass(PassDesc::compute("Scan").input(storage)).unwrap();
        let second = graph.create_pass(PassDesc::compute("Resolve").input(indirect)).unwrap();

        let schedule = graph.schedule().unwrap();
        assert_eq!(schedule.transitions(first).len(), 1);
        assert!(schedule.transitions(second).is_empty());
        assert!(schedule.transitions(first)[0]
            .after
            .stages
            .contains(PipelineStages::DRAW_INDIRECT));
    }

    #[test]
    fn test_compile_invokes_builders_once_in_order() {
        use std::sync::{Arc, Mutex};

        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut graph = RenderGraph::new();
        for (name, dependency) in [("Late", Some("Early")), ("Early", None)] {
            let calls = calls.clone();
            let mut desc = PassDesc::graphics(name).build_with(move |ctx| {
                calls.lock().unwrap().push(ctx.pass_name().to_string());
                Ok(Box::new(NoopRunnable) as Box<dyn Runnable>)
            });
            if let Some(dependency) = dependency {
                desc = desc.depends_on(dependency);
            }
            graph.create_pass(desc).unwrap();
        }

        let mut backend = DummyBackend::new();
        let compiled = graph.compile(&mut backend).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["Early", "Late"]);
        assert_eq!(compiled.order_names(), vec!["Early", "Late"]);
    }

    #[test]
    fn test_compile_allocates_and_releases() {
        let mut graph = RenderGraph::new();
        let color = color_target(&mut graph, "Color");
        graph
            .declare_resource("Params", ResourceDesc::buffer(64, BufferUsage::UNIFORM))
            .unwrap();
        let write = graph.full_view(color, AccessKind::ColorAttachment).unwrap();
        graph.create_pass(PassDesc::graphics("Write").output(write)).unwrap();

        let mut backend = DummyBackend::new();
        let compiled = graph.compile(&mut backend).unwrap();
        assert_eq!(backend.live_texture_count(), 1);
        assert_eq!(backend.live_buffer_count(), 1);
        assert!(compiled.physical(color).unwrap().as_texture().is_some());

        compiled.release(&mut backend);
        assert_eq!(backend.live_texture_count(), 0);
        assert_eq!(backend.live_buffer_count(), 0);
    }

    #[test]
    fn test_allocation_failure_releases_partial_work() {
        let mut graph = RenderGraph::new();
        color_target(&mut graph, "A");
        color_target(&mut graph, "B");

        let mut backend = DummyBackend::new().with_texture_budget(1);
        let result = graph.compile(&mut backend);
        assert!(matches!(
            result,
            Err(GraphError::Backend(BackendError::OutOfMemory))
        ));
        assert_eq!(backend.live_texture_count(), 0);
    }

    #[test]
    fn test_builder_without_shader_fails() {
        let mut graph = RenderGraph::new();
        graph
            .create_pass(PassDesc::graphics("Shaded").build_with(|ctx| {
                ctx.shader()?;
                Ok(Box::new(NoopRunnable) as Box<dyn Runnable>)
            }))
            .unwrap();

        let mut backend = DummyBackend::new();
        assert_eq!(
            graph.compile(&mut backend).err(),
            Some(GraphError::MissingShader {
                pass: "Shaded".into()
            })
        );
    }
}
