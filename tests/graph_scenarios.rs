//! End-to-end scheduling scenarios for the render graph.
//!
//! Every test runs headless against the `DummyBackend`.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::{color_target, init_logging};
use proptest::prelude::*;
use render_graph_engine::backend::{BufferUsage, CommandStream, DummyBackend, TextureFormat, TextureUsage};
use render_graph_engine::pipeline::depth_prepass::add_depth_pass;
use render_graph_engine::pipeline::depth_range::{add_depth_range_pass, DEPTH_RANGE_SIZE};
use render_graph_engine::pipeline::PassSettings;
use render_graph_engine::render_graph::*;
use render_graph_engine::technique::ShaderLibrary;

// ============================================================================
// Ordering
// ============================================================================

const MAX_PASSES: usize = 16;

/// Per pass: which earlier outputs it samples and an optional earlier pass
/// it depends on by name.
type PassSpec = (Vec<bool>, Option<prop::sample::Index>);

fn pass_specs() -> impl Strategy<Value = Vec<PassSpec>> {
    prop::collection::vec(
        (
            prop::collection::vec(prop::bool::weighted(0.3), MAX_PASSES),
            prop::option::weighted(0.25, any::<prop::sample::Index>()),
        ),
        4..MAX_PASSES,
    )
}

/// Every resource has exactly one writer and readers only sample resources
/// written by earlier passes.
fn generated_graph(specs: &[PassSpec]) -> RenderGraph {
    let mut graph = RenderGraph::new();
    let mut written: Vec<ResourceId> = Vec::new();

    for (index, (samples, dependency)) in specs.iter().enumerate() {
        let target = color_target(&mut graph, &format!("R{}", index));
        let mut desc = PassDesc::graphics(format!("P{}", index))
            .output(graph.full_view(target, AccessKind::ColorAttachment).unwrap());

        for (&resource, &sampled) in written.iter().zip(samples) {
            if sampled {
                desc = desc.input(graph.full_view(resource, AccessKind::Sampled).unwrap());
            }
        }
        if let Some(dependency) = dependency.as_ref().filter(|_| index > 0) {
            desc = desc.depends_on(format!("P{}", dependency.index(index)));
        }
        graph.create_pass(desc).unwrap();
        written.push(target);
    }
    graph
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_order_respects_every_edge(specs in pass_specs()) {
        init_logging();
        let graph = generated_graph(&specs);
        let schedule = graph.schedule().unwrap();
        prop_assert_eq!(schedule.order().len(), graph.passes().len());

        let position: HashMap<PassHandle, usize> = schedule
            .order()
            .iter()
            .enumerate()
            .map(|(position, handle)| (*handle, position))
            .collect();
        prop_assert_eq!(position.len(), graph.passes().len());

        for edge in schedule.dependencies().edges() {
            prop_assert!(
                position[&edge.from] < position[&edge.to],
                "{} must precede {}",
                graph.pass(edge.from).name(),
                graph.pass(edge.to).name()
            );
        }

        // Every reader runs after the writer of what it samples
        for reader in graph.passes() {
            for input in reader.inputs() {
                let writer = graph
                    .passes()
                    .iter()
                    .find(|pass| pass.outputs().iter().any(|output| output.overlaps(input)))
                    .unwrap();
                prop_assert!(position[&writer.handle()] < position[&reader.handle()]);
            }
        }
    }

    #[test]
    fn test_schedule_is_idempotent(specs in pass_specs()) {
        let first = generated_graph(&specs).schedule().unwrap();
        let graph = generated_graph(&specs);
        let second = graph.schedule().unwrap();
        let third = graph.schedule().unwrap();

        prop_assert_eq!(first.order(), second.order());
        prop_assert_eq!(second.order(), third.order());
        for pass in graph.passes() {
            prop_assert_eq!(first.transitions(pass.handle()), second.transitions(pass.handle()));
            prop_assert_eq!(second.transitions(pass.handle()), third.transitions(pass.handle()));
        }
        prop_assert_eq!(first.final_states(), third.final_states());
    }
}

#[test]
fn test_mutual_dependencies_are_a_cycle() {
    let mut graph = RenderGraph::new();
    graph.create_pass(PassDesc::graphics("A").depends_on("B")).unwrap();
    graph.create_pass(PassDesc::graphics("B").depends_on("A")).unwrap();

    let result = graph.schedule();
    assert!(matches!(result, Err(GraphError::CyclicDependency { .. })));

    let mut backend = DummyBackend::new();
    assert!(graph.compile(&mut backend).is_err());
    assert_eq!(backend.live_texture_count(), 0);
}

#[test]
fn test_implicit_cycle_is_rejected() {
    init_logging();
    // Each pass samples what the other one writes
    for a_first in [true, false] {
        let mut graph = RenderGraph::new();
        let x = color_target(&mut graph, "X");
        let y = color_target(&mut graph, "Y");
        let a = PassDesc::graphics("A")
            .output(graph.full_view(x, AccessKind::ColorAttachment).unwrap())
            .input(graph.full_view(y, AccessKind::Sampled).unwrap());
        let b = PassDesc::graphics("B")
            .output(graph.full_view(y, AccessKind::ColorAttachment).unwrap())
            .input(graph.full_view(x, AccessKind::Sampled).unwrap());
        let (first, second) = if a_first { (a, b) } else { (b, a) };
        graph.create_pass(first).unwrap();
        graph.create_pass(second).unwrap();

        assert!(
            matches!(graph.schedule(), Err(GraphError::CyclicDependency { .. })),
            "A declared first: {}",
            a_first
        );

        let mut backend = DummyBackend::new();
        assert!(matches!(
            graph.compile(&mut backend),
            Err(GraphError::CyclicDependency { .. })
        ));
        assert_eq!(backend.live_texture_count(), 0);
    }
}

#[test]
fn test_missing_dependency_fails_compile() {
    let mut graph = RenderGraph::new();
    let color = color_target(&mut graph, "Color");
    graph
        .create_pass(
            PassDesc::graphics("Composite")
                .output(graph.full_view(color, AccessKind::ColorAttachment).unwrap())
                .depends_on("Nowhere"),
        )
        .unwrap();

    let expected = GraphError::MissingDependency {
        pass: "Composite".into(),
        dependency: "Nowhere".into(),
    };
    assert_eq!(graph.schedule().err(), Some(expected.clone()));

    let mut backend = DummyBackend::new();
    assert_eq!(graph.compile(&mut backend).err(), Some(expected));
    assert_eq!(backend.live_texture_count(), 0);
    assert_eq!(backend.live_pipeline_count(), 0);
}

#[test]
fn test_write_after_read_by_explicit_dependency() {
    let mut graph = RenderGraph::new();
    let color = color_target(&mut graph, "Color");
    graph
        .create_pass(
            PassDesc::graphics("Writer")
                .output(graph.full_view(color, AccessKind::ColorAttachment).unwrap())
                .depends_on("Reader"),
        )
        .unwrap();
    graph
        .create_pass(PassDesc::graphics("Reader").input(graph.full_view(color, AccessKind::Sampled).unwrap()))
        .unwrap();

    // The reader is ordered first, so the write is a write-after-read
    let schedule = graph.schedule().unwrap();
    let names: Vec<_> = schedule.order().iter().map(|h| graph.pass(*h).name()).collect();
    assert_eq!(names, vec!["Reader", "Writer"]);
}

#[test]
fn test_ambiguous_writers_resolved_by_dependency() {
    let mut graph = RenderGraph::new();
    let color = color_target(&mut graph, "Color");
    let write = graph.full_view(color, AccessKind::ColorAttachment).unwrap();
    let first = graph.create_pass(PassDesc::graphics("First").output(write)).unwrap();
    let second = graph.create_pass(PassDesc::graphics("Second").output(write)).unwrap();

    assert_eq!(
        graph.schedule().err(),
        Some(GraphError::AmbiguousWriteOrder {
            first: "First".into(),
            second: "Second".into(),
            resource: "Color".into(),
        })
    );

    graph.add_dependency(second, first);
    let schedule = graph.schedule().unwrap();
    assert_eq!(schedule.order(), &[first, second]);
    let transitions = schedule.transitions(second);
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].before.access, AccessKind::ColorAttachment);
    assert_eq!(transitions[0].after.access, AccessKind::ColorAttachment);
    assert_eq!(transitions[0].producer, Some(first));
}

// ============================================================================
// Transitions
// ============================================================================

#[test]
fn test_depth_then_depth_range() {
    init_logging();
    let shaders = ShaderLibrary::placeholder();
    let settings = PassSettings::new(64, 64);
    let attachment = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;

    let mut graph = RenderGraph::new();
    let depth = graph
        .declare_resource(
            "Depth",
            ResourceDesc::image_2d(64, 64, TextureFormat::Depth32Float, attachment),
        )
        .unwrap();
    let depth_obj = graph
        .declare_resource(
            "DepthObj",
            ResourceDesc::image_2d(64, 64, TextureFormat::Rgba32Float, attachment),
        )
        .unwrap();
    let range = graph
        .declare_resource("DepthRange", ResourceDesc::buffer(DEPTH_RANGE_SIZE, BufferUsage::STORAGE))
        .unwrap();

    let depth_pass = add_depth_pass(&mut graph, settings, &shaders, depth, depth_obj).unwrap();
    let range_pass = add_depth_range_pass(&mut graph, settings, &shaders, depth_obj, range).unwrap();

    let schedule = graph.schedule().unwrap();
    assert_eq!(schedule.order(), &[depth_pass, range_pass]);
    assert_eq!(schedule.transition_count(), 1);
    assert!(schedule.transitions(depth_pass).is_empty());

    let transition = &schedule.transitions(range_pass)[0];
    assert_eq!(transition.resource, depth_obj);
    assert_eq!(transition.before.access, AccessKind::ColorAttachment);
    assert_eq!(transition.before.stages, PipelineStages::COLOR_OUTPUT);
    assert_eq!(transition.after.access, AccessKind::Sampled);
    assert_eq!(transition.after.stages, PipelineStages::COMPUTE_SHADER);
    assert_eq!(transition.producer, Some(depth_pass));

    let mut backend = DummyBackend::new();
    let compiled = graph.compile(&mut backend).unwrap();
    let mut executor = FrameExecutor::new(&compiled);
    let summary = executor
        .execute(&compiled, &FrameContext::new(0, 0.016), &mut backend)
        .unwrap();
    assert_eq!(summary.barriers, 1);
    let stream = backend.last_submission().unwrap();
    assert_eq!(stream.barriers().count(), 1);
    assert_eq!(stream.debug_groups().collect::<Vec<_>>(), vec!["Depth", "DepthRange"]);
}

#[test]
fn test_independent_readers_share_the_producer() {
    let mut graph = RenderGraph::new();
    let depth_obj = color_target(&mut graph, "DepthObj");
    let ssao = color_target(&mut graph, "Ssao");
    let hdr = color_target(&mut graph, "HdrColor");

    let producer = graph
        .create_pass(
            PassDesc::graphics("Depth").output(graph.full_view(depth_obj, AccessKind::ColorAttachment).unwrap()),
        )
        .unwrap();
    let occlusion = graph
        .create_pass(
            PassDesc::graphics("Ssao")
                .input(graph.full_view(depth_obj, AccessKind::Sampled).unwrap())
                .output(graph.full_view(ssao, AccessKind::ColorAttachment).unwrap()),
        )
        .unwrap();
    let opaque = graph
        .create_pass(
            PassDesc::graphics("Opaque")
                .input(graph.full_view(depth_obj, AccessKind::Sampled).unwrap())
                .output(graph.full_view(hdr, AccessKind::ColorAttachment).unwrap()),
        )
        .unwrap();

    let schedule = graph.schedule().unwrap();
    let dag = schedule.dependencies();
    assert!(dag.has_edge(producer, occlusion));
    assert!(dag.has_edge(producer, opaque));
    assert!(!dag.reaches(occlusion.index(), opaque.index()));
    assert!(!dag.reaches(opaque.index(), occlusion.index()));

    assert_eq!(schedule.order(), &[producer, occlusion, opaque]);
    assert_eq!(schedule.transitions(occlusion).len(), 1);
    assert!(schedule.transitions(opaque).is_empty());
}

// ============================================================================
// Conditional execution
// ============================================================================

#[test]
fn test_disabled_pass_keeps_compiled_order() {
    let toggle = Arc::new(AtomicBool::new(true));
    let mut graph = RenderGraph::new();
    let color = color_target(&mut graph, "Color");
    let blurred = color_target(&mut graph, "Blurred");

    graph
        .create_pass(PassDesc::graphics("Scene").output(graph.full_view(color, AccessKind::ColorAttachment).unwrap()))
        .unwrap();
    let enabled = toggle.clone();
    let blur = graph
        .create_pass(
            PassDesc::graphics("Blur")
                .input(graph.full_view(color, AccessKind::Sampled).unwrap())
                .output(graph.full_view(blurred, AccessKind::ColorAttachment).unwrap())
                .enabled_if(move |_| enabled.load(Ordering::Relaxed)),
        )
        .unwrap();
    graph
        .create_pass(
            PassDesc::graphics("Present")
                .input(graph.full_view(color, AccessKind::Sampled).unwrap())
                .input(graph.full_view(blurred, AccessKind::Sampled).unwrap()),
        )
        .unwrap();

    let mut backend = DummyBackend::new();
    let compiled = graph.compile(&mut backend).unwrap();
    let order = compiled.order().to_vec();
    let mut executor = FrameExecutor::new(&compiled);

    let mut stream = CommandStream::new();
    let summary = executor.record(&compiled, &FrameContext::new(0, 0.016), &mut stream);
    assert_eq!(summary.state(blur), PassFrameState::Executed);
    assert_eq!(stream.debug_groups().collect::<Vec<_>>(), vec!["Scene", "Blur", "Present"]);

    toggle.store(false, Ordering::Relaxed);
    let mut stream = CommandStream::new();
    let summary = executor.record(&compiled, &FrameContext::new(1, 0.016), &mut stream);
    assert_eq!(summary.state(blur), PassFrameState::Skipped);
    assert_eq!(summary.executed(), 2);
    assert_eq!(summary.skipped(), 1);
    assert_eq!(stream.debug_groups().collect::<Vec<_>>(), vec!["Scene", "Present"]);
    assert_eq!(compiled.order(), order.as_slice());

    toggle.store(true, Ordering::Relaxed);
    let mut stream = CommandStream::new();
    let summary = executor.record(&compiled, &FrameContext::new(2, 0.016), &mut stream);
    assert_eq!(summary.executed(), 3);
    assert_eq!(summary.flushed, 0);
}
