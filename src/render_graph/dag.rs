//! Dependency graph construction
//!
//! Explicit edges come from declared dependencies. Implicit edges are
//! inferred from passes touching overlapping views of one resource: the
//! writer runs first, unless the other pass only reads and is explicitly
//! ordered before the writer. Opposing implicit edges form a cycle and are
//! rejected, as are unordered writers.

use std::collections::{BTreeSet, HashMap};

use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::pass::{PassHandle, PassNode};
use crate::render_graph::resource::ResourceRegistry;

/// Origin of an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Declared with `depends_on` or `add_dependency`
    Explicit,
    /// Inferred from overlapping views
    Implicit,
}

/// Directed edge `from -> to`: `from` runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: PassHandle,
    pub to: PassHandle,
    pub kind: EdgeKind,
}

/// Acyclic pass dependency graph.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    successors: Vec<BTreeSet<usize>>,
    edges: Vec<Edge>,
}

impl DependencyGraph {
    /// Build and validate the graph over `nodes`, indexed by handle.
    pub fn build(nodes: &[PassNode], registry: &ResourceRegistry) -> GraphResult<Self> {
        let mut graph = Self {
            successors: vec![BTreeSet::new(); nodes.len()],
            edges: Vec::new(),
        };

        graph.add_explicit_edges(nodes)?;
        let explicit = graph.successors.clone();
        graph.add_implicit_edges(nodes, &explicit);
        graph.detect_cycles(nodes)?;
        graph.check_write_order(nodes, registry)?;

        log::debug!(
            "Dependency graph: {} passes, {} edges",
            nodes.len(),
            graph.edges.len()
        );
        Ok(graph)
    }

    fn add_edge(&mut self, from: usize, to: usize, kind: EdgeKind) -> bool {
        if !self.successors[from].insert(to) {
            return false;
        }
        self.edges.push(Edge {
            from: PassHandle(from as u32),
            to: PassHandle(to as u32),
            kind,
        });
        true
    }

    fn add_explicit_edges(&mut self, nodes: &[PassNode]) -> GraphResult<()> {
        let by_name: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.name.as_str(), index))
            .collect();

        for (index, node) in nodes.iter().enumerate() {
            for name in &node.dependencies {
                let dependency = by_name.get(name.as_str()).copied().ok_or_else(|| {
                    GraphError::MissingDependency {
                        pass: node.name.clone(),
                        dependency: name.clone(),
                    }
                })?;
                self.add_explicit(nodes, dependency, index)?;
            }
            for handle in &node.explicit {
                self.add_explicit(nodes, handle.index(), index)?;
            }
        }
        Ok(())
    }

    fn add_explicit(&mut self, nodes: &[PassNode], from: usize, to: usize) -> GraphResult<()> {
        if from == to {
            return Err(GraphError::CyclicDependency {
                from: nodes[from].name.clone(),
                to: nodes[to].name.clone(),
            });
        }
        self.add_edge(from, to, EdgeKind::Explicit);
        Ok(())
    }

    /// `explicit` is the successor set before any implicit edge was added;
    /// opposing implicit edges are kept so cycle detection can report them.
    fn add_implicit_edges(&mut self, nodes: &[PassNode], explicit: &[BTreeSet<usize>]) {
        for (writer_index, writer) in nodes.iter().enumerate() {
            for output in &writer.outputs {
                for (other_index, other) in nodes.iter().enumerate() {
                    if other_index == writer_index {
                        continue;
                    }
                    // Writer pairs are never inferred; they must be ordered explicitly.
                    if other.outputs.iter().any(|view| view.overlaps(output)) {
                        continue;
                    }
                    if !other.inputs.iter().any(|view| view.overlaps(output)) {
                        continue;
                    }
                    if self.successors[writer_index].contains(&other_index) {
                        continue;
                    }
                    // Reader explicitly ordered before the writer.
                    if reaches_in(explicit, other_index, writer_index) {
                        continue;
                    }
                    if self.add_edge(writer_index, other_index, EdgeKind::Implicit) {
                        log::trace!(
                            "Implicit edge '{}' -> '{}'",
                            writer.name,
                            other.name
                        );
                    }
                }
            }
        }
    }

    /// Depth-first search in declaration order; the first back-edge found is
    /// reported.
    fn detect_cycles(&self, nodes: &[PassNode]) -> GraphResult<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Gray,
            Black,
        }

        let mut marks = vec![Mark::White; nodes.len()];
        for root in 0..nodes.len() {
            if marks[root] != Mark::White {
                continue;
            }
            let mut stack: Vec<(usize, Vec<usize>)> = vec![(root, self.pending(root))];
            marks[root] = Mark::Gray;

            while let Some((node, pending)) = stack.last_mut() {
                let node = *node;
                match pending.pop() {
                    Some(next) => {
                        match marks[next] {
                            Mark::Gray => {
                                return Err(GraphError::CyclicDependency {
                                    from: nodes[node].name.clone(),
                                    to: nodes[next].name.clone(),
                                });
                            }
                            Mark::White => {
                                marks[next] = Mark::Gray;
                                stack.push((next, self.pending(next)));
                            }
                            Mark::Black => {}
                        }
                    }
                    None => {
                        marks[node] = Mark::Black;
                        stack.pop();
                    }
                }
            }
        }
        Ok(())
    }

    /// Successors of `node` reversed, so popping visits them in ascending order.
    fn pending(&self, node: usize) -> Vec<usize> {
        self.successors[node].iter().rev().copied().collect()
    }

    fn check_write_order(&self, nodes: &[PassNode], registry: &ResourceRegistry) -> GraphResult<()> {
        for (first_index, first) in nodes.iter().enumerate() {
            for (second_index, second) in nodes.iter().enumerate().skip(first_index + 1) {
                let shared = first.outputs.iter().find(|a| {
                    second.outputs.iter().any(|b| a.overlaps(b))
                });
                let Some(view) = shared else {
                    continue;
                };
                if self.reaches(first_index, second_index) || self.reaches(second_index, first_index) {
                    continue;
                }
                return Err(GraphError::AmbiguousWriteOrder {
                    first: first.name.clone(),
                    second: second.name.clone(),
                    resource: registry.name(view.resource).to_string(),
                });
            }
        }
        Ok(())
    }

    /// Whether `to` is reachable from `from` along at least one edge.
    pub fn reaches(&self, from: usize, to: usize) -> bool {
        reaches_in(&self.successors, from, to)
    }

    pub fn successors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.successors[index].iter().copied()
    }

    pub fn in_degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0; self.successors.len()];
        for successors in &self.successors {
            for &next in successors {
                degrees[next] += 1;
            }
        }
        degrees
    }

    pub fn has_edge(&self, from: PassHandle, to: PassHandle) -> bool {
        self.successors
            .get(from.index())
            .is_some_and(|successors| successors.contains(&to.index()))
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }
}

fn reaches_in(successors: &[BTreeSet<usize>], from: usize, to: usize) -> bool {
    let mut visited = vec![false; successors.len()];
    let mut stack: Vec<usize> = successors[from].iter().copied().collect();
    while let Some(node) = stack.pop() {
        if node == to {
            return true;
        }
        if std::mem::replace(&mut visited[node], true) {
            continue;
        }
        stack.extend(successors[node].iter().copied());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::*;
    use crate::render_graph::access::AccessKind;
    use crate::render_graph::pass::PassDesc;
    use crate::render_graph::resource::*;

    fn registry() -> (ResourceRegistry, ResourceId) {
        let mut registry = ResourceRegistry::new();
        let color = registry
            .declare(
                "Color",
                ResourceDesc::image_2d(
                    64,
                    64,
                    TextureFormat::Rgba8Unorm,
                    TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                ),
            )
            .unwrap();
        (registry, color)
    }

    fn nodes(descs: Vec<PassDesc>) -> Vec<PassNode> {
        descs
            .into_iter()
            .enumerate()
            .map(|(index, desc)| PassNode::from_desc(PassHandle(index as u32), desc))
            .collect()
    }

    #[test]
    fn test_implicit_edge_writer_to_reader() {
        let (registry, color) = registry();
        let write = registry.full_view(color, AccessKind::ColorAttachment).unwrap();
        let read = registry.full_view(color, AccessKind::Sampled).unwrap();
        let nodes = nodes(vec![
            PassDesc::graphics("Reader").input(read),
            PassDesc::graphics("Writer").output(write),
        ]);

        let graph = DependencyGraph::build(&nodes, &registry).unwrap();
        assert!(graph.has_edge(PassHandle(1), PassHandle(0)));
        assert_eq!(graph.edges()[0].kind, EdgeKind::Implicit);
    }

    #[test]
    fn test_reader_ordered_before_writer_keeps_order() {
        let (registry, color) = registry();
        let write = registry.full_view(color, AccessKind::ColorAttachment).unwrap();
        let read = registry.full_view(color, AccessKind::Sampled).unwrap();
        let nodes = nodes(vec![
            PassDesc::graphics("Reader").input(read),
            PassDesc::graphics("Writer").output(write).depends_on("Reader"),
        ]);

        let graph = DependencyGraph::build(&nodes, &registry).unwrap();
        assert!(graph.has_edge(PassHandle(0), PassHandle(1)));
        assert!(!graph.has_edge(PassHandle(1), PassHandle(0)));
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn test_opposing_implicit_edges_are_a_cycle() {
        let (mut registry, x) = registry();
        let y = registry
            .declare(
                "Other",
                ResourceDesc::image_2d(
                    64,
                    64,
                    TextureFormat::Rgba8Unorm,
                    TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                ),
            )
            .unwrap();
        let write_x = registry.full_view(x, AccessKind::ColorAttachment).unwrap();
        let read_x = registry.full_view(x, AccessKind::Sampled).unwrap();
        let write_y = registry.full_view(y, AccessKind::ColorAttachment).unwrap();
        let read_y = registry.full_view(y, AccessKind::Sampled).unwrap();
        let nodes = nodes(vec![
            PassDesc::graphics("A").output(write_x).input(read_y),
            PassDesc::graphics("B").output(write_y).input(read_x),
        ]);

        assert_eq!(
            DependencyGraph::build(&nodes, &registry).unwrap_err(),
            GraphError::CyclicDependency {
                from: "B".into(),
                to: "A".into()
            }
        );
    }

    #[test]
    fn test_missing_dependency() {
        let (registry, _) = registry();
        let nodes = nodes(vec![PassDesc::graphics("A").depends_on("Nope")]);
        assert_eq!(
            DependencyGraph::build(&nodes, &registry).unwrap_err(),
            GraphError::MissingDependency {
                pass: "A".into(),
                dependency: "Nope".into()
            }
        );
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let (registry, _) = registry();
        let nodes = nodes(vec![PassDesc::graphics("A").depends_on("A")]);
        assert!(matches!(
            DependencyGraph::build(&nodes, &registry),
            Err(GraphError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_transitive_cycle() {
        let (registry, _) = registry();
        let nodes = nodes(vec![
            PassDesc::graphics("A").depends_on("C"),
            PassDesc::graphics("B").depends_on("A"),
            PassDesc::graphics("C").depends_on("B"),
        ]);
        assert_eq!(
            DependencyGraph::build(&nodes, &registry).unwrap_err(),
            GraphError::CyclicDependency {
                from: "C".into(),
                to: "A".into()
            }
        );
    }

    #[test]
    fn test_unordered_writers() {
        let (registry, color) = registry();
        let write = registry.full_view(color, AccessKind::ColorAttachment).unwrap();
        let unordered = nodes(vec![
            PassDesc::graphics("First").output(write),
            PassDesc::graphics("Second").output(write),
        ]);
        assert_eq!(
            DependencyGraph::build(&unordered, &registry).unwrap_err(),
            GraphError::AmbiguousWriteOrder {
                first: "First".into(),
                second: "Second".into(),
                resource: "Color".into()
            }
        );

        let ordered = nodes(vec![
            PassDesc::graphics("First").output(write),
            PassDesc::graphics("Second").output(write).depends_on("First"),
        ]);
        assert!(DependencyGraph::build(&ordered, &registry).is_ok());
    }

    #[test]
    fn test_writers_ordered_through_reader() {
        let (registry, color) = registry();
        let write = registry.full_view(color, AccessKind::ColorAttachment).unwrap();
        let read = registry.full_view(color, AccessKind::Sampled).unwrap();
        let nodes = nodes(vec![
            PassDesc::graphics("First").output(write),
            PassDesc::graphics("Reader").input(read).depends_on("First"),
            PassDesc::graphics("Second").output(write).depends_on("Reader"),
        ]);
        let graph = DependencyGraph::build(&nodes, &registry).unwrap();
        assert!(graph.reaches(0, 2));
        assert_eq!(graph.in_degrees(), vec![0, 1, 1]);
    }

    #[test]
    fn test_disjoint_mips_do_not_conflict() {
        let mut registry = ResourceRegistry::new();
        let chain = registry
            .declare(
                "Chain",
                ResourceDesc::image_2d(
                    64,
                    64,
                    TextureFormat::Rgba16Float,
                    TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                )
                .with_mips(2),
            )
            .unwrap();
        let mip0 = registry.view(chain, Subrange::mip(0), AccessKind::ColorAttachment).unwrap();
        let mip1 = registry.view(chain, Subrange::mip(1), AccessKind::ColorAttachment).unwrap();
        let nodes = nodes(vec![
            PassDesc::graphics("Top").output(mip0),
            PassDesc::graphics("Next").output(mip1),
        ]);
        let graph = DependencyGraph::build(&nodes, &registry).unwrap();
        assert!(graph.edges().is_empty());
    }
}
