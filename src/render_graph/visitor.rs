//! Read-only introspection of compiled graphs

use std::fmt::Write;

use crate::render_graph::access::{ImageLayout, ResourceState};
use crate::render_graph::compiler::Transition;
use crate::render_graph::dag::EdgeKind;
use crate::render_graph::pass::PassNode;
use crate::render_graph::resource::{Resource, Subrange};

/// Visitor over a compiled graph
///
/// Callbacks arrive as: resources, passes in compiled order (each followed
/// by its transitions), edges, final states. Every method has an empty
/// default so tools implement only what they need.
pub trait GraphVisitor {
    fn visit_resource(&mut self, _resource: &Resource) {}

    fn visit_pass(&mut self, _position: usize, _pass: &PassNode) {}

    fn visit_transition(&mut self, _pass: &PassNode, _transition: &Transition) {}

    fn visit_edge(&mut self, _from: &PassNode, _to: &PassNode, _kind: EdgeKind) {}

    fn visit_final_state(&mut self, _resource: &Resource, _subrange: &Subrange, _state: &ResourceState) {}
}

/// Text report of a compiled graph, used for debug logging.
#[derive(Debug, Default)]
pub struct GraphDump {
    out: String,
    image_names: Vec<String>,
}

impl GraphDump {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.out
    }

    pub fn into_string(self) -> String {
        self.out
    }

    /// Final layout of an image range, `None` for buffers.
    fn layout(&self, resource: &Resource, state: &ResourceState) -> Option<ImageLayout> {
        self.image_names
            .iter()
            .any(|name| *name == resource.name)
            .then(|| state.layout())
    }
}

impl GraphVisitor for GraphDump {
    fn visit_resource(&mut self, resource: &Resource) {
        if resource.desc.is_image() {
            self.image_names.push(resource.name.clone());
        }
        let _ = writeln!(self.out, "resource {} {:?}", resource.name, resource.desc);
    }

    fn visit_pass(&mut self, position: usize, pass: &PassNode) {
        let _ = writeln!(
            self.out,
            "pass #{} {} ({:?}, {:?}){}",
            position,
            pass.name(),
            pass.pass_type(),
            pass.kind(),
            if pass.has_predicate() { " conditional" } else { "" }
        );
    }

    fn visit_transition(&mut self, _pass: &PassNode, transition: &Transition) {
        let _ = writeln!(
            self.out,
            "  barrier {:?} {:?}: {:?} -> {:?}",
            transition.resource, transition.subrange, transition.before.access, transition.after.access
        );
    }

    fn visit_edge(&mut self, from: &PassNode, to: &PassNode, kind: EdgeKind) {
        let _ = writeln!(self.out, "edge {} -> {} ({:?})", from.name(), to.name(), kind);
    }

    fn visit_final_state(&mut self, resource: &Resource, subrange: &Subrange, state: &ResourceState) {
        match self.layout(resource, state) {
            Some(layout) => {
                let _ = writeln!(self.out, "final {} {:?}: {:?}", resource.name, subrange, layout);
            }
            None => {
                let _ = writeln!(self.out, "final {} {:?}: {:?}", resource.name, subrange, state.access);
            }
        }
    }
}
