//! Per-frame conditional execution
//!
//! Predicates are evaluated for every pass before anything is recorded and
//! stay frozen for the rest of the frame. Enabled passes record their
//! compiled transitions and runnable in compiled order. A disabled pass
//! records nothing; its transitions are carried forward and folded into the
//! next enabled pass touching the same subresource, so the barrier chain
//! stays valid. Whatever is still carried at the end of the frame is flushed
//! so every frame ends in the compiled final states.

use crate::backend::command::{BarrierCommand, Command, CommandStream};
use crate::backend::traits::GraphicsBackend;
use crate::render_graph::compiler::{CompiledGraph, Transition};
use crate::render_graph::error::GraphResult;
use crate::render_graph::pass::*;

/// Lifecycle of one pass within one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassFrameState {
    Unevaluated,
    Enabled,
    Disabled,
    Executed,
    Skipped,
}

/// What happened during one recorded frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSummary {
    pub frame_index: u64,
    /// Indexed by pass handle
    pub pass_states: Vec<PassFrameState>,
    /// Barrier commands recorded, prologue included
    pub barriers: usize,
    /// Transitions of disabled passes flushed at frame end
    pub flushed: usize,
}

impl FrameSummary {
    pub fn state(&self, pass: PassHandle) -> PassFrameState {
        self.pass_states
            .get(pass.index())
            .copied()
            .unwrap_or(PassFrameState::Unevaluated)
    }

    pub fn executed(&self) -> usize {
        self.pass_states
            .iter()
            .filter(|state| **state == PassFrameState::Executed)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.pass_states
            .iter()
            .filter(|state| **state == PassFrameState::Skipped)
            .count()
    }
}

/// Walks a compiled graph once per frame
#[derive(Debug, Default)]
pub struct FrameExecutor {
    states: Vec<PassFrameState>,
    frames_recorded: u64,
}

fn composes(carried: &Transition, next: &Transition) -> bool {
    carried.resource == next.resource
        && carried.subrange == next.subrange
        && carried.after.access == next.before.access
}

fn carry(pending: &mut Vec<Transition>, transition: &Transition) {
    match pending.iter_mut().find(|carried| composes(carried, transition)) {
        Some(carried) => carried.after = transition.after,
        None => pending.push(transition.clone()),
    }
}

impl FrameExecutor {
    pub fn new(graph: &CompiledGraph) -> Self {
        Self {
            states: vec![PassFrameState::Unevaluated; graph.passes().len()],
            frames_recorded: 0,
        }
    }

    /// Number of frames recorded so far.
    pub fn frames_recorded(&self) -> u64 {
        self.frames_recorded
    }

    /// Current state of a pass.
    pub fn state(&self, pass: PassHandle) -> PassFrameState {
        self.states
            .get(pass.index())
            .copied()
            .unwrap_or(PassFrameState::Unevaluated)
    }

    fn evaluate(&mut self, graph: &CompiledGraph, frame: &FrameContext) {
        self.states.clear();
        self.states.extend(graph.passes().iter().map(|node| {
            if node.is_enabled(frame) {
                PassFrameState::Enabled
            } else {
                PassFrameState::Disabled
            }
        }));
    }

    fn emit(graph: &CompiledGraph, stream: &mut CommandStream, transition: &Transition) -> bool {
        let Some(physical) = graph.physical(transition.resource) else {
            return false;
        };
        let is_image = physical.as_texture().is_some();
        if !transition.before.needs_barrier(&transition.after, is_image) {
            return false;
        }
        stream.push(Command::Barrier(BarrierCommand {
            resource: transition.resource,
            physical,
            subrange: transition.subrange,
            before: transition.before,
            after: transition.after,
        }));
        true
    }

    /// Record one frame into `stream`.
    pub fn record(
        &mut self,
        graph: &CompiledGraph,
        frame: &FrameContext,
        stream: &mut CommandStream,
    ) -> FrameSummary {
        self.evaluate(graph, frame);

        let mut barriers = 0;
        if self.frames_recorded > 0 {
            for transition in graph.schedule().prologue() {
                barriers += Self::emit(graph, stream, transition) as usize;
            }
        }

        let mut pending: Vec<Transition> = Vec::new();
        for &handle in graph.order() {
            let node = graph.pass(handle);
            let own = graph.transitions(handle);

            if self.states[handle.index()] == PassFrameState::Disabled {
                for transition in own {
                    carry(&mut pending, transition);
                }
                self.states[handle.index()] = PassFrameState::Skipped;
                log::trace!("Skipped pass '{}'", node.name());
                continue;
            }

            let (carried, rest): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|transition| node.touches(transition.resource, &transition.subrange));
            pending = rest;

            let mut used = vec![false; own.len()];
            let mut issued = Vec::with_capacity(carried.len() + own.len());
            for transition in carried {
                let next = own
                    .iter()
                    .enumerate()
                    .find(|(index, next)| !used[*index] && composes(&transition, next));
                match next {
                    Some((index, next)) => {
                        used[index] = true;
                        issued.push(Transition {
                            after: next.after,
                            ..transition
                        });
                    }
                    None => issued.push(transition),
                }
            }
            issued.extend(
                own.iter()
                    .zip(&used)
                    .filter(|(_, used)| !**used)
                    .map(|(transition, _)| transition.clone()),
            );

            for transition in &issued {
                barriers += Self::emit(graph, stream, transition) as usize;
            }

            stream.push(Command::PushDebugGroup(node.name().to_string()));
            let mut ctx = RecordContext {
                stream: &mut *stream,
                frame,
                pass_name: node.name(),
            };
            graph.runnable(handle).record(&mut ctx);
            stream.push(Command::PopDebugGroup);

            self.states[handle.index()] = PassFrameState::Executed;
            log::trace!("Recorded pass '{}' ({} barriers)", node.name(), issued.len());
        }

        let flushed = pending.len();
        if flushed > 0 {
            log::debug!(
                "Frame {}: flushing {} transitions of disabled passes",
                frame.frame_index,
                flushed
            );
            for transition in &pending {
                barriers += Self::emit(graph, stream, transition) as usize;
            }
        }

        self.frames_recorded += 1;
        FrameSummary {
            frame_index: frame.frame_index,
            pass_states: self.states.clone(),
            barriers,
            flushed,
        }
    }

    /// Record one frame and submit it to `backend`.
    pub fn execute<B: GraphicsBackend>(
        &mut self,
        graph: &CompiledGraph,
        frame: &FrameContext,
        backend: &mut B,
    ) -> GraphResult<FrameSummary> {
        let mut stream = CommandStream::new();
        let summary = self.record(graph, frame, &mut stream);
        backend.submit(stream)?;
        Ok(summary)
    }
}
