//! Interfaces to the dataflow host.
//!
//! The host owns the dependency graph, the recompute scheduler and the
//! component catalog. None of it is thread-safe: everything here is called
//! from the host's own thread, except `EvaluationTarget::evaluate`, which runs
//! on a worker.

pub mod sim;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::model::{DataTree, ParamSpec, Side};

pub type NodeId = Uuid;

/// Identifies a specific parameter slot on a specific node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParamRef {
    pub node: NodeId,
    pub side: Side,
    pub index: usize,
}

impl ParamRef {
    pub fn input(node: NodeId, index: usize) -> Self {
        Self {
            node,
            side: Side::Input,
            index,
        }
    }

    pub fn output(node: NodeId, index: usize) -> Self {
        Self {
            node,
            side: Side::Output,
            index,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// A regular component with an evaluation entry point.
    Component,
    /// Panels, sliders, clusters and other objects without one.
    Special,
}

/// Snapshot of a graph node's identity and signature.
#[derive(Clone, Debug)]
pub struct NodeInfo {
    pub id: NodeId,
    pub display_name: String,
    pub kind: NodeKind,
    pub inputs: Vec<ParamSpec>,
    pub outputs: Vec<ParamSpec>,
}

impl NodeInfo {
    pub fn component(display_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.to_string(),
            kind: NodeKind::Component,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn special(display_name: &str) -> Self {
        Self {
            kind: NodeKind::Special,
            ..Self::component(display_name)
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<ParamSpec>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<ParamSpec>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn params(&self, side: Side) -> &[ParamSpec] {
        match side {
            Side::Input => &self.inputs,
            Side::Output => &self.outputs,
        }
    }
}

/// What a wrapped evaluation hands back.
#[derive(Clone, Debug, Default)]
pub struct Evaluation {
    pub outputs: Vec<Option<DataTree>>,
    pub warnings: Vec<String>,
}

/// Synchronous evaluation entry point of a catalogued component.
///
/// Implementations need not be re-entrant: callers serialize invocations on
/// the same target.
pub trait EvaluationTarget: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, inputs: &[DataTree], tree_mode: bool) -> Result<Evaluation, String>;
}

/// Runtime lookup of evaluation handles by sanitized display name.
pub trait Catalog {
    fn find(&self, name: &str) -> Option<Arc<dyn EvaluationTarget>>;
}

/// The host's dependency graph, as seen from its owning thread.
pub trait Document {
    fn find_node(&self, id: NodeId) -> Option<NodeInfo>;

    fn contains(&self, id: NodeId) -> bool {
        self.find_node(id).is_some()
    }

    /// Parameters that consume data from `source`.
    fn recipients(&self, source: &ParamRef) -> Vec<ParamRef>;

    /// Adds (or replaces) the declaration of a parameter slot on a node.
    fn register_param(&mut self, param: &ParamRef, spec: &ParamSpec);

    /// Removes a parameter slot from its node, dropping its own upstream
    /// sources. Downstream consumers keep referring to it.
    fn unregister_param(&mut self, param: &ParamRef);

    fn disconnect(&mut self, source: &ParamRef, recipient: &ParamRef);

    /// Marks one node for re-evaluation on the next solve pass.
    fn expire(&mut self, node: NodeId);
}

pub type ScheduledCallback = Box<dyn FnOnce(&mut dyn Document) + Send>;

/// Delayed-callback facility of the host. Callbacks run on the host thread
/// before the next solve pass that is due.
pub trait Scheduler {
    fn schedule_after(&self, delay: Duration, callback: ScheduledCallback);
}

/// Messages posted from workers to the host event loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    /// A background run finished; expire the node on the owning thread.
    Refresh(NodeId),
}

/// Catalog key for a display name: all whitespace removed.
pub fn sanitize_name(display_name: &str) -> String {
    display_name.chars().filter(|c| !c.is_whitespace()).collect()
}
