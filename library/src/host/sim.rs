//! In-memory host used by the headless app and the tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::debug;

use super::{
    Catalog, Document, Evaluation, EvaluationTarget, NodeId, NodeInfo, ParamRef,
    ScheduledCallback, Scheduler, sanitize_name,
};
use crate::model::{DataTree, ParamSpec};

/// A wire, remembering which registration of its source slot it was made
/// against.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Wire {
    source: ParamRef,
    recipient: ParamRef,
    generation: Option<u64>,
}

/// A dependency graph reduced to nodes, wires, registered slots and an
/// expiry list.
#[derive(Default)]
pub struct SimDocument {
    nodes: HashMap<NodeId, NodeInfo>,
    wires: Vec<Wire>,
    registered: HashMap<ParamRef, (u64, ParamSpec)>,
    unregistered: HashSet<ParamRef>,
    next_generation: u64,
    expired: Vec<NodeId>,
}

impl SimDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: NodeInfo) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    /// Removes a node and every wire touching it.
    pub fn remove_node(&mut self, id: NodeId) -> Option<NodeInfo> {
        self.wires
            .retain(|w| w.source.node != id && w.recipient.node != id);
        self.registered.retain(|param, _| param.node != id);
        self.expired.retain(|e| *e != id);
        self.nodes.remove(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeInfo> {
        self.nodes.get_mut(&id)
    }

    pub fn connect(&mut self, source: ParamRef, recipient: ParamRef) {
        let exists = self
            .wires
            .iter()
            .any(|w| w.source == source && w.recipient == recipient);
        if !exists {
            let generation = self.registered.get(&source).map(|(g, _)| *g);
            self.wires.push(Wire {
                source,
                recipient,
                generation,
            });
        }
    }

    pub fn sources(&self, recipient: &ParamRef) -> Vec<ParamRef> {
        self.wires
            .iter()
            .filter(|w| &w.recipient == recipient)
            .map(|w| w.source.clone())
            .collect()
    }

    pub fn wires(&self) -> Vec<(ParamRef, ParamRef)> {
        self.wires
            .iter()
            .map(|w| (w.source.clone(), w.recipient.clone()))
            .collect()
    }

    /// Declaration currently registered for a slot.
    pub fn param(&self, param: &ParamRef) -> Option<&ParamSpec> {
        self.registered.get(param).map(|(_, spec)| spec)
    }

    /// Wires still feeding a consumer from a slot that was unregistered, or
    /// from an earlier registration of a slot that has since been rebuilt.
    pub fn dangling_wires(&self) -> Vec<(ParamRef, ParamRef)> {
        self.wires
            .iter()
            .filter(|w| {
                if self.unregistered.contains(&w.source) {
                    return true;
                }
                match (w.generation, self.registered.get(&w.source)) {
                    (Some(made), Some((current, _))) => made != *current,
                    _ => false,
                }
            })
            .map(|w| (w.source.clone(), w.recipient.clone()))
            .collect()
    }

    pub fn is_expired(&self, id: NodeId) -> bool {
        self.expired.contains(&id)
    }

    /// Drains the expiry list in request order.
    pub fn take_expired(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.expired)
    }
}

impl Document for SimDocument {
    fn find_node(&self, id: NodeId) -> Option<NodeInfo> {
        self.nodes.get(&id).cloned()
    }

    fn recipients(&self, source: &ParamRef) -> Vec<ParamRef> {
        self.wires
            .iter()
            .filter(|w| &w.source == source)
            .map(|w| w.recipient.clone())
            .collect()
    }

    fn register_param(&mut self, param: &ParamRef, spec: &ParamSpec) {
        self.next_generation += 1;
        self.unregistered.remove(param);
        self.registered
            .insert(param.clone(), (self.next_generation, spec.clone()));
    }

    fn unregister_param(&mut self, param: &ParamRef) {
        self.wires.retain(|w| &w.recipient != param);
        self.registered.remove(param);
        self.unregistered.insert(param.clone());
    }

    fn disconnect(&mut self, source: &ParamRef, recipient: &ParamRef) {
        self.wires
            .retain(|w| !(&w.source == source && &w.recipient == recipient));
    }

    fn expire(&mut self, node: NodeId) {
        if self.nodes.contains_key(&node) && !self.expired.contains(&node) {
            self.expired.push(node);
        }
    }
}

struct Pending {
    due: Duration,
    seq: u64,
    callback: ScheduledCallback,
}

#[derive(Default)]
struct Timeline {
    now: Duration,
    next_seq: u64,
    pending: Vec<Pending>,
}

/// Scheduler driven by an explicit clock, so tests decide when time passes.
#[derive(Default)]
pub struct ManualScheduler {
    timeline: Mutex<Timeline>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.timeline().pending.len()
    }

    /// Moves the clock forward and runs every callback that fell due, in due
    /// order. Callbacks scheduled while running are not run in the same call.
    pub fn advance(&self, delta: Duration, doc: &mut dyn Document) -> usize {
        let due: Vec<Pending> = {
            let mut timeline = self.timeline();
            timeline.now += delta;
            let now = timeline.now;
            let (mut due, rest): (Vec<Pending>, Vec<Pending>) =
                timeline.pending.drain(..).partition(|p| p.due <= now);
            timeline.pending = rest;
            due.sort_by_key(|p| (p.due, p.seq));
            due
        };

        let count = due.len();
        for pending in due {
            (pending.callback)(&mut *doc);
        }
        if count > 0 {
            debug!("ManualScheduler ran {} callback(s)", count);
        }
        count
    }

    fn timeline(&self) -> std::sync::MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_after(&self, delay: Duration, callback: ScheduledCallback) {
        let mut timeline = self.timeline();
        let due = timeline.now + delay;
        let seq = timeline.next_seq;
        timeline.next_seq += 1;
        timeline.pending.push(Pending { due, seq, callback });
    }
}

/// Catalog backed by a map keyed on sanitized names.
#[derive(Default)]
pub struct MapCatalog {
    entries: HashMap<String, Arc<dyn EvaluationTarget>>,
}

impl MapCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, target: Arc<dyn EvaluationTarget>) {
        self.entries.insert(sanitize_name(target.name()), target);
    }
}

impl Catalog for MapCatalog {
    fn find(&self, name: &str) -> Option<Arc<dyn EvaluationTarget>> {
        self.entries.get(name).cloned()
    }
}

/// Evaluation target wrapping a closure.
pub struct FnTarget<F> {
    name: String,
    f: F,
}

impl<F> FnTarget<F>
where
    F: Fn(&[DataTree], bool) -> Result<Evaluation, String> + Send + Sync,
{
    pub fn new(name: &str, f: F) -> Self {
        Self {
            name: name.to_string(),
            f,
        }
    }
}

impl<F> EvaluationTarget for FnTarget<F>
where
    F: Fn(&[DataTree], bool) -> Result<Evaluation, String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, inputs: &[DataTree], tree_mode: bool) -> Result<Evaluation, String> {
        (self.f)(inputs, tree_mode)
    }
}
