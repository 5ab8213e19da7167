//! The proxy node: redirects evaluation of a linked node onto a worker and
//! hands the result back on a later solve pass.

pub mod mirror;
pub mod state;
pub mod target;

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Duration;

use log::{info, warn};

pub use mirror::{ParameterMirror, RecordedLinks, schedule_unwire};
pub use state::ProxyState;
pub use target::{Resolution, ResolvedTarget, TargetRef};

use crate::diagnostics::RuntimeMessage;
use crate::error::{ConfigurationError, GhostError};
use crate::host::{Catalog, Document, HostEvent, NodeId, Scheduler};
use crate::model::{DataTree, Side};
use crate::util::timing::ScopedTimer;
use crate::worker::{DispatchRequest, RunState, WorkerDispatcher, WorkerPool};

pub const PROXY_NAME: &str = "Ghost Worker";
pub const PROXY_NICKNAME: &str = "GhWkr";

/// What the host hands the proxy for one solve.
#[derive(Clone, Debug, Default)]
pub struct SolveInput {
    /// Node wired into the link slot.
    pub link: Option<NodeId>,
    /// Trees on the mirrored input slots, in slot order.
    pub trees: Vec<DataTree>,
}

#[derive(Clone, Debug, Default)]
pub struct SolveOutput {
    /// Contents of the message output.
    pub message: Vec<String>,
    /// Trees for the mirrored output slots. Holds the last consumed run until
    /// a newer one is consumed.
    pub results: Vec<Option<DataTree>>,
    pub diagnostics: Vec<RuntimeMessage>,
}

/// Host collaborators available during a solve pass.
pub struct SolveContext<'a> {
    pub doc: &'a mut dyn Document,
    pub catalog: &'a dyn Catalog,
    pub scheduler: &'a dyn Scheduler,
}

pub struct ProxyInstance {
    id: NodeId,
    target: TargetRef,
    mirror: ParameterMirror,
    dispatcher: WorkerDispatcher,
    auto_requeue: bool,
    /// Target the in-flight or unconsumed run was started for.
    run_target: Option<NodeId>,
    /// Trees that run was started with.
    run_inputs: Vec<DataTree>,
    last_duration: Option<Duration>,
    last_warnings: Vec<String>,
    results: Vec<Option<DataTree>>,
}

impl ProxyInstance {
    pub fn new(id: NodeId, pool: WorkerPool, host: Sender<HostEvent>) -> Self {
        Self {
            id,
            target: TargetRef::new(),
            mirror: ParameterMirror::new(),
            dispatcher: WorkerDispatcher::new(id, pool, host),
            auto_requeue: false,
            run_target: None,
            run_inputs: Vec::new(),
            last_duration: None,
            last_warnings: Vec::new(),
            results: Vec::new(),
        }
    }

    /// Rebuilds a proxy from saved state, resolving the target by its id and
    /// mirroring its signature again.
    pub fn restore(
        id: NodeId,
        pool: WorkerPool,
        host: Sender<HostEvent>,
        state: &ProxyState,
        doc: &mut dyn Document,
        catalog: &dyn Catalog,
    ) -> Self {
        let mut proxy = Self::new(id, pool, host);
        proxy.auto_requeue = state.auto_requeue;
        proxy.target = TargetRef::with_persisted(state.target_id);
        if state.target_id.is_some() {
            match proxy.target.resolve(state.target_id, &*doc, catalog) {
                Ok(resolution) => {
                    proxy.mirror.fill_from(id, &resolution.target.info, doc);
                }
                Err(err) => warn!("Proxy {} could not resolve its saved target: {}", id, err),
            }
        }
        proxy
    }

    pub fn read(
        id: NodeId,
        pool: WorkerPool,
        host: Sender<HostEvent>,
        json: &str,
        doc: &mut dyn Document,
        catalog: &dyn Catalog,
    ) -> Result<Self, GhostError> {
        let state = ProxyState::from_json(json)?;
        Ok(Self::restore(id, pool, host, &state, doc, catalog))
    }

    pub fn persisted_state(&self) -> ProxyState {
        ProxyState {
            target_id: self.target.persisted_id(),
            auto_requeue: self.auto_requeue,
        }
    }

    pub fn write(&self) -> Result<String, GhostError> {
        self.persisted_state().to_json()
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn state(&self) -> RunState {
        self.dispatcher.state()
    }

    pub fn auto_requeue(&self) -> bool {
        self.auto_requeue
    }

    pub fn set_auto_requeue(&mut self, enabled: bool) {
        self.auto_requeue = enabled;
    }

    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    pub fn mirror(&self) -> &ParameterMirror {
        &self.mirror
    }

    pub fn last_duration(&self) -> Option<Duration> {
        self.last_duration
    }

    pub fn last_warnings(&self) -> &[String] {
        &self.last_warnings
    }

    pub fn results(&self) -> &[Option<DataTree>] {
        &self.results
    }

    pub fn request_interrupt(&self) -> bool {
        self.dispatcher.request_interrupt()
    }

    pub fn can_insert_slot(&self, side: Side, index: usize) -> bool {
        let target = self.target.cached().map(|t| &t.info);
        self.mirror.can_insert(side, index, target)
    }

    pub fn can_remove_slot(&self, side: Side, index: usize) -> bool {
        self.mirror.can_remove(side, index)
    }

    pub fn insert_slot(&mut self, side: Side, index: usize, doc: &mut dyn Document) -> bool {
        let target = self.target.cached().map(|t| &t.info);
        self.mirror.insert_slot(self.id, side, index, target, doc)
    }

    pub fn remove_slot(&mut self, side: Side, index: usize, doc: &mut dyn Document) -> bool {
        self.mirror.remove_slot(self.id, side, index, doc).is_some()
    }

    /// Brings the mirror back in line with the cached target after the
    /// target's own signature changed: drops surplus tail slots, then adds
    /// missing ones. Returns how many slots were added or removed.
    pub fn match_target_arity(&mut self, doc: &mut dyn Document) -> usize {
        let Some(target) = self.target.cached() else {
            return 0;
        };
        let mut changed = 0;
        for side in [Side::Input, Side::Output] {
            let required = ParameterMirror::required_count(&target.info, side);
            while self.mirror.count(side) > required {
                let tail = self.mirror.count(side) - 1;
                if self.mirror.remove_slot(self.id, side, tail, doc).is_none() {
                    break;
                }
                changed += 1;
            }
        }
        changed + self.mirror.fill_from(self.id, &target.info, doc)
    }

    /// The node left the graph. A run still in flight finishes on its worker
    /// but no longer hands back.
    pub fn on_removed(&mut self) {
        info!("Proxy {} removed while {:?}", self.id, self.state());
        self.dispatcher.detach();
    }

    /// One solve of the proxy on the host thread.
    pub fn solve(&mut self, input: &SolveInput, ctx: &mut SolveContext<'_>) -> SolveOutput {
        let _timer = ScopedTimer::debug_lazy(|| format!("Proxy {} solve", self.id));
        let mut out = SolveOutput::default();

        let target = match self.resolve_target(input.link, ctx) {
            Ok(target) => target,
            Err(err) => {
                out.diagnostics.push((&err).into());
                return out;
            }
        };
        out.message.push(target.name().to_string());

        if let Some(err) = self.arity_error(&target) {
            out.message.push("awaiting parameters".to_string());
            out.diagnostics.push((&err).into());
            return out;
        }

        match self.dispatcher.state() {
            RunState::Complete => self.consume(&target, input, &mut out),
            RunState::Idle => self.dispatch(&target, input, &mut out),
            RunState::Dispatched | RunState::Running => {
                out.message.push("running".to_string());
                let same_run = self.run_target == Some(target.id())
                    && self.run_inputs == Self::target_inputs(&target, input);
                if !same_run {
                    self.dispatcher.request_interrupt();
                    out.diagnostics.push(RuntimeMessage::remark(
                        "Still running; inputs changed since this run was dispatched",
                    ));
                }
            }
        }

        if self.last_duration.is_none() {
            out.diagnostics.push(RuntimeMessage::remark(
                "No result yet; outputs fill in once the first run completes",
            ));
        }
        out.results = self.results.clone();
        out
    }

    fn resolve_target(
        &mut self,
        link: Option<NodeId>,
        ctx: &mut SolveContext<'_>,
    ) -> Result<ResolvedTarget, ConfigurationError> {
        let resolution = self.target.resolve(link, &*ctx.doc, ctx.catalog)?;
        if resolution.changed {
            if self.mirror.has_mirrored_slots() {
                let links = self.mirror.teardown(self.id, &mut *ctx.doc);
                schedule_unwire(links, ctx.scheduler);
            }
            self.results.clear();
            self.last_duration = None;
            self.last_warnings.clear();
            self.mirror
                .fill_from(self.id, &resolution.target.info, &mut *ctx.doc);
        }
        Ok(resolution.target)
    }

    fn arity_error(&self, target: &ResolvedTarget) -> Option<ConfigurationError> {
        if self.mirror.matches(&target.info) {
            return None;
        }
        Some(ConfigurationError::AwaitingParameters {
            target: target.name().to_string(),
            expected_inputs: target.info.inputs.len(),
            expected_outputs: target.info.outputs.len(),
            actual_inputs: self.mirror.mirrored_count(Side::Input),
            actual_outputs: self.mirror.mirrored_count(Side::Output),
        })
    }

    /// Input trees padded or truncated to the target's input count.
    fn target_inputs(target: &ResolvedTarget, input: &SolveInput) -> Vec<DataTree> {
        let arity = target.info.inputs.len();
        let mut inputs: Vec<DataTree> = input.trees.iter().take(arity).cloned().collect();
        inputs.resize_with(arity, DataTree::new);
        inputs
    }

    fn dispatch(&mut self, target: &ResolvedTarget, input: &SolveInput, out: &mut SolveOutput) {
        let inputs = Self::target_inputs(target, input);
        let request = DispatchRequest {
            target_id: target.id(),
            evaluator: Arc::clone(&target.evaluator),
            inputs: inputs.clone(),
            tree_mode: true,
        };
        match self.dispatcher.request_dispatch(request) {
            Ok(()) => {
                self.run_target = Some(target.id());
                self.run_inputs = inputs;
                out.message.push("dispatched".to_string());
            }
            Err(err) => out.diagnostics.push((&err).into()),
        }
    }

    fn consume(&mut self, target: &ResolvedTarget, input: &SolveInput, out: &mut SolveOutput) {
        let Some(consumed) = self.dispatcher.consume() else {
            return;
        };

        if self.run_target != Some(target.id()) {
            info!(
                "Proxy {} discarded a result computed for a previous target",
                self.id
            );
            out.diagnostics.push(RuntimeMessage::remark(
                "Discarded a result computed for the previous target",
            ));
            self.dispatch(target, input, out);
            return;
        }

        let outcome = consumed.outcome;
        out.message.push(outcome.elapsed_line());
        out.diagnostics.extend(outcome.diagnostics());
        self.last_duration = Some(outcome.duration);
        self.last_warnings = outcome.warnings;
        self.results = outcome.results;
        self.results.resize(target.info.outputs.len(), None);

        if !consumed.interrupted {
            return;
        }
        if self.auto_requeue {
            info!("Proxy {} requeued with the latest inputs", self.id);
            out.message.push("inputs changed during run: requeued".to_string());
            self.dispatch(target, input, out);
        } else {
            out.diagnostics.push(RuntimeMessage::warning(
                "Inputs changed while running; results may be stale. Enable auto requeue or recompute",
            ));
        }
    }
}
