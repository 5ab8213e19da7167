//! Single-flight background execution of a wrapped evaluation.
//!
//! State machine per proxy:
//!
//! ```text
//! Idle --dispatch--> Dispatched --start--> Running --finish--> Complete --consume--> Idle
//! ```
//!
//! `Dispatched` and `Running` are both "in flight": the registry counts them
//! and a second dispatch is rejected. The state, the interrupt flag and the
//! result buffer sit behind one lock shared with the worker.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::buffer::{ResultBuffer, RunOutcome};
use super::registry::WorkerRegistry;
use crate::config::WorkerConfig;
use crate::error::GhostError;
use crate::host::{EvaluationTarget, HostEvent, NodeId};
use crate::model::DataTree;
use crate::util::timing::measure_elapsed;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RunState {
    #[default]
    Idle,
    /// Handed to the pool, waiting for a worker thread.
    Dispatched,
    Running,
    /// Finished; the buffer holds an unconsumed outcome.
    Complete,
}

impl RunState {
    pub fn is_in_flight(self) -> bool {
        matches!(self, RunState::Dispatched | RunState::Running)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One lock per target node, so two proxies wrapping the same target never
/// call into it concurrently.
#[derive(Clone, Default)]
pub struct TargetLocks {
    locks: Arc<Mutex<HashMap<NodeId, Arc<Mutex<()>>>>>,
}

impl TargetLocks {
    pub fn lock_for(&self, target: NodeId) -> Arc<Mutex<()>> {
        let mut locks = lock(&self.locks);
        Arc::clone(locks.entry(target).or_default())
    }

    /// Forgets the lock of `target` once no run holds a handle to it.
    pub fn release(&self, target: NodeId) {
        let mut locks = lock(&self.locks);
        if locks.get(&target).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&target);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-wide execution context: the thread pool, the run counter and the
/// per-target locks. Cheap to clone; every proxy gets one.
#[derive(Clone)]
pub struct WorkerPool {
    pool: Arc<ThreadPool>,
    registry: WorkerRegistry,
    locks: TargetLocks,
}

impl WorkerPool {
    pub fn new(config: &WorkerConfig, registry: WorkerRegistry) -> Result<Self, GhostError> {
        let prefix = config.thread_name.clone();
        let threads = config.thread_count();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |i| format!("{}-{}", prefix, i))
            .build()?;
        info!("WorkerPool started with {} thread(s)", threads);
        Ok(Self {
            pool: Arc::new(pool),
            registry,
            locks: TargetLocks::default(),
        })
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }
}

/// A run to start: which target, and the trees for each of its inputs.
pub struct DispatchRequest {
    pub target_id: NodeId,
    pub evaluator: Arc<dyn EvaluationTarget>,
    pub inputs: Vec<DataTree>,
    pub tree_mode: bool,
}

/// A completed run taken out of the buffer.
#[derive(Debug)]
pub struct Consumed {
    pub outcome: RunOutcome,
    /// An interrupt was requested while the run was in flight.
    pub interrupted: bool,
}

#[derive(Default)]
struct DispatchCell {
    state: RunState,
    interrupt_requested: bool,
    buffer: ResultBuffer,
    detached: bool,
}

pub struct WorkerDispatcher {
    node: NodeId,
    cell: Arc<Mutex<DispatchCell>>,
    pool: WorkerPool,
    host: Sender<HostEvent>,
}

impl WorkerDispatcher {
    pub fn new(node: NodeId, pool: WorkerPool, host: Sender<HostEvent>) -> Self {
        Self {
            node,
            cell: Arc::new(Mutex::new(DispatchCell::default())),
            pool,
            host,
        }
    }

    pub fn state(&self) -> RunState {
        lock(&self.cell).state
    }

    pub fn interrupt_requested(&self) -> bool {
        lock(&self.cell).interrupt_requested
    }

    pub fn has_unconsumed(&self) -> bool {
        lock(&self.cell).buffer.has_unconsumed()
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.pool.registry
    }

    /// Flags the in-flight run. Never aborts it; only decides what happens
    /// once it completes. Returns false when nothing is in flight.
    pub fn request_interrupt(&self) -> bool {
        let mut cell = lock(&self.cell);
        if cell.state.is_in_flight() {
            cell.interrupt_requested = true;
            true
        } else {
            false
        }
    }

    /// Starts a background run and returns immediately.
    ///
    /// Only valid from `Idle`. Anything else is rejected, never queued: an
    /// in-flight run keeps going untouched and a completed one waits to be
    /// consumed.
    pub fn request_dispatch(&self, request: DispatchRequest) -> Result<(), GhostError> {
        {
            let mut cell = lock(&self.cell);
            if cell.state != RunState::Idle {
                error!(
                    "Proxy {} rejected a dispatch while {:?}",
                    self.node, cell.state
                );
                return Err(GhostError::DispatchRejected(cell.state));
            }
            cell.state = RunState::Dispatched;
            cell.interrupt_requested = false;
            let in_flight = self.pool.registry.enter();
            debug!(
                "Proxy {} dispatched '{}' ({} run(s) in flight)",
                self.node,
                request.evaluator.name(),
                in_flight
            );
        }

        let job = Job {
            node: self.node,
            cell: Arc::clone(&self.cell),
            registry: self.pool.registry.clone(),
            locks: self.pool.locks.clone(),
            target_lock: self.pool.locks.lock_for(request.target_id),
            host: self.host.clone(),
            request,
        };
        self.pool.pool.spawn(move || job.run());
        Ok(())
    }

    /// Takes a completed run out of the buffer and returns to `Idle`.
    pub fn consume(&self) -> Option<Consumed> {
        let mut cell = lock(&self.cell);
        if cell.state != RunState::Complete {
            return None;
        }
        cell.state = RunState::Idle;
        let interrupted = std::mem::take(&mut cell.interrupt_requested);
        let outcome = cell.buffer.take()?;
        Some(Consumed {
            outcome,
            interrupted,
        })
    }

    /// Stops refresh hand-offs for this node. A run still in flight finishes
    /// on its worker and keeps its registry bookkeeping.
    pub fn detach(&self) {
        lock(&self.cell).detached = true;
    }
}

impl Drop for WorkerDispatcher {
    fn drop(&mut self) {
        self.detach();
    }
}

struct Job {
    node: NodeId,
    cell: Arc<Mutex<DispatchCell>>,
    registry: WorkerRegistry,
    locks: TargetLocks,
    target_lock: Arc<Mutex<()>>,
    host: Sender<HostEvent>,
    request: DispatchRequest,
}

impl Job {
    fn run(self) {
        lock(&self.cell).state = RunState::Running;

        let name = self.request.evaluator.name().to_string();
        let (result, duration) = {
            let _guard = lock(&self.target_lock);
            measure_elapsed(
                || format!("Proxy {}: evaluate '{}'", self.node, name),
                || {
                    panic::catch_unwind(AssertUnwindSafe(|| {
                        self.request
                            .evaluator
                            .evaluate(&self.request.inputs, self.request.tree_mode)
                    }))
                },
            )
        };
        drop(self.target_lock);
        self.locks.release(self.request.target_id);

        let outcome = match result {
            Ok(Ok(evaluation)) => RunOutcome {
                duration,
                warnings: evaluation.warnings,
                errors: Vec::new(),
                results: evaluation.outputs,
            },
            Ok(Err(message)) => {
                warn!("'{}' failed on proxy {}: {}", name, self.node, message);
                RunOutcome {
                    duration,
                    errors: vec![GhostError::Evaluation(message).to_string()],
                    ..RunOutcome::default()
                }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("'{}' panicked on proxy {}: {}", name, self.node, message);
                RunOutcome {
                    duration,
                    errors: vec![
                        GhostError::Evaluation(format!("panicked: {}", message)).to_string(),
                    ],
                    ..RunOutcome::default()
                }
            }
        };

        let detached = {
            let mut cell = lock(&self.cell);
            cell.buffer.store(outcome);
            cell.state = RunState::Complete;
            self.registry.leave();
            cell.detached
        };
        debug!(
            "Proxy {} completed '{}' in {:?}",
            self.node, name, duration
        );

        if detached {
            debug!("Proxy {} was removed; dropping refresh", self.node);
            return;
        }
        if self.host.send(HostEvent::Refresh(self.node)).is_err() {
            warn!(
                "Host event loop closed before proxy {} could refresh",
                self.node
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Evaluation;
    use crate::host::sim::FnTarget;
    use std::sync::mpsc::{self, Receiver};
    use std::time::Duration;
    use uuid::Uuid;

    fn make_pool() -> WorkerPool {
        WorkerPool::new(&WorkerConfig::with_threads(2), WorkerRegistry::new()).unwrap()
    }

    fn request(evaluator: Arc<dyn EvaluationTarget>) -> DispatchRequest {
        DispatchRequest {
            target_id: Uuid::new_v4(),
            evaluator,
            inputs: vec![DataTree::from_item(2.0)],
            tree_mode: true,
        }
    }

    fn wait_refresh(rx: &Receiver<HostEvent>) -> HostEvent {
        rx.recv_timeout(Duration::from_secs(5))
            .expect("worker never handed back")
    }

    #[test]
    fn test_dispatch_then_consume_returns_to_idle() {
        let (tx, rx) = mpsc::channel();
        let node = Uuid::new_v4();
        let dispatcher = WorkerDispatcher::new(node, make_pool(), tx);
        let target = Arc::new(FnTarget::new("Double", |inputs: &[DataTree], tree_mode| {
            assert!(tree_mode);
            let x = inputs[0].items().next().and_then(|g| g.as_number()).unwrap();
            Ok(Evaluation {
                outputs: vec![Some(DataTree::from_item(x * 2.0))],
                warnings: vec!["checked".to_string()],
            })
        }));

        dispatcher.request_dispatch(request(target)).unwrap();
        assert_eq!(wait_refresh(&rx), HostEvent::Refresh(node));
        assert_eq!(dispatcher.state(), RunState::Complete);
        assert_eq!(dispatcher.registry().count(), 0);

        let consumed = dispatcher.consume().unwrap();
        assert!(!consumed.interrupted);
        assert_eq!(consumed.outcome.warnings, vec!["checked".to_string()]);
        assert_eq!(
            consumed.outcome.results,
            vec![Some(DataTree::from_item(4.0))]
        );
        assert_eq!(dispatcher.state(), RunState::Idle);
        assert!(dispatcher.consume().is_none());
    }

    #[test]
    fn test_unconsumed_result_blocks_new_dispatch() {
        let (tx, rx) = mpsc::channel();
        let dispatcher = WorkerDispatcher::new(Uuid::new_v4(), make_pool(), tx);
        let target: Arc<dyn EvaluationTarget> = Arc::new(FnTarget::new("Noop", |_: &[DataTree], _| {
            Ok(Evaluation::default())
        }));

        dispatcher.request_dispatch(request(Arc::clone(&target))).unwrap();
        wait_refresh(&rx);
        let err = dispatcher.request_dispatch(request(target)).unwrap_err();
        assert!(matches!(err, GhostError::DispatchRejected(RunState::Complete)));
        assert!(dispatcher.has_unconsumed());
        assert_eq!(dispatcher.registry().count(), 0);
    }

    #[test]
    fn test_failures_and_panics_still_complete() {
        let (tx, rx) = mpsc::channel();
        let dispatcher = WorkerDispatcher::new(Uuid::new_v4(), make_pool(), tx);

        let failing: Arc<dyn EvaluationTarget> = Arc::new(FnTarget::new("Fail", |_: &[DataTree], _| {
            Err("bad input".to_string())
        }));
        dispatcher.request_dispatch(request(failing)).unwrap();
        wait_refresh(&rx);
        let consumed = dispatcher.consume().unwrap();
        assert_eq!(
            consumed.outcome.errors,
            vec!["Evaluation error: bad input".to_string()]
        );

        let panicking: Arc<dyn EvaluationTarget> =
            Arc::new(FnTarget::new("Panic", |_: &[DataTree], _| -> Result<Evaluation, String> {
                panic!("boom")
            }));
        dispatcher.request_dispatch(request(panicking)).unwrap();
        wait_refresh(&rx);
        let consumed = dispatcher.consume().unwrap();
        assert!(consumed.outcome.errors[0].contains("boom"));
        assert_eq!(dispatcher.registry().count(), 0);
    }

    #[test]
    fn test_interrupt_only_applies_in_flight() {
        let (tx, _rx) = mpsc::channel();
        let dispatcher = WorkerDispatcher::new(Uuid::new_v4(), make_pool(), tx);
        assert!(!dispatcher.request_interrupt());
        assert!(!dispatcher.interrupt_requested());
    }

    #[test]
    fn test_detached_dispatcher_skips_refresh() {
        let (tx, rx) = mpsc::channel();
        let pool = make_pool();
        let registry = pool.registry().clone();
        let dispatcher = WorkerDispatcher::new(Uuid::new_v4(), pool, tx);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let target: Arc<dyn EvaluationTarget> = Arc::new(FnTarget::new("Gate", move |_: &[DataTree], _| {
            let _ = release_rx.lock().unwrap().recv();
            Ok(Evaluation::default())
        }));

        dispatcher.request_dispatch(request(target)).unwrap();
        assert_eq!(registry.count(), 1);
        drop(dispatcher);
        release_tx.send(()).unwrap();

        assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_target_locks_are_shared_per_target() {
        let locks = TargetLocks::default();
        let id = Uuid::new_v4();
        assert!(Arc::ptr_eq(&locks.lock_for(id), &locks.lock_for(id)));
        assert!(!Arc::ptr_eq(&locks.lock_for(id), &locks.lock_for(Uuid::new_v4())));
    }

    #[test]
    fn test_target_lock_released_only_when_unused() {
        let locks = TargetLocks::default();
        let id = Uuid::new_v4();
        let held = locks.lock_for(id);
        locks.release(id);
        assert_eq!(locks.len(), 1);
        drop(held);
        locks.release(id);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_finished_runs_do_not_leave_locks_behind() {
        let (tx, rx) = mpsc::channel();
        let dispatcher = WorkerDispatcher::new(Uuid::new_v4(), make_pool(), tx);
        let target: Arc<dyn EvaluationTarget> = Arc::new(FnTarget::new("Noop", |_: &[DataTree], _| {
            Ok(Evaluation::default())
        }));
        for _ in 0..3 {
            dispatcher.request_dispatch(request(Arc::clone(&target))).unwrap();
            wait_refresh(&rx);
            dispatcher.consume().unwrap();
        }
        assert!(dispatcher.pool.locks.is_empty());
    }
}
