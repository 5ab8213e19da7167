//! Node reporting how many background runs are in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, warn};

use crate::diagnostics::RuntimeMessage;
use crate::host::{Document, NodeId, NodeInfo, Scheduler};
use crate::model::{ParamKind, ParamSpec};
use crate::worker::WorkerRegistry;

pub const MONITOR_NAME: &str = "GhostBuster";
pub const MONITOR_NICKNAME: &str = "GhB";
pub const DEFAULT_INTERVAL_MS: i64 = 1000;

/// Declared signature of the monitor: refresh toggle and interval in, count out.
pub fn monitor_node_info() -> NodeInfo {
    NodeInfo::special(MONITOR_NAME)
        .with_inputs(vec![
            ParamSpec::new("Automatic Refresh", "R", ParamKind::Boolean)
                .with_description("check the worker count periodically"),
            ParamSpec::new("Intervals", "P", ParamKind::Integer)
                .with_description("refresh period in milliseconds"),
        ])
        .with_outputs(vec![
            ParamSpec::new("Worker Count", "N", ParamKind::Integer)
                .with_description("background runs currently in flight"),
        ])
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitorInput {
    /// "Automatic Refresh": re-check periodically.
    pub auto_refresh: bool,
    /// "Intervals": period between checks, in milliseconds.
    pub interval_ms: i64,
}

impl Default for MonitorInput {
    fn default() -> Self {
        Self {
            auto_refresh: false,
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MonitorOutput {
    /// "Worker Count". Absent when the inputs were rejected.
    pub worker_count: Option<usize>,
    /// A re-check was scheduled by this solve.
    pub armed: bool,
    pub diagnostics: Vec<RuntimeMessage>,
}

pub struct MonitorNode {
    id: NodeId,
    registry: WorkerRegistry,
    /// A re-check is scheduled and has not fired yet.
    pending: Arc<AtomicBool>,
}

impl MonitorNode {
    pub fn new(id: NodeId, registry: WorkerRegistry) -> Self {
        Self {
            id,
            registry,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Samples the registry. With auto refresh on, arms one delayed callback
    /// that expires only this node; the solve it triggers arms the next one.
    /// Solves in between leave the pending callback alone, so there is never
    /// more than one loop. The loop ends once auto refresh is off or the node
    /// is gone, since an expired id the document no longer knows is ignored.
    pub fn solve(&self, input: MonitorInput, scheduler: &dyn Scheduler) -> MonitorOutput {
        if input.interval_ms <= 0 {
            warn!(
                "Monitor {} got interval {} ms; not refreshing",
                self.id, input.interval_ms
            );
            return MonitorOutput {
                worker_count: None,
                armed: false,
                diagnostics: vec![RuntimeMessage::warning("time interval not realistic")],
            };
        }

        let mut armed = false;
        if input.auto_refresh && !self.pending.swap(true, Ordering::AcqRel) {
            let id = self.id;
            let pending = Arc::clone(&self.pending);
            scheduler.schedule_after(
                Duration::from_millis(input.interval_ms as u64),
                Box::new(move |doc: &mut dyn Document| {
                    pending.store(false, Ordering::Release);
                    doc.expire(id);
                }),
            );
            armed = true;
            debug!("Monitor {} re-check in {} ms", self.id, input.interval_ms);
        }

        MonitorOutput {
            worker_count: Some(self.registry.count()),
            armed,
            diagnostics: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::sim::{ManualScheduler, SimDocument};

    fn setup() -> (SimDocument, ManualScheduler, MonitorNode, WorkerRegistry) {
        let mut doc = SimDocument::new();
        let id = doc.add_node(monitor_node_info());
        let registry = WorkerRegistry::new();
        let monitor = MonitorNode::new(id, registry.clone());
        (doc, ManualScheduler::new(), monitor, registry)
    }

    #[test]
    fn test_signature() {
        let info = monitor_node_info();
        assert_eq!(info.display_name, "GhostBuster");
        let nicknames: Vec<&str> = info.inputs.iter().map(|p| p.nickname.as_str()).collect();
        assert_eq!(nicknames, ["R", "P"]);
        assert_eq!(info.outputs[0].name, "Worker Count");
    }

    #[test]
    fn test_non_positive_interval_warns_and_does_not_arm() {
        let (_doc, scheduler, monitor, _) = setup();
        for interval_ms in [0, -5] {
            let out = monitor.solve(
                MonitorInput {
                    auto_refresh: true,
                    interval_ms,
                },
                &scheduler,
            );
            assert_eq!(out.worker_count, None);
            assert!(!out.armed);
            assert_eq!(out.diagnostics.len(), 1);
        }
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_auto_refresh_arms_one_check_per_tick() {
        let (mut doc, scheduler, monitor, registry) = setup();
        registry.enter();
        let input = MonitorInput {
            auto_refresh: true,
            interval_ms: 1000,
        };

        let out = monitor.solve(input, &scheduler);
        assert_eq!(out.worker_count, Some(1));
        assert!(out.armed);
        assert_eq!(scheduler.pending_count(), 1);

        for _ in 0..3 {
            assert_eq!(scheduler.advance(Duration::from_millis(999), &mut doc), 0);
            assert_eq!(scheduler.advance(Duration::from_millis(1), &mut doc), 1);
            assert_eq!(doc.take_expired(), vec![monitor.id()]);
            monitor.solve(input, &scheduler);
            assert_eq!(scheduler.pending_count(), 1);
        }
    }

    #[test]
    fn test_solve_mid_interval_keeps_a_single_loop() {
        let (mut doc, scheduler, monitor, _) = setup();
        let input = MonitorInput {
            auto_refresh: true,
            interval_ms: 1000,
        };

        assert!(monitor.solve(input, &scheduler).armed);
        scheduler.advance(Duration::from_millis(500), &mut doc);
        // An input edit re-solves the monitor before the check is due.
        assert!(!monitor.solve(input, &scheduler).armed);
        assert_eq!(scheduler.pending_count(), 1);

        let mut solves_per_tick = Vec::new();
        for _ in 0..4 {
            let mut solves = 0;
            for _ in 0..2 {
                scheduler.advance(Duration::from_millis(500), &mut doc);
                for _ in doc.take_expired() {
                    monitor.solve(input, &scheduler);
                    solves += 1;
                }
            }
            solves_per_tick.push(solves);
            assert_eq!(scheduler.pending_count(), 1);
        }
        assert_eq!(solves_per_tick, vec![1, 1, 1, 1]);
    }

    #[test]
    fn test_loop_stops_when_refresh_disabled_or_node_removed() {
        let (mut doc, scheduler, monitor, _) = setup();
        let out = monitor.solve(MonitorInput::default(), &scheduler);
        assert_eq!(out.worker_count, Some(0));
        assert!(!out.armed);
        assert_eq!(scheduler.pending_count(), 0);

        monitor.solve(
            MonitorInput {
                auto_refresh: true,
                interval_ms: 10,
            },
            &scheduler,
        );
        doc.remove_node(monitor.id());
        scheduler.advance(Duration::from_millis(10), &mut doc);
        assert!(doc.take_expired().is_empty());
    }
}
