//! A host loop without UI: one proxy wrapping a slow component, one monitor,
//! and input changes fed on a fixed cadence.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::bail;
use ghost_worker::host::sim::{FnTarget, ManualScheduler, MapCatalog, SimDocument};
use ghost_worker::host::{Document, Evaluation, EvaluationTarget, HostEvent, NodeId, NodeInfo};
use ghost_worker::model::{DataTree, ParamKind, ParamSpec};
use ghost_worker::monitor::{monitor_node_info, MONITOR_NICKNAME};
use ghost_worker::proxy::{PROXY_NAME, PROXY_NICKNAME};
use ghost_worker::{
    MessageLevel, MonitorInput, MonitorNode, ProxyInstance, RunState, RuntimeMessage,
    SolveContext, SolveInput, WorkerPool, WorkerRegistry,
};
use log::{debug, error, info, warn};

use crate::config::HostConfig;

const TICK: Duration = Duration::from_millis(50);

pub struct HeadlessHost {
    config: HostConfig,
    doc: SimDocument,
    catalog: MapCatalog,
    scheduler: ManualScheduler,
    registry: WorkerRegistry,
    events: Receiver<HostEvent>,
    proxy: ProxyInstance,
    monitor: MonitorNode,
    target: NodeId,
    inputs: Vec<DataTree>,
    fed: usize,
    next_feed: Duration,
    clock: Instant,
    last_tick: Duration,
}

impl HeadlessHost {
    pub fn new(config: HostConfig) -> anyhow::Result<Self> {
        let registry = WorkerRegistry::new();
        let pool = WorkerPool::new(&config.worker, registry.clone())?;
        let (tx, events) = mpsc::channel();

        let mut doc = SimDocument::new();
        let mut catalog = MapCatalog::new();
        catalog.register(slow_sum(Duration::from_millis(config.work_ms)));
        let target = doc.add_node(
            NodeInfo::component("Slow Sum")
                .with_inputs(vec![
                    ParamSpec::new("A", "A", ParamKind::Number),
                    ParamSpec::new("B", "B", ParamKind::Number),
                ])
                .with_outputs(vec![ParamSpec::new("Sum", "S", ParamKind::Number)]),
        );

        let proxy_id = doc.add_node(NodeInfo::special(PROXY_NAME));
        let mut proxy = ProxyInstance::new(proxy_id, pool, tx);
        proxy.set_auto_requeue(config.auto_requeue);

        let monitor_id = doc.add_node(monitor_node_info());
        let monitor = MonitorNode::new(monitor_id, registry.clone());

        doc.expire(proxy_id);
        doc.expire(monitor_id);

        Ok(Self {
            config,
            doc,
            catalog,
            scheduler: ManualScheduler::new(),
            registry,
            events,
            proxy,
            monitor,
            target,
            inputs: feed(0),
            fed: 0,
            next_feed: Duration::ZERO,
            clock: Instant::now(),
            last_tick: Duration::ZERO,
        })
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        let feed_every = Duration::from_millis(self.config.work_ms * 3 / 4);
        loop {
            let now = self.clock.elapsed();
            if self.fed < self.config.passes && now >= self.next_feed {
                self.fed += 1;
                self.inputs = feed(self.fed);
                self.doc.expire(self.proxy.id());
                self.next_feed = now + feed_every;
            }

            self.solve_expired();
            if self.is_finished() {
                break;
            }

            match self.events.recv_timeout(TICK) {
                Ok(HostEvent::Refresh(id)) => self.doc.expire(id),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => bail!("worker event channel closed"),
            }

            let now = self.clock.elapsed();
            self.scheduler.advance(now - self.last_tick, &mut self.doc);
            self.last_tick = now;
        }

        info!("Saved {} state: {}", PROXY_NICKNAME, self.proxy.write()?);
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.fed >= self.config.passes
            && self.registry.count() == 0
            && self.proxy.state() == RunState::Idle
            && !self.doc.is_expired(self.proxy.id())
    }

    fn solve_expired(&mut self) {
        for id in self.doc.take_expired() {
            if id == self.proxy.id() {
                self.solve_proxy();
            } else if id == self.monitor.id() {
                self.solve_monitor();
            }
        }
    }

    fn solve_proxy(&mut self) {
        let input = SolveInput {
            link: Some(self.target),
            trees: self.inputs.clone(),
        };
        let mut ctx = SolveContext {
            doc: &mut self.doc,
            catalog: &self.catalog,
            scheduler: &self.scheduler,
        };
        let out = self.proxy.solve(&input, &mut ctx);

        info!("{}: {}", PROXY_NICKNAME, out.message.join(" | "));
        for (index, tree) in out.results.iter().enumerate() {
            if let Some(tree) = tree {
                debug!("{} output {}: {:?}", PROXY_NICKNAME, index + 1, tree);
            }
        }
        out.diagnostics.iter().for_each(report);
    }

    fn solve_monitor(&mut self) {
        let input = MonitorInput {
            auto_refresh: self.config.auto_refresh,
            interval_ms: self.config.monitor_interval_ms,
        };
        let out = self.monitor.solve(input, &self.scheduler);
        if let Some(count) = out.worker_count {
            info!("{}: {} worker(s) running", MONITOR_NICKNAME, count);
        }
        out.diagnostics.iter().for_each(report);
    }
}

fn report(message: &RuntimeMessage) {
    match message.level {
        MessageLevel::Remark => debug!("{}", message.text),
        MessageLevel::Warning => warn!("{}", message.text),
        MessageLevel::Error => error!("{}", message.text),
    }
}

fn feed(step: usize) -> Vec<DataTree> {
    let a = step as f64;
    vec![DataTree::from_item(a), DataTree::from_item(a * 10.0)]
}

fn slow_sum(work: Duration) -> Arc<dyn EvaluationTarget> {
    Arc::new(FnTarget::new("Slow Sum", move |inputs: &[DataTree], _| {
        thread::sleep(work);
        let sum: f64 = inputs
            .iter()
            .flat_map(|tree| tree.items())
            .filter_map(|goo| goo.as_number())
            .sum();
        Ok(Evaluation {
            outputs: vec![Some(DataTree::from_item(sum))],
            warnings: Vec::new(),
        })
    }))
}
