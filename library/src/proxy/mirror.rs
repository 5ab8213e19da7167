//! The proxy's declared parameters, kept in step with its target.
//!
//! Slot 0 on each side belongs to the proxy itself (the target link and the
//! message output). Slots `1..=n` mirror the target's parameters `0..n`.

use std::time::Duration;

use log::{debug, info};

use crate::host::{Document, NodeId, NodeInfo, ParamRef, Scheduler};
use crate::model::{Access, ParamFactory, ParamKind, ParamSpec, Side};

/// Delay before recorded downstream links are severed. Zero still defers the
/// work to the scheduler's next run, after the current solve pass.
pub const UNWIRE_DELAY: Duration = Duration::ZERO;

/// Input slot 0: the link to the wrapped node.
pub fn link_param() -> ParamSpec {
    ParamSpec::new("Component", "C", ParamKind::Generic)
        .with_description("link up to the single component that needs to run in parallel")
        .with_access(Access::Tree)
        .optional()
}

/// Output slot 0: status and timing lines.
pub fn message_param() -> ParamSpec {
    ParamSpec::new("Message", "T", ParamKind::Text)
        .with_description("usefully information")
        .with_access(Access::Tree)
}

/// Downstream links recorded during teardown, severed in the deferred phase.
pub type RecordedLinks = Vec<(ParamRef, ParamRef)>;

pub struct ParameterMirror {
    inputs: Vec<ParamSpec>,
    outputs: Vec<ParamSpec>,
}

impl Default for ParameterMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterMirror {
    pub fn new() -> Self {
        Self {
            inputs: vec![link_param()],
            outputs: vec![message_param()],
        }
    }

    pub fn params(&self, side: Side) -> &[ParamSpec] {
        match side {
            Side::Input => &self.inputs,
            Side::Output => &self.outputs,
        }
    }

    fn params_mut(&mut self, side: Side) -> &mut Vec<ParamSpec> {
        match side {
            Side::Input => &mut self.inputs,
            Side::Output => &mut self.outputs,
        }
    }

    pub fn count(&self, side: Side) -> usize {
        self.params(side).len()
    }

    /// Number of slots beyond the reserved slot 0.
    pub fn mirrored_count(&self, side: Side) -> usize {
        self.count(side).saturating_sub(1)
    }

    pub fn has_mirrored_slots(&self) -> bool {
        self.mirrored_count(Side::Input) > 0 || self.mirrored_count(Side::Output) > 0
    }

    /// Slot count `side` must reach to match `target`.
    pub fn required_count(target: &NodeInfo, side: Side) -> usize {
        target.params(side).len() + 1
    }

    pub fn matches(&self, target: &NodeInfo) -> bool {
        self.count(Side::Input) == Self::required_count(target, Side::Input)
            && self.count(Side::Output) == Self::required_count(target, Side::Output)
    }

    /// Only appending at the tail, and only while short of the target.
    pub fn can_insert(&self, side: Side, index: usize, target: Option<&NodeInfo>) -> bool {
        let Some(target) = target else {
            return false;
        };
        let count = self.count(side);
        index == count && count < Self::required_count(target, side)
    }

    /// Only the tail slot, and never the last remaining one.
    pub fn can_remove(&self, side: Side, index: usize) -> bool {
        let count = self.count(side);
        count > 1 && index == count - 1
    }

    /// Parameter for slot `index`: a copy of the target's parameter at
    /// `index - 1`, or a placeholder when there is nothing usable to copy.
    pub fn create_slot(&self, side: Side, index: usize, target: Option<&NodeInfo>) -> ParamSpec {
        let source = target.and_then(|t| {
            index
                .checked_sub(1)
                .and_then(|i| t.params(side).get(i))
        });
        match source.map(ParamFactory::mirror) {
            Some(Ok(param)) => param,
            Some(Err(err)) => {
                debug!("Slot {} falls back to a placeholder: {}", index, err);
                ParamFactory::placeholder(index)
            }
            None => ParamFactory::placeholder(index),
        }
    }

    /// The host keeps wiring consistent afterwards, so this always agrees.
    pub fn destroy_slot(&self, _side: Side, _index: usize) -> bool {
        true
    }

    /// Appends a slot if `can_insert` allows it and registers it on the
    /// proxy node.
    pub fn insert_slot(
        &mut self,
        proxy: NodeId,
        side: Side,
        index: usize,
        target: Option<&NodeInfo>,
        doc: &mut dyn Document,
    ) -> bool {
        if !self.can_insert(side, index, target) {
            return false;
        }
        let param = self.create_slot(side, index, target);
        doc.register_param(&ParamRef { node: proxy, side, index }, &param);
        self.params_mut(side).push(param);
        true
    }

    /// Drops the tail slot and unregisters it from the proxy node.
    pub fn remove_slot(
        &mut self,
        proxy: NodeId,
        side: Side,
        index: usize,
        doc: &mut dyn Document,
    ) -> Option<ParamSpec> {
        if !self.can_remove(side, index) || !self.destroy_slot(side, index) {
            return None;
        }
        doc.unregister_param(&ParamRef { node: proxy, side, index });
        self.params_mut(side).pop()
    }

    /// Appends slots on both sides until the arity matches `target`.
    /// Returns how many were added.
    pub fn fill_from(
        &mut self,
        proxy: NodeId,
        target: &NodeInfo,
        doc: &mut dyn Document,
    ) -> usize {
        let mut added = 0;
        for side in [Side::Input, Side::Output] {
            while self.insert_slot(proxy, side, self.count(side), Some(target), doc) {
                added += 1;
            }
        }
        added
    }

    /// Phase one of a target change: records who consumes the mirrored
    /// outputs, then unregisters every slot beyond 0 on both sides.
    pub fn teardown(&mut self, proxy: NodeId, doc: &mut dyn Document) -> RecordedLinks {
        let mut recorded = Vec::new();
        for index in 1..self.outputs.len() {
            let source = ParamRef::output(proxy, index);
            for recipient in doc.recipients(&source) {
                recorded.push((source.clone(), recipient));
            }
        }

        for side in [Side::Input, Side::Output] {
            for index in (1..self.count(side)).rev() {
                doc.unregister_param(&ParamRef {
                    node: proxy,
                    side,
                    index,
                });
            }
            self.params_mut(side).truncate(1);
        }

        info!(
            "Proxy {} tore down mirrored slots; {} downstream link(s) to sever",
            proxy,
            recorded.len()
        );
        recorded
    }
}

/// Phase two of a target change: severs the recorded links on the host's
/// next scheduled run. Removing a slot does not unwire its consumers.
pub fn schedule_unwire(links: RecordedLinks, scheduler: &dyn Scheduler) {
    if links.is_empty() {
        return;
    }
    scheduler.schedule_after(
        UNWIRE_DELAY,
        Box::new(move |doc: &mut dyn Document| {
            for (source, recipient) in &links {
                doc.disconnect(source, recipient);
            }
            debug!("Severed {} stale downstream link(s)", links.len());
        }),
    );
}
