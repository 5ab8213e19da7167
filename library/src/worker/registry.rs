use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::error;

/// Count of background runs currently in flight, shared by every proxy that
/// was handed a clone of the same registry.
#[derive(Clone, Debug, Default)]
pub struct WorkerRegistry {
    count: Arc<AtomicUsize>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn enter(&self) -> usize {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn leave(&self) -> usize {
        match self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => {
                error!("WorkerRegistry left more runs than it entered");
                0
            }
        }
    }
}
