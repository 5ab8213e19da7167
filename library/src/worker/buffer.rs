use std::time::Duration;

use crate::diagnostics::RuntimeMessage;
use crate::model::DataTree;

/// Everything one background run produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub duration: Duration,
    pub warnings: Vec<String>,
    /// Failure of the wrapped call itself (error return or panic).
    pub errors: Vec<String>,
    pub results: Vec<Option<DataTree>>,
}

impl RunOutcome {
    pub fn elapsed_line(&self) -> String {
        format!("elapsed: {:?}", self.duration)
    }

    /// Warnings and errors of the run, in that order.
    pub fn diagnostics(&self) -> Vec<RuntimeMessage> {
        self.warnings
            .iter()
            .map(RuntimeMessage::warning)
            .chain(self.errors.iter().map(RuntimeMessage::error))
            .collect()
    }
}

/// Latest completed run, written once per run and taken once per consumption.
///
/// Lives inside the dispatcher's lock, so a store replaces the whole tuple
/// before any reader can look at it.
#[derive(Debug, Default)]
pub struct ResultBuffer {
    latest: Option<RunOutcome>,
}

impl ResultBuffer {
    pub fn store(&mut self, outcome: RunOutcome) {
        self.latest = Some(outcome);
    }

    pub fn take(&mut self) -> Option<RunOutcome> {
        self.latest.take()
    }

    pub fn has_unconsumed(&self) -> bool {
        self.latest.is_some()
    }
}
