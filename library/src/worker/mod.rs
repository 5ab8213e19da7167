//! Background execution: the shared pool, the run counter and the
//! per-proxy single-flight state machine.

pub mod buffer;
pub mod dispatcher;
pub mod registry;

pub use buffer::{ResultBuffer, RunOutcome};
pub use dispatcher::{
    Consumed, DispatchRequest, RunState, TargetLocks, WorkerDispatcher, WorkerPool,
};
pub use registry::WorkerRegistry;
