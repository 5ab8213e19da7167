//! Proxy nodes that move a dataflow node's evaluation onto background
//! workers and hand results back into the host's single-threaded solve pass.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod host;
pub mod model;
pub mod monitor;
pub mod proxy;
pub mod util;
pub mod worker;

pub use config::WorkerConfig;
pub use diagnostics::{MessageLevel, RuntimeMessage};
pub use error::{ConfigurationError, GhostError};
pub use monitor::{MonitorInput, MonitorNode, MonitorOutput};
pub use proxy::{ProxyInstance, ProxyState, SolveContext, SolveInput, SolveOutput};
pub use worker::{RunState, WorkerPool, WorkerRegistry};
