use thiserror::Error;
use uuid::Uuid;

use crate::worker::RunState;

/// Problems with how the proxy is wired up. Detected on the host thread
/// before anything is dispatched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("No component linked to the Component input")]
    NoTargetLinked,
    #[error("Linked object {0} no longer exists in the document")]
    TargetMissing(Uuid),
    #[error("'{0}' is likely either a special component or from a plugin. Cannot evaluate")]
    TargetUnresolvable(String),
    #[error("'{0}' is a special object and cannot be evaluated")]
    DisallowedTarget(String),
    #[error(
        "Awaiting parameters for '{target}': expected {expected_inputs} input(s) and {expected_outputs} output(s), have {actual_inputs} and {actual_outputs}"
    )]
    AwaitingParameters {
        target: String,
        expected_inputs: usize,
        expected_outputs: usize,
        actual_inputs: usize,
        actual_outputs: usize,
    },
}

#[derive(Error, Debug)]
pub enum GhostError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Dispatch rejected: a run is already {0:?}")]
    DispatchRejected(RunState),
    #[error("Parameter kind '{0}' cannot be mirrored")]
    UnsupportedParam(String),
    #[error("Evaluation error: {0}")]
    Evaluation(String),
    #[error("Worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}
