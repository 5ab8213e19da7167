//! Worker pool configuration.

use std::cmp;
use std::thread;

use serde::{Deserialize, Serialize};

pub const DEFAULT_THREAD_NAME: &str = "ghost-worker";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Size of the shared pool. `None` uses the available parallelism.
    pub threads: Option<usize>,
    /// Prefix for worker thread names; the thread index is appended.
    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: None,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads: Some(threads),
            ..Self::default()
        }
    }

    pub fn thread_count(&self) -> usize {
        if let Some(count) = self.threads {
            return cmp::max(1, count);
        }
        thread::available_parallelism()
            .map(|v| v.get())
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config: WorkerConfig = serde_json::from_str(r#"{ "threads": 3 }"#).unwrap();
        assert_eq!(config.threads, Some(3));
        assert_eq!(config.thread_name, DEFAULT_THREAD_NAME);

        let config: WorkerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, WorkerConfig::default());
    }

    #[test]
    fn test_thread_count_is_never_zero() {
        assert_eq!(WorkerConfig::with_threads(0).thread_count(), 1);
        assert_eq!(WorkerConfig::with_threads(4).thread_count(), 4);
        assert!(WorkerConfig::default().thread_count() >= 1);
    }
}
