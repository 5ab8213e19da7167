use anyhow::Context;
use directories::ProjectDirs;
use ghost_worker::WorkerConfig;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings of the headless host, stored as `host.toml` in the user's
/// config directory.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct HostConfig {
    /// Re-check period of the monitor node.
    pub monitor_interval_ms: i64,
    pub auto_refresh: bool,
    pub auto_requeue: bool,
    /// Input changes fed to the proxy before the host shuts down.
    pub passes: usize,
    /// How long the demo target sleeps per evaluation.
    pub work_ms: u64,
    pub worker: WorkerConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            monitor_interval_ms: ghost_worker::monitor::DEFAULT_INTERVAL_MS,
            auto_refresh: true,
            auto_requeue: true,
            passes: 3,
            work_ms: 400,
            worker: WorkerConfig::default(),
        }
    }
}

const QUALIFIER: &str = "org";
const ORGANIZATION: &str = "ghostworker";
const APPLICATION: &str = "ghost_host";
const FILE_NAME: &str = "host.toml";

/// `host.toml` in the platform config directory, if the platform has one.
fn config_path() -> Option<PathBuf> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .map(|dirs| dirs.config_dir().join(FILE_NAME))
}

fn read_config(path: &Path) -> anyhow::Result<HostConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn write_config(path: &Path, config: &HostConfig) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let text = toml::to_string_pretty(config)?;
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

pub fn save_config(config: &HostConfig) {
    let Some(path) = config_path() else {
        warn!("No config directory on this platform; host config not saved");
        return;
    };
    match write_config(&path, config) {
        Ok(()) => info!("Host config saved to {}", path.display()),
        Err(e) => error!("Failed to save host config: {:#}", e),
    }
}

/// Reads the saved config. Writes the defaults out on first run so there is
/// a file to edit; any other failure falls back to the defaults.
pub fn load_config() -> HostConfig {
    let Some(path) = config_path() else {
        return HostConfig::default();
    };
    if !path.exists() {
        let config = HostConfig::default();
        save_config(&config);
        return config;
    }
    read_config(&path).unwrap_or_else(|e| {
        warn!("Using default host config: {:#}", e);
        HostConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: HostConfig = toml::from_str("passes = 7\n[worker]\nthreads = 2\n").unwrap();
        assert_eq!(config.passes, 7);
        assert_eq!(config.worker.thread_count(), 2);
        assert_eq!(config.worker.thread_name, "ghost-worker");
        assert!(config.auto_requeue);
    }

    #[test]
    fn test_write_then_read_back() {
        let dir = std::env::temp_dir().join(format!("ghost_host_{}", std::process::id()));
        let path = dir.join(FILE_NAME);
        let config = HostConfig {
            passes: 9,
            ..HostConfig::default()
        };
        write_config(&path, &config).unwrap();
        assert_eq!(read_config(&path).unwrap().passes, 9);

        fs::write(&path, "passes = \"many\"").unwrap();
        assert!(read_config(&path).is_err());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_default_serializes() {
        let text = toml::to_string_pretty(&HostConfig::default()).unwrap();
        let back: HostConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.monitor_interval_ms, 1000);
    }
}
