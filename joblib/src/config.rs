//! Orchestrator configuration, usually loaded from `jobs.toml`.
//!
//! Every field has a default so a partial (or missing) file is fine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `worker.program`.
pub const WORKER_PROGRAM_ENV: &str = "JOBCTL_WORKER";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub collector: CollectorConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Jobs allowed to run at once. The worker is CPU and memory heavy.
    pub max_concurrent_jobs: usize,
    /// Jobs allowed to wait for a slot. `None` means unbounded.
    pub max_queue_depth: Option<usize>,
    /// Capacity of the coordinator's inbox.
    pub message_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_queue_depth: None,
            message_capacity: 64,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub program: String,
    /// Arguments placed before the job's own flags, e.g. the script path.
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub envs: HashMap<String, String>,
    /// Directory the worker writes `<job id>.dxf` into.
    pub output_dir: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["generate_dxf.py".to_string()],
            working_dir: None,
            envs: HashMap::new(),
            output_dir: PathBuf::from("output"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub sweep_interval_secs: u64,
    /// How long finished jobs are kept. Running jobs silent for twice this long are reaped.
    pub retention_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30 * 60,
            retention_secs: 60 * 60,
        }
    }
}

impl CollectorConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl OrchestratorConfig {
    /// Load the config at `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<OrchestratorConfig>(&contents)?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        if let Ok(program) = std::env::var(WORKER_PROGRAM_ENV) {
            if !program.is_empty() {
                config.worker.program = program;
            }
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
