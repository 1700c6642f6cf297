use log::warn;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Problems reading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Flags and limits for one VM instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Validate statically on load and check entity, field and jump bounds at run time.
    pub bounds_check: bool,
    /// Substitute a sentinel for division by zero instead of failing.
    pub fault_checks: bool,
    /// Disable the runaway-loop budget.
    pub no_exec_limit: bool,
    /// With bounds checking, reject `address` through entity 0.
    pub null_bad: bool,
    /// Poison a callee's locals after saving them.
    pub deadbeef_locals: bool,
    pub max_stack_depth: usize,
    /// Saved-locals stack size in words.
    pub locals_stack_size: usize,
    /// Statements one top-level execution may run.
    pub runaway_budget: u64,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            bounds_check: false,
            fault_checks: false,
            no_exec_limit: false,
            null_bad: true,
            deadbeef_locals: false,
            max_stack_depth: 64,
            locals_stack_size: 4096,
            runaway_budget: 1_000_000,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_flag(name: &str, target: &mut bool) {
    if let Ok(value) = env::var(name) {
        match parse_flag(&value) {
            Some(flag) => *target = flag,
            None => warn!("ignoring {}={:?}: expected a boolean", name, value),
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(value) = env::var(name) {
        match value.trim().parse() {
            Ok(number) => *target = number,
            Err(_) => warn!("ignoring {}={:?}: expected a number", name, value),
        }
    }
}

impl VmConfig {
    /// Defaults overlaid with the `PR_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        env_flag("PR_BOUNDSCHECK", &mut config.bounds_check);
        env_flag("PR_FAULTCHECKS", &mut config.fault_checks);
        env_flag("PR_NO_EXEC_LIMIT", &mut config.no_exec_limit);
        env_flag("PR_NULL_BAD", &mut config.null_bad);
        env_flag("PR_DEADBEEF_LOCALS", &mut config.deadbeef_locals);
        env_number("PR_MAX_STACK_DEPTH", &mut config.max_stack_depth);
        env_number("PR_LOCALSTACK_SIZE", &mut config.locals_stack_size);
        env_number("PR_RUNAWAY_BUDGET", &mut config.runaway_budget);
        config
    }

    /// Load a JSON configuration file; missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Process-wide configuration read from the environment on first use.
pub static CONFIG: Lazy<VmConfig> = Lazy::new(VmConfig::from_env);

pub fn init() {
    Lazy::force(&CONFIG);
}
