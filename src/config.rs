//! Simulation configuration
//!
//! ```json
//! { "max_steps_per_tick": 500, "worker_threads": 0, "scent_deposit": 1 }
//! ```
//!
//! Missing keys fall back to [`VmConfig::default`].

use crate::error::{AntvmError, Result};
use crate::vm::DEFAULT_STEP_BUDGET;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for the tick coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Local steps a worker may run per tick before it is cut off
    pub max_steps_per_tick: usize,
    /// Worker pool size (0 = one per core)
    pub worker_threads: usize,
    /// Scent laid per successful move while a write channel is on
    pub scent_deposit: u8,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_steps_per_tick: DEFAULT_STEP_BUDGET,
            worker_threads: 0,
            scent_deposit: 1,
        }
    }
}

impl VmConfig {
    /// Everything on the coordinating thread's pool of one
    pub fn single_threaded() -> Self {
        Self {
            worker_threads: 1,
            ..Self::default()
        }
    }

    pub fn with_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_step_budget(mut self, max_steps_per_tick: usize) -> Self {
        self.max_steps_per_tick = max_steps_per_tick;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_steps_per_tick == 0 {
            return Err(AntvmError::Config(
                "max_steps_per_tick must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VmConfig::default();
        assert_eq!(config.max_steps_per_tick, 500);
        assert_eq!(config.worker_threads, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = VmConfig::from_json(r#"{ "worker_threads": 4 }"#).unwrap();
        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.max_steps_per_tick, 500);
    }

    #[test]
    fn test_rejects_zero_budget() {
        let err = VmConfig::from_json(r#"{ "max_steps_per_tick": 0 }"#).unwrap_err();
        assert!(matches!(err, AntvmError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "scent_deposit": 9 }}"#).unwrap();
        let config = VmConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.scent_deposit, 9);

        assert!(VmConfig::from_json_file("/nonexistent/antvm.json").is_err());
    }
}
