//! Runtime configuration.

use std::path::Path;

use nux_host::HostConfig;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Configuration for the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Limits and defaults for the host session.
    pub host: HostConfig,

    /// Target updates per second for the realtime loop and for the
    /// timestamps of headless runs.
    pub frame_rate: u32,

    /// Export called once after instantiation.
    pub init_export: String,

    /// Export called once per frame.
    pub update_export: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            host: HostConfig::default(),
            frame_rate: 60,
            init_export: "runtime_init".to_string(),
            update_export: "instance_update".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Milliseconds between frames.
    pub fn frame_interval_ms(&self) -> f64 {
        1000.0 / f64::from(self.frame_rate.max(1))
    }
}
