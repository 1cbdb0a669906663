use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::physics::migration::MigrationStrategy;
use crate::physics::PhysicsSettings;

/// Run length, threading and output cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Number of time steps to simulate
    pub steps: usize,
    /// Save a snapshot every this many steps
    pub save_frequency: usize,
    /// Worker threads for the parallel scheduler; 0 means one per logical CPU
    pub threads: usize,
    /// Seed for initial placement; absent means entropy
    pub seed: Option<u64>,
    /// How workers reconcile the grid after integration
    pub migration: MigrationStrategy,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            steps: 1000,
            save_frequency: 10,
            threads: 2,
            seed: None,
            migration: MigrationStrategy::Locked,
        }
    }
}

/// Settings that control the particle simulation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub physics: PhysicsSettings,
    pub run: RunSettings,
}

impl SimulationSettings {
    pub const SETTINGS_FILE: &'static str = "settings.toml";

    /// Loads settings from `path`, or returns default settings if the file doesn't exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let config_error = |detail: String| Error::Config {
            path: path.to_path_buf(),
            detail,
        };
        let contents = fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        let settings: SimulationSettings =
            toml::from_str(&contents).map_err(|e| config_error(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.physics.validate()?;
        if self.run.steps == 0 {
            return Err(Error::InvalidParam("steps must be at least 1".into()));
        }
        if self.run.save_frequency == 0 {
            return Err(Error::InvalidParam("save_frequency must be at least 1".into()));
        }
        Ok(())
    }

    /// Thread count with 0 resolved to the number of logical CPUs.
    pub fn resolved_threads(&self) -> usize {
        match self.run.threads {
            0 => num_cpus::get(),
            t => t,
        }
    }
}
