//! Command line interface

use std::path::{Path, PathBuf};

use clap::Parser;
use log::info;

use crate::app_settings::SimulationSettings;
use crate::error::{Error, Result};
use crate::physics::migration::MigrationStrategy;

/// Short-range particle simulation on a uniform cell list
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Number of particles
    #[arg(short = 'n', value_name = "COUNT", default_value_t = 1000)]
    pub particles: usize,

    /// Worker threads (0 = one per logical CPU; ignored with --serial)
    #[arg(short = 'p', value_name = "THREADS")]
    pub threads: Option<usize>,

    /// Trajectory output file; nothing is written without it
    #[arg(short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to settings file (TOML format)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Random seed for initial placement
    #[arg(short, long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Number of time steps (overrides settings file)
    #[arg(long, value_name = "COUNT")]
    pub steps: Option<usize>,

    /// Save a snapshot every N steps (overrides settings file)
    #[arg(long, value_name = "N")]
    pub save_freq: Option<usize>,

    /// Run the single-threaded scheduler
    #[arg(long)]
    pub serial: bool,

    /// How workers update the grid after moving particles
    #[arg(long, value_enum)]
    pub migration: Option<MigrationStrategy>,

    /// Check the grid against particle positions after every step
    #[arg(long)]
    pub verify: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Loads settings from file or defaults, then applies command-line overrides
pub fn load_and_apply_config(args: &Args) -> Result<SimulationSettings> {
    let mut settings = match &args.config {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config {
                    path: path.clone(),
                    detail: "file not found".into(),
                });
            }
            info!("Loading settings from: {}", path.display());
            SimulationSettings::load(path)?
        }
        None => {
            let default_path = Path::new(SimulationSettings::SETTINGS_FILE);
            if default_path.exists() {
                info!("Loading settings from: {}", default_path.display());
            }
            SimulationSettings::load(default_path)?
        }
    };

    if let Some(threads) = args.threads {
        settings.run.threads = threads;
    }
    if let Some(seed) = args.seed {
        info!("Using random seed: {seed}");
        settings.run.seed = Some(seed);
    }
    if let Some(steps) = args.steps {
        settings.run.steps = steps;
    }
    if let Some(save_frequency) = args.save_freq {
        settings.run.save_frequency = save_frequency;
    }
    if let Some(migration) = args.migration {
        settings.run.migration = migration;
    }

    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_flags() {
        let args = Args::try_parse_from(["cell-list"]).unwrap();
        assert_eq!(args.particles, 1000);
        assert_eq!(args.threads, None);
        assert!(args.output.is_none());
        assert!(!args.serial);
    }

    #[test]
    fn short_flags_parse() {
        let args =
            Args::try_parse_from(["cell-list", "-n", "500", "-p", "4", "-o", "out.txt"]).unwrap();
        assert_eq!(args.particles, 500);
        assert_eq!(args.threads, Some(4));
        assert_eq!(args.output, Some(PathBuf::from("out.txt")));
    }

    #[test]
    fn help_is_a_clean_exit() {
        let err = Args::try_parse_from(["cell-list", "-h"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert_eq!(err.exit_code(), 0);
    }

    #[test]
    fn overrides_apply_over_settings() {
        let args = Args::try_parse_from([
            "cell-list",
            "-p",
            "3",
            "--steps",
            "50",
            "--save-freq",
            "5",
            "--migration",
            "deferred",
            "-s",
            "7",
        ])
        .unwrap();
        let settings = load_and_apply_config(&args).unwrap();
        assert_eq!(settings.run.threads, 3);
        assert_eq!(settings.run.steps, 50);
        assert_eq!(settings.run.save_frequency, 5);
        assert_eq!(settings.run.migration, MigrationStrategy::Deferred);
        assert_eq!(settings.run.seed, Some(7));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let args = Args::try_parse_from(["cell-list", "-c", "no/such/settings.toml"]).unwrap();
        assert!(matches!(
            load_and_apply_config(&args),
            Err(Error::Config { .. })
        ));
    }
}
