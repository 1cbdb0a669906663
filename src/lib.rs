//! Short-range particle simulation on a uniform cell list, run serially or
//! on a barrier-synchronised worker pool.

pub mod app_settings;
pub mod cli;
pub mod error;
pub mod particle;
pub mod physics;
pub mod scheduler;
pub mod trajectory;

mod sync;

pub use app_settings::SimulationSettings;
pub use error::{Error, Result};
pub use particle::Particle;
pub use scheduler::{ParallelScheduler, RunOptions, RunReport, Scheduler, SerialScheduler, Simulation};
