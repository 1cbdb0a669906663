//! Fixed-step drivers.
//!
//! Both schedulers run the same per-step phases over a [`Simulation`]:
//! zero accelerations, evaluate forces from the grid, integrate, migrate,
//! and optionally append a snapshot.

use log::info;

use crate::error::{Error, Result};
use crate::particle::Particle;
use crate::physics::{PhysicsSettings, SpatialGrid};
use crate::trajectory::SnapshotSink;

pub mod parallel;
pub mod partition;
pub mod serial;

pub use parallel::ParallelScheduler;
pub use partition::Partition;
pub use serial::SerialScheduler;

/// Everything one run mutates, passed explicitly to the schedulers.
pub struct Simulation {
    particles: Vec<Particle>,
    grid: SpatialGrid,
    physics: PhysicsSettings,
    step: usize,
}

impl Simulation {
    /// Builds the grid for `particles` inside `[0, side]²`.
    pub fn new(particles: Vec<Particle>, side: f64, physics: PhysicsSettings) -> Result<Self> {
        physics.validate()?;
        if particles.is_empty() {
            return Err(Error::InvalidParam("at least one particle is required".into()));
        }
        let grid = SpatialGrid::build(&particles, side, physics.cell_size())?;
        info!(
            "Simulation of {} particles in a {side:.6} box, {}x{} grid",
            particles.len(),
            grid.dim(),
            grid.dim()
        );
        Ok(Self {
            particles,
            grid,
            physics,
            step: 0,
        })
    }

    /// Domain side from the particle count, as the driver derives it.
    pub fn with_density(particles: Vec<Particle>, physics: PhysicsSettings) -> Result<Self> {
        let side = physics.domain_side(particles.len());
        Self::new(particles, side, physics)
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn physics(&self) -> &PhysicsSettings {
        &self.physics
    }

    pub fn side(&self) -> f64 {
        self.grid.side()
    }

    /// Steps completed so far.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Checks the grid/position invariant for every particle.
    pub fn verify(&self) -> Result<()> {
        self.grid.verify(&self.particles[..], self.particles.len())
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub steps: usize,
    pub save_frequency: usize,
    /// Check the grid invariant after every step.
    pub verify: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            steps: 1000,
            save_frequency: 10,
            verify: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub steps: usize,
    pub snapshots: usize,
    /// Cell changes applied to the grid over the run.
    pub migrations: usize,
    pub threads: usize,
}

pub trait Scheduler {
    fn name(&self) -> &'static str;

    fn threads(&self) -> usize;

    fn run(
        &self,
        sim: &mut Simulation,
        options: &RunOptions,
        sink: Option<&mut dyn SnapshotSink>,
    ) -> Result<RunReport>;
}

fn check_options(options: &RunOptions) -> Result<()> {
    if options.save_frequency == 0 {
        return Err(Error::InvalidParam("save frequency must be at least 1".into()));
    }
    Ok(())
}
