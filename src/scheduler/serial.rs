use log::debug;

use crate::error::Result;
use crate::particle::Acceleration;
use crate::physics::grid::NeighborScratch;
use crate::physics::migration::{advance_tracked, MoveList};
use crate::scheduler::{check_options, RunOptions, RunReport, Scheduler, Simulation};
use crate::trajectory::{Recorder, SnapshotSink};

/// Single-threaded driver; the baseline every parallel run must reproduce.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialScheduler;

impl Scheduler for SerialScheduler {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn threads(&self) -> usize {
        1
    }

    fn run(
        &self,
        sim: &mut Simulation,
        options: &RunOptions,
        sink: Option<&mut dyn SnapshotSink>,
    ) -> Result<RunReport> {
        check_options(options)?;
        let mut recorder = Recorder::new(sink, options.save_frequency);
        let mut force_buffer = vec![Acceleration::zeros(); sim.particles.len()];
        let mut scratch = NeighborScratch::default();
        let mut moves = MoveList::with_capacity(sim.particles.len());
        let mut migrations = 0;

        for step in 0..options.steps {
            // Zero accelerations
            for (particle, force) in sim.particles.iter_mut().zip(&mut force_buffer) {
                particle.acceleration = Acceleration::zeros();
                *force = Acceleration::zeros();
            }

            // Forces from each cell and its Moore neighbours
            for coord in sim.grid.coords() {
                sim.grid.cell_accelerations(
                    coord,
                    &sim.particles[..],
                    &sim.physics,
                    &mut scratch,
                    |i, a| force_buffer[i] = a,
                );
            }

            // Integrate, remembering who changed cells
            for (i, particle) in sim.particles.iter_mut().enumerate() {
                particle.acceleration = force_buffer[i];
                let (from, to) = advance_tracked(&sim.grid, i, particle, sim.physics.dt)?;
                moves.record(i, from, to);
            }

            migrations += moves.apply(&sim.grid)?;
            if options.verify {
                sim.verify()?;
            }
            sim.step += 1;

            if recorder.is_due(step) {
                debug!("Saving snapshot at step {step}");
                recorder.record(sim.grid.side(), sim.particles.iter().map(|p| p.position));
            }
        }
        recorder.finish();

        Ok(RunReport {
            steps: options.steps,
            snapshots: recorder.saved(),
            migrations,
            threads: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::seeded_particles;
    use crate::error::Error;
    use crate::physics::{CellCoord, PhysicsSettings};
    use crate::trajectory::Trajectory;

    #[test]
    fn grid_stays_consistent_every_step() {
        let physics = PhysicsSettings::default();
        let side = physics.domain_side(200);
        let mut sim = Simulation::new(seeded_particles(200, side, Some(1)), side, physics).unwrap();
        let options = RunOptions {
            steps: 40,
            save_frequency: 10,
            verify: true,
        };
        let report = SerialScheduler.run(&mut sim, &options, None).unwrap();
        assert_eq!(report.steps, 40);
        assert_eq!(sim.step(), 40);
        sim.verify().unwrap();
    }

    #[test]
    fn failed_verification_does_not_count_the_step() {
        let physics = PhysicsSettings::default();
        let side = physics.domain_side(30);
        let mut sim = Simulation::new(seeded_particles(30, side, Some(3)), side, physics).unwrap();
        let home = sim.grid.cell_of(0, &sim.particles[0].position).unwrap();
        let far = sim.grid.dim() - 1;
        let stray = if home.cx + home.cy < far {
            CellCoord::new(far, far)
        } else {
            CellCoord::new(0, 0)
        };
        sim.grid.insert(0, stray);

        let options = RunOptions {
            steps: 5,
            save_frequency: 1,
            verify: true,
        };
        let err = SerialScheduler.run(&mut sim, &options, None).unwrap_err();
        assert!(matches!(err, Error::GridOccupancy { held: 31, expected: 30 }));
        assert_eq!(sim.step(), 0);
    }

    #[test]
    fn snapshots_follow_save_frequency() {
        let physics = PhysicsSettings::default();
        let side = physics.domain_side(50);
        let mut sim = Simulation::new(seeded_particles(50, side, Some(2)), side, physics).unwrap();
        let mut trajectory = Trajectory::default();
        let options = RunOptions {
            steps: 21,
            save_frequency: 10,
            verify: false,
        };
        let report = SerialScheduler
            .run(&mut sim, &options, Some(&mut trajectory))
            .unwrap();
        assert_eq!(report.snapshots, 3);
        assert_eq!(trajectory.frames.len(), 3);
        assert_eq!(trajectory.frames[0].len(), 50);
        assert_eq!(trajectory.side, Some(side));
    }
}
