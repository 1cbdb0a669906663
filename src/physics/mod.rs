use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::particle::Particle;

pub mod grid;
pub mod migration;
pub mod reference;

pub use grid::{CellCoord, SpatialGrid};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    /// Particles per unit area; fixes the domain side for a given count.
    pub density: f64,
    pub mass: f64,
    /// Interaction range; also the grid cell size.
    pub cutoff: f64,
    /// Separation floor that keeps the force finite.
    pub min_r: f64,
    pub dt: f64,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            density: 0.0005,
            mass: 0.01,
            cutoff: 0.01,
            min_r: 0.01 / 100.0,
            dt: 0.0005,
        }
    }
}

impl PhysicsSettings {
    /// Side length of the square domain holding `n` particles at `density`.
    pub fn domain_side(&self, n: usize) -> f64 {
        (self.density * n as f64).sqrt()
    }

    pub fn cell_size(&self) -> f64 {
        self.cutoff
    }

    pub fn validate(&self) -> Result<()> {
        let named = [
            ("density", self.density),
            ("mass", self.mass),
            ("cutoff", self.cutoff),
            ("min_r", self.min_r),
            ("dt", self.dt),
        ];
        for (name, value) in named {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidParam(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        if self.min_r > self.cutoff {
            return Err(Error::InvalidParam(format!(
                "min_r ({}) must not exceed cutoff ({})",
                self.min_r, self.cutoff
            )));
        }
        Ok(())
    }
}

/// Accumulates the repulsion `neighbor` exerts on `particle`.
///
/// Only `particle.acceleration` changes. Pairs further apart than the cutoff
/// contribute nothing, which is what makes pruning by grid cell exact.
#[inline]
pub fn apply_force(particle: &mut Particle, neighbor: &Particle, physics: &PhysicsSettings) {
    let delta = neighbor.position - particle.position;
    let mut r2 = delta.norm_squared();
    if r2 > physics.cutoff * physics.cutoff {
        return;
    }
    r2 = r2.max(physics.min_r * physics.min_r);
    let r = r2.sqrt();

    let coef = (1.0 - physics.cutoff / r) / r2 / physics.mass;
    particle.acceleration += delta * coef;
}

/// Steps one particle forward by `dt` and bounces it off the walls of
/// `[0, side]²`.
pub fn advance(particle: &mut Particle, dt: f64, side: f64) {
    particle.velocity += particle.acceleration * dt;
    particle.position += particle.velocity * dt;

    for axis in 0..2 {
        // A single step may overshoot by more than one domain width.
        while particle.position[axis] < 0.0 || particle.position[axis] > side {
            particle.position[axis] = if particle.position[axis] < 0.0 {
                -particle.position[axis]
            } else {
                2.0 * side - particle.position[axis]
            };
            particle.velocity[axis] = -particle.velocity[axis];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{Position, Velocity};

    #[test]
    fn no_force_beyond_cutoff() {
        let physics = PhysicsSettings::default();
        let mut a = Particle::at_rest(0.5, 0.5);
        let mut b = Particle::at_rest(0.5 + physics.cutoff * 1.01, 0.5);
        let b_copy = b;
        apply_force(&mut a, &b_copy, &physics);
        let a_copy = a;
        apply_force(&mut b, &a_copy, &physics);
        assert_eq!(a.acceleration, Position::zeros());
        assert_eq!(b.acceleration, Position::zeros());
    }

    #[test]
    fn force_is_repulsive_and_only_touches_first_argument() {
        let physics = PhysicsSettings::default();
        let mut a = Particle::at_rest(0.5, 0.5);
        let b = Particle::at_rest(0.5 + physics.cutoff * 0.5, 0.5);
        apply_force(&mut a, &b, &physics);
        assert!(a.acceleration.x < 0.0);
        assert_eq!(a.acceleration.y, 0.0);
        assert_eq!(b.acceleration, Position::zeros());
    }

    #[test]
    fn force_stays_finite_at_zero_separation() {
        let physics = PhysicsSettings::default();
        for gap in [0.0, 1e-12, 1e-300] {
            let mut a = Particle::at_rest(0.5, 0.5);
            let b = Particle::at_rest(0.5 + gap, 0.5);
            apply_force(&mut a, &b, &physics);
            assert!(a.acceleration.x.is_finite());
            assert!(a.acceleration.y.is_finite());
        }
    }

    #[test]
    fn pair_forces_are_antisymmetric() {
        let physics = PhysicsSettings::default();
        let mut a = Particle::at_rest(0.500, 0.500);
        let mut b = Particle::at_rest(0.503, 0.504);
        let (a0, b0) = (a, b);
        apply_force(&mut a, &b0, &physics);
        apply_force(&mut b, &a0, &physics);
        assert!((a.acceleration + b.acceleration).norm() < 1e-9 * a.acceleration.norm());
    }

    #[test]
    fn advance_uses_velocity_then_position() {
        let mut p = Particle::new(Position::new(0.5, 0.5), Velocity::new(1.0, 0.0));
        p.acceleration = Position::new(2.0, 0.0);
        advance(&mut p, 0.1, 1.0);
        assert!((p.velocity.x - 1.2).abs() < 1e-12);
        assert!((p.position.x - 0.62).abs() < 1e-12);
    }

    #[test]
    fn reflection_handles_multiple_bounces_in_one_step() {
        let side = 1.0;
        // Lands at -1.5 before reflection: -1.5 -> 1.5 -> 0.5, two bounces.
        let mut p = Particle::new(Position::new(0.5, 0.5), Velocity::new(-2.0, 0.0));
        advance(&mut p, 1.0, side);
        assert!((p.position.x - 0.5).abs() < 1e-12);
        assert_eq!(p.velocity.x, -2.0);

        // Lands at 2.5 before reflection: 2.5 -> -0.5 -> 0.5, two bounces.
        let mut q = Particle::new(Position::new(0.5, 0.5), Velocity::new(0.0, 2.0));
        advance(&mut q, 1.0, side);
        assert!((q.position.y - 0.5).abs() < 1e-12);
        assert_eq!(q.velocity.y, 2.0);

        // Single bounce flips the sign.
        let mut r = Particle::new(Position::new(0.9, 0.5), Velocity::new(0.3, 0.0));
        advance(&mut r, 1.0, side);
        assert!((r.position.x - 0.8).abs() < 1e-12);
        assert_eq!(r.velocity.x, -0.3);
    }

    #[test]
    fn domain_side_keeps_density_constant() {
        let physics = PhysicsSettings::default();
        let side = physics.domain_side(1000);
        assert!((side * side / 1000.0 - physics.density).abs() < 1e-15);
    }

    #[test]
    fn validate_rejects_non_positive_constants() {
        let physics = PhysicsSettings {
            dt: 0.0,
            ..PhysicsSettings::default()
        };
        assert!(physics.validate().is_err());
        assert!(PhysicsSettings::default().validate().is_ok());
    }
}
