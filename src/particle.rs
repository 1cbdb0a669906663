use nalgebra::Vector2;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub type Position = Vector2<f64>;
pub type Velocity = Vector2<f64>;
pub type Acceleration = Vector2<f64>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Position,
    pub velocity: Velocity,
    /// Scratch accumulator, zeroed and recomputed every step.
    pub acceleration: Acceleration,
}

impl Particle {
    pub fn new(position: Position, velocity: Velocity) -> Self {
        Self {
            position,
            velocity,
            acceleration: Acceleration::zeros(),
        }
    }

    pub fn at_rest(x: f64, y: f64) -> Self {
        Self::new(Position::new(x, y), Velocity::zeros())
    }
}

/// Read access to the particle store by stable index.
pub trait ParticleLookup {
    fn particle(&self, index: usize) -> &Particle;
}

impl ParticleLookup for [Particle] {
    fn particle(&self, index: usize) -> &Particle {
        &self[index]
    }
}

/// Places `n` particles on a shuffled lattice inside `[0, side]²`.
///
/// Lattice slots are handed out in random order so particle indices carry no
/// spatial ordering; velocities are uniform in `[-1, 1)` per component.
pub fn init_particles(n: usize, side: f64, rng: &mut impl Rng) -> Vec<Particle> {
    if n == 0 {
        return Vec::new();
    }

    let sx = (n as f64).sqrt().ceil() as usize;
    let sy = (n + sx - 1) / sx;

    let mut slots: Vec<usize> = (0..n).collect();
    slots.shuffle(rng);

    slots
        .into_iter()
        .map(|k| {
            let position = Position::new(
                side * (1.0 + (k % sx) as f64) / (1 + sx) as f64,
                side * (1.0 + (k / sx) as f64) / (1 + sy) as f64,
            );
            let velocity = Velocity::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            Particle::new(position, velocity)
        })
        .collect()
}

/// Seeded placement; `None` draws the seed from entropy.
pub fn seeded_particles(n: usize, side: f64, seed: Option<u64>) -> Vec<Particle> {
    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    init_particles(n, side, &mut rng)
}
