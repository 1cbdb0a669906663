//! O(N²) all-pairs force pass, the baseline the cell list has to agree with.
use rayon::prelude::*;

use crate::particle::{Acceleration, Particle};
use crate::physics::{apply_force, PhysicsSettings};

pub fn brute_force_accelerations(
    particles: &[Particle],
    physics: &PhysicsSettings,
) -> Vec<Acceleration> {
    let mut accelerations = vec![Acceleration::zeros(); particles.len()];
    if particles.is_empty() {
        return accelerations;
    }

    let chunk_size = (particles.len() / num_cpus::get()).max(1);
    accelerations
        .par_chunks_mut(chunk_size)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            let start_idx = chunk_idx * chunk_size;
            for (local_i, acceleration) in chunk.iter_mut().enumerate() {
                let i = start_idx + local_i;
                let mut probe = particles[i];
                probe.acceleration = Acceleration::zeros();
                for (j, neighbor) in particles.iter().enumerate() {
                    if i != j {
                        apply_force(&mut probe, neighbor, physics);
                    }
                }
                *acceleration = probe.acceleration;
            }
        });
    accelerations
}
