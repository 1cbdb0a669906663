use std::ops::Range;

/// Work ownership for the parallel scheduler, decided once per run.
///
/// - Particle indices are split into `threads` contiguous ranges. The owner
///   of a range zeroes, integrates and migrates those particles, and keeps
///   them in its store chunk.
/// - Grid rows are split the same way into row bands. The owner of a band
///   evaluates forces for every particle its cells hold.
///
/// Both splits give every part `len / threads` items and hand the remainder
/// to the last part. A particle sits in exactly one cell when the force
/// phase starts, so exactly one band owner writes its acceleration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    particles: usize,
    rows: usize,
    threads: usize,
}

impl Partition {
    pub fn new(particles: usize, rows: usize, threads: usize) -> Self {
        Self {
            particles,
            rows,
            threads: threads.max(1),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Particle indices owned by thread `t`.
    pub fn particles(&self, t: usize) -> Range<usize> {
        split(self.particles, self.threads, t)
    }

    /// Grid rows owned by thread `t` during the force phase.
    pub fn rows(&self, t: usize) -> Range<usize> {
        split(self.rows, self.threads, t)
    }

    /// Thread owning particle `index`.
    pub fn owner_of(&self, index: usize) -> usize {
        owner(self.particles, self.threads, index)
    }

    /// Store chunk and offset of particle `index`.
    pub fn locate(&self, index: usize) -> (usize, usize) {
        let t = self.owner_of(index);
        (t, index - self.particles(t).start)
    }
}

fn split(len: usize, parts: usize, t: usize) -> Range<usize> {
    let base = len / parts;
    let start = (t * base).min(len);
    let end = if t + 1 == parts { len } else { start + base };
    start..end
}

fn owner(len: usize, parts: usize, index: usize) -> usize {
    let base = len / parts;
    if base == 0 {
        parts - 1
    } else {
        (index / base).min(parts - 1)
    }
}
