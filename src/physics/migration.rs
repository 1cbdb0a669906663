use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::particle::Particle;
use crate::physics::{advance, CellCoord, SpatialGrid};

/// How worker threads reconcile the grid after integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStrategy {
    /// Each worker relocates its own particles under per-cell locks.
    #[default]
    Locked,
    /// Workers record moves; one thread applies them all after a barrier.
    Deferred,
}

/// One particle changing cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub particle: usize,
    pub from: CellCoord,
    pub to: CellCoord,
}

/// Pending relocations, applied against the live grid.
#[derive(Debug, Default)]
pub struct MoveList {
    moves: Vec<Migration>,
}

impl MoveList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            moves: Vec::with_capacity(capacity),
        }
    }

    /// Records a move; particles that stay put are skipped.
    pub fn record(&mut self, particle: usize, from: CellCoord, to: CellCoord) {
        if from != to {
            self.moves.push(Migration { particle, from, to });
        }
    }

    pub fn moves(&self) -> &[Migration] {
        &self.moves
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Applies and clears every recorded move; the buffer keeps its capacity.
    pub fn apply(&mut self, grid: &SpatialGrid) -> Result<usize> {
        let applied = self.moves.len();
        for m in self.moves.drain(..) {
            grid.move_if_needed(m.particle, m.from, m.to)?;
        }
        Ok(applied)
    }
}

/// Integrates particle `index` and reports the cell it left and the cell it
/// landed in.
pub fn advance_tracked(
    grid: &SpatialGrid,
    index: usize,
    particle: &mut Particle,
    dt: f64,
) -> Result<(CellCoord, CellCoord)> {
    let from = grid.cell_of(index, &particle.position)?;
    advance(particle, dt, grid.side());
    let to = grid.cell_of(index, &particle.position)?;
    Ok((from, to))
}
