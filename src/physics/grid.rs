use std::sync::{RwLock, RwLockReadGuard};

use log::debug;

use crate::error::{Error, Result};
use crate::particle::{Acceleration, Particle, ParticleLookup, Position};
use crate::physics::{apply_force, PhysicsSettings};
use crate::sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellCoord {
    pub cx: usize,
    pub cy: usize,
}

impl CellCoord {
    pub fn new(cx: usize, cy: usize) -> Self {
        Self { cx, cy }
    }
}

/// Particle indices held by one grid cell, kept sorted and duplicate-free.
///
/// Sorted membership fixes the order forces are summed in, so a step gives
/// the same bits whichever thread migrated a particle first.
#[derive(Debug, Default, Clone)]
pub struct Cell {
    members: Vec<usize>,
}

impl Cell {
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, particle: usize) -> bool {
        self.members.binary_search(&particle).is_ok()
    }

    /// Returns `false` if the particle was already present.
    pub fn insert(&mut self, particle: usize) -> bool {
        match self.members.binary_search(&particle) {
            Ok(_) => false,
            Err(slot) => {
                self.members.insert(slot, particle);
                true
            }
        }
    }

    /// Returns `false` if the particle was not present.
    pub fn remove(&mut self, particle: usize) -> bool {
        match self.members.binary_search(&particle) {
            Ok(slot) => {
                self.members.remove(slot);
                true
            }
            Err(_) => false,
        }
    }

    fn clear(&mut self) {
        self.members.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupancy {
    pub occupied: usize,
    pub empty: usize,
    pub max: usize,
}

/// Reusable buffers for one cell's force evaluation.
#[derive(Debug, Default)]
pub struct NeighborScratch {
    members: Vec<usize>,
    candidates: Vec<usize>,
}

/// Uniform cell list over `[0, side]²` with cells as wide as the force cutoff.
///
/// Each cell sits behind its own lock: the force phase only reads, migration
/// takes a write lock around each removal and each insertion.
pub struct SpatialGrid {
    cells: Vec<RwLock<Cell>>,
    dim: usize,
    cell_size: f64,
    side: f64,
}

impl SpatialGrid {
    /// Empty grid. One extra row and column past `side / cell_size` keeps
    /// positions exactly on the far wall addressable.
    pub fn new(side: f64, cell_size: f64) -> Result<Self> {
        if !(side.is_finite() && side > 0.0) {
            return Err(Error::InvalidParam(format!(
                "domain side must be positive, got {side}"
            )));
        }
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(Error::InvalidParam(format!(
                "cell size must be positive, got {cell_size}"
            )));
        }
        let dim = (side / cell_size).floor() as usize + 1;
        Ok(Self {
            cells: (0..dim * dim).map(|_| RwLock::new(Cell::default())).collect(),
            dim,
            cell_size,
            side,
        })
    }

    pub fn build(particles: &[Particle], side: f64, cell_size: f64) -> Result<Self> {
        let mut grid = Self::new(side, cell_size)?;
        grid.rebuild(particles)?;
        Ok(grid)
    }

    /// Clears every cell and re-inserts every particle where it lies.
    pub fn rebuild(&mut self, particles: &[Particle]) -> Result<()> {
        for cell in &mut self.cells {
            cell.get_mut()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clear();
        }
        for (i, particle) in particles.iter().enumerate() {
            let coord = self.cell_of(i, &particle.position)?;
            self.insert(i, coord);
        }

        let occupancy = self.occupancy();
        debug!(
            "Grid {}x{} built for {} particles: {} occupied, {} empty, max {} per cell",
            self.dim,
            self.dim,
            particles.len(),
            occupancy.occupied,
            occupancy.empty,
            occupancy.max
        );
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn side(&self) -> f64 {
        self.side
    }

    /// Cell holding `position`. Anything outside `[0, side]²` means an
    /// integration bug and is reported, never clamped.
    pub fn cell_of(&self, particle: usize, position: &Position) -> Result<CellCoord> {
        let outside = || Error::OutsideDomain {
            particle,
            x: position.x,
            y: position.y,
            side: self.side,
        };
        let inside = |v: f64| v.is_finite() && (0.0..=self.side).contains(&v);
        if !inside(position.x) || !inside(position.y) {
            return Err(outside());
        }

        let cx = (position.x / self.cell_size).floor() as usize;
        let cy = (position.y / self.cell_size).floor() as usize;
        if cx >= self.dim || cy >= self.dim {
            return Err(outside());
        }
        Ok(CellCoord::new(cx, cy))
    }

    /// The 3x3 Moore neighbourhood of `coord`, clipped at the walls.
    pub fn neighbors_of(&self, coord: CellCoord) -> impl Iterator<Item = CellCoord> {
        let rows = coord.cy.saturating_sub(1)..=(coord.cy + 1).min(self.dim - 1);
        let cols = coord.cx.saturating_sub(1)..=(coord.cx + 1).min(self.dim - 1);
        rows.flat_map(move |cy| cols.clone().map(move |cx| CellCoord::new(cx, cy)))
    }

    /// Every cell in grid rows `rows`, row-major.
    pub fn coords_in_rows(
        &self,
        rows: std::ops::Range<usize>,
    ) -> impl Iterator<Item = CellCoord> + '_ {
        rows.flat_map(move |cy| (0..self.dim).map(move |cx| CellCoord::new(cx, cy)))
    }

    pub fn coords(&self) -> impl Iterator<Item = CellCoord> + '_ {
        self.coords_in_rows(0..self.dim)
    }

    pub fn cell(&self, coord: CellCoord) -> RwLockReadGuard<'_, Cell> {
        sync::read(&self.cells[self.flat(coord)])
    }

    pub fn insert(&self, particle: usize, coord: CellCoord) {
        sync::write(&self.cells[self.flat(coord)]).insert(particle);
    }

    pub fn remove(&self, particle: usize, coord: CellCoord) -> Result<()> {
        if sync::write(&self.cells[self.flat(coord)]).remove(particle) {
            Ok(())
        } else {
            Err(Error::GridDesync {
                particle,
                cell: (coord.cx, coord.cy),
            })
        }
    }

    /// Relocates `particle` from `from` to `to` in the live grid.
    pub fn move_if_needed(&self, particle: usize, from: CellCoord, to: CellCoord) -> Result<()> {
        if from == to {
            return Ok(());
        }
        self.remove(particle, from)?;
        self.insert(particle, to);
        Ok(())
    }

    /// Accelerations of every particle held by `coord`, from the cell itself
    /// and its Moore neighbours.
    ///
    /// Each particle starts from its stored acceleration; `emit` receives the
    /// index and the accumulated total.
    pub fn cell_accelerations<S>(
        &self,
        coord: CellCoord,
        store: &S,
        physics: &PhysicsSettings,
        scratch: &mut NeighborScratch,
        mut emit: impl FnMut(usize, Acceleration),
    ) where
        S: ParticleLookup + ?Sized,
    {
        scratch.members.clear();
        scratch
            .members
            .extend_from_slice(self.cell(coord).members());
        if scratch.members.is_empty() {
            return;
        }

        scratch.candidates.clear();
        for neighbor in self.neighbors_of(coord) {
            scratch
                .candidates
                .extend_from_slice(self.cell(neighbor).members());
        }

        for &i in &scratch.members {
            let mut probe = *store.particle(i);
            for &j in &scratch.candidates {
                if j != i {
                    apply_force(&mut probe, store.particle(j), physics);
                }
            }
            emit(i, probe.acceleration);
        }
    }

    /// Checks that every particle is held by exactly the cell its position
    /// maps to.
    pub fn verify<S>(&self, store: &S, n: usize) -> Result<()>
    where
        S: ParticleLookup + ?Sized,
    {
        for i in 0..n {
            let coord = self.cell_of(i, &store.particle(i).position)?;
            if !self.cell(coord).contains(i) {
                return Err(Error::GridDesync {
                    particle: i,
                    cell: (coord.cx, coord.cy),
                });
            }
        }
        let held: usize = self.cells.iter().map(|cell| sync::read(cell).len()).sum();
        if held != n {
            return Err(Error::GridOccupancy { held, expected: n });
        }
        Ok(())
    }

    pub fn occupancy(&self) -> Occupancy {
        let mut occupancy = Occupancy {
            occupied: 0,
            empty: 0,
            max: 0,
        };
        for cell in &self.cells {
            let len = sync::read(cell).len();
            if len == 0 {
                occupancy.empty += 1;
            } else {
                occupancy.occupied += 1;
            }
            occupancy.max = occupancy.max.max(len);
        }
        occupancy
    }

    fn flat(&self, coord: CellCoord) -> usize {
        coord.cy * self.dim + coord.cx
    }
}
