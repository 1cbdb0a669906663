use std::panic::Location;
use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can stop a simulation run.
///
/// Invariant violations (`OutsideDomain`, `GridDesync`) end the run; positions
/// are never clamped back into the domain.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid user or API parameter.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Settings file could not be read or parsed.
    #[error("failed to load settings from {}: {detail}", path.display())]
    Config { path: PathBuf, detail: String },

    /// A particle position maps outside the grid.
    #[error("particle {particle} at ({x}, {y}) lies outside the [0, {side}] domain")]
    OutsideDomain {
        particle: usize,
        x: f64,
        y: f64,
        side: f64,
    },

    /// The grid no longer agrees with particle positions.
    #[error("grid out of sync: particle {particle} not held by cell ({}, {})", cell.0, cell.1)]
    GridDesync { particle: usize, cell: (usize, usize) },

    /// Total cell membership disagrees with the particle count.
    #[error("grid holds {held} references for {expected} particles")]
    GridOccupancy { held: usize, expected: usize },

    /// Worker thread setup or teardown failed.
    #[error("FAILURE in {operation} at {}:{}: {detail}", location.file(), location.line())]
    Threading {
        operation: &'static str,
        location: &'static Location<'static>,
        detail: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds a threading error stamped with the caller's source location.
    #[track_caller]
    pub fn threading(operation: &'static str, detail: impl Into<String>) -> Self {
        Error::Threading {
            operation,
            location: Location::caller(),
            detail: detail.into(),
        }
    }
}
