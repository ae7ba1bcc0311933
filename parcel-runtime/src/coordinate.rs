//! Grid coordinate scalars and path traversal.
//!
//! A coordinate packs a 2D cell position into one unsigned scalar:
//! `x` in the high 32 bits, `y` in the low 32. The grid is toroidal:
//! stepping off an edge wraps to the opposite edge on that axis.

use alloy::primitives::U256;
use tracing::warn;

use crate::config::GridConfig;
use crate::path::{Direction, PathDecoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate(u64);

impl Coordinate {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn from_xy(x: u64, y: u64) -> Self {
        debug_assert!(
            x >> 32 == 0 && y >> 32 == 0,
            "cell position must fit 32 bits per axis"
        );
        Self((x << 32) | y)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn x(&self) -> u64 {
        self.0 >> 32
    }

    pub fn y(&self) -> u64 {
        self.0 & 0xFFFF_FFFF
    }

    /// Entity id: decimal string of the scalar.
    pub fn id(&self) -> String {
        self.0.to_string()
    }

    /// Step one cell in `dir`, wrapping at the configured edges.
    pub fn traverse(self, dir: Direction, grid: &GridConfig) -> Coordinate {
        let (x, y) = (self.x(), self.y());
        let (x, y) = match dir {
            Direction::North => (x, (y + 1) % grid.lat_cells),
            Direction::South => (x, (y + grid.lat_cells - 1) % grid.lat_cells),
            Direction::East => ((x + 1) % grid.lng_cells, y),
            Direction::West => ((x + grid.lng_cells - 1) % grid.lng_cells, y),
        };
        Coordinate::from_xy(x, y)
    }
}

/// Result of walking a parcel's encoded path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalOutcome {
    /// Visited cells in emission order, origin first. Ordering defines
    /// the exterior-ring order of the resulting geometry.
    pub cells: Vec<Coordinate>,
    /// True if the step cap was hit before the path was exhausted.
    pub truncated: bool,
}

/// Walk the encoded path from `origin`, emitting each visited cell.
///
/// An empty run list (or a zero-valued first run and nothing after it)
/// yields exactly the origin. `max_steps` bounds the emitted cell count
/// so malformed path data cannot hang the process; the partial result
/// is returned flagged instead.
pub fn traverse_path(
    origin: Coordinate,
    runs: &[U256],
    grid: &GridConfig,
    max_steps: usize,
) -> TraversalOutcome {
    let mut cells = vec![origin];
    let mut current = origin;
    let mut truncated = false;

    for dir in PathDecoder::new(runs) {
        if cells.len() >= max_steps {
            warn!(
                origin = origin.raw(),
                max_steps, "path traversal exceeded step cap, truncating geometry"
            );
            truncated = true;
            break;
        }
        current = current.traverse(dir, grid);
        cells.push(current);
    }

    TraversalOutcome { cells, truncated }
}
