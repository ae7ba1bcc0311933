//! Indexer configuration.
//!
//! Grid dimensions have changed across schema generations, so they are
//! configuration rather than literals. All values load from environment
//! variables with defaults matching the current generation.

use serde::{Deserialize, Serialize};

/// Dimensions of the toroidal grid, in cells per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Longitude cells (360 degrees of longitude split this many ways).
    pub lng_cells: u64,
    /// Latitude cells (180 degrees of latitude split this many ways).
    pub lat_cells: u64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            lng_cells: 1 << 23,
            lat_cells: 1 << 22,
        }
    }
}

/// How claimed-parcel geometry is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryMode {
    /// Persist every visited cell and corner point, plus the ordered
    /// cell-id list on the parcel.
    Full,
    /// Fold visited cells into an axis-aligned bounding box and persist
    /// only the rectangle.
    BoundingBox,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    pub grid: GridConfig,
    pub geometry_mode: GeometryMode,
    /// Upper bound on coordinates emitted by one traversal. The trusted
    /// path format always terminates; this guards against malformed data.
    pub max_traversal_steps: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            geometry_mode: GeometryMode::BoundingBox,
            max_traversal_steps: 1_000_000,
        }
    }
}

impl IndexerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn load() -> Self {
        let defaults = Self::default();

        // A zero-cell axis has no valid coordinates, so treat it like
        // any other unparsable value.
        let lng_cells = std::env::var("PARCEL_GRID_LNG_CELLS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&cells: &u64| cells > 0)
            .unwrap_or(defaults.grid.lng_cells);

        let lat_cells = std::env::var("PARCEL_GRID_LAT_CELLS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&cells: &u64| cells > 0)
            .unwrap_or(defaults.grid.lat_cells);

        let geometry_mode = match std::env::var("PARCEL_GEOMETRY_MODE").as_deref() {
            Ok("full") => GeometryMode::Full,
            Ok("bounding_box") => GeometryMode::BoundingBox,
            _ => defaults.geometry_mode,
        };

        let max_traversal_steps = std::env::var("PARCEL_MAX_TRAVERSAL_STEPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_traversal_steps);

        Self {
            grid: GridConfig {
                lng_cells,
                lat_cells,
            },
            geometry_mode,
            max_traversal_steps,
        }
    }
}
