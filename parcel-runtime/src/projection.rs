//! Grid-to-GPS projection and bounding-box folding.
//!
//! A fixed linear projection maps cell indices to degrees: longitude
//! spans 360° across `lng_cells`, latitude 180° across `lat_cells`.
//! With the default power-of-two dimensions every projected value is
//! exact in decimal, so point ids are stable.

use rust_decimal::Decimal;

use crate::config::GridConfig;
use crate::coordinate::Coordinate;

/// A projected GPS position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoPos {
    pub lon: Decimal,
    pub lat: Decimal,
}

/// Longitude of vertical grid line `x`.
pub fn lon_of(x: u64, grid: &GridConfig) -> Decimal {
    (Decimal::from(x) * Decimal::from(360u32) / Decimal::from(grid.lng_cells)
        - Decimal::from(180u32))
    .normalize()
}

/// Latitude of horizontal grid line `y`.
pub fn lat_of(y: u64, grid: &GridConfig) -> Decimal {
    (Decimal::from(y) * Decimal::from(180u32) / Decimal::from(grid.lat_cells)
        - Decimal::from(90u32))
    .normalize()
}

/// The four GPS corners of a cell, in BL, BR, TR, TL order.
pub fn cell_corners(coord: Coordinate, grid: &GridConfig) -> [GeoPos; 4] {
    let (x, y) = (coord.x(), coord.y());
    let west = lon_of(x, grid);
    let east = lon_of(x + 1, grid);
    let south = lat_of(y, grid);
    let north = lat_of(y + 1, grid);
    [
        GeoPos { lon: west, lat: south },
        GeoPos { lon: east, lat: south },
        GeoPos { lon: east, lat: north },
        GeoPos { lon: west, lat: north },
    ]
}

/// Running axis-aligned min/max fold over projected points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub north: Decimal,
    pub south: Decimal,
    pub east: Decimal,
    pub west: Decimal,
}

impl BoundingBox {
    pub fn from_point(pos: GeoPos) -> Self {
        Self {
            north: pos.lat,
            south: pos.lat,
            east: pos.lon,
            west: pos.lon,
        }
    }

    pub fn include(&mut self, pos: GeoPos) {
        if pos.lon < self.west {
            self.west = pos.lon;
        }
        if pos.lon > self.east {
            self.east = pos.lon;
        }
        if pos.lat < self.south {
            self.south = pos.lat;
        }
        if pos.lat > self.north {
            self.north = pos.lat;
        }
    }

    /// Exterior ring of the rectangle, closed: W,S → E,S → E,N → W,N → W,S.
    pub fn ring(&self) -> [GeoPos; 5] {
        [
            GeoPos { lon: self.west, lat: self.south },
            GeoPos { lon: self.east, lat: self.south },
            GeoPos { lon: self.east, lat: self.north },
            GeoPos { lon: self.west, lat: self.north },
            GeoPos { lon: self.west, lat: self.south },
        ]
    }
}

/// Fold the visited-cell set into a bounding box.
///
/// All four corners of every cell feed the fold. A degenerate
/// single-cell parcel (no moves) collapses to a zero-area box at the
/// cell's southwest corner.
pub fn bounding_box_of(cells: &[Coordinate], grid: &GridConfig) -> Option<BoundingBox> {
    let (first, rest) = cells.split_first()?;

    if rest.is_empty() {
        return Some(BoundingBox::from_point(cell_corners(*first, grid)[0]));
    }

    let mut bbox: Option<BoundingBox> = None;
    for cell in cells {
        for corner in cell_corners(*cell, grid) {
            match bbox.as_mut() {
                Some(b) => b.include(corner),
                None => bbox = Some(BoundingBox::from_point(corner)),
            }
        }
    }
    bbox
}

/// Bounding box of a rectangle claim: `lng_count` × `lat_count` cells
/// northeast of the southwest cell `sw`.
pub fn rect_bounding_box(
    sw: Coordinate,
    lat_count: u64,
    lng_count: u64,
    grid: &GridConfig,
) -> BoundingBox {
    BoundingBox {
        west: lon_of(sw.x(), grid),
        south: lat_of(sw.y(), grid),
        east: lon_of(sw.x() + lng_count, grid),
        north: lat_of(sw.y() + lat_count, grid),
    }
}
