//! Derived-dataset entity rows.
//!
//! Every entity id is a pure function of the inputs visible in the
//! triggering event (plus, for bids, the current on-chain payer). Rows
//! are never re-keyed in place: a change of "who" writes a new row and
//! repoints a reference.

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Entity types stored in the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Parcel,
    GridCoordinate,
    GeoPoint,
    Bid,
    Bidder,
    License,
}

/// Lowercase hex id for an address, `0x`-prefixed.
pub fn address_id(addr: &Address) -> String {
    format!("0x{}", hex::encode(addr))
}

/// Composite bid id: `{bidder}-{licenseId}`. Changes identity when the
/// bidder changes; old rows stay behind as history.
pub fn bid_id(bidder: &Address, license_id: U256) -> String {
    format!("{}-{}", address_id(bidder), license_id)
}

/// Parcel id: decimal string of the license token id.
pub fn parcel_id(license_id: U256) -> String {
    license_id.to_string()
}

/// GeoPoint id: `{lon};{lat}`, shared across cells touching the corner.
pub fn point_id(lon: Decimal, lat: Decimal) -> String {
    format!("{lon};{lat}")
}

/// A licensed region on the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub id: String,
    pub geometry: ParcelGeometry,
    /// Per-license contract instance governing this parcel's auction.
    pub license_diamond: Option<String>,
    pub owner: Option<String>,
    pub content_hash: Option<String>,
    pub created_at_block: u64,
    pub current_bid: Option<String>,
    pub pending_bid: Option<String>,
    /// Set when the traversal step cap was hit and the geometry below
    /// covers only a prefix of the encoded path.
    #[serde(default)]
    pub geometry_incomplete: bool,
}

impl Parcel {
    /// Skeleton row for a license first referenced by a non-claim event.
    pub fn skeleton(id: String, block: u64) -> Self {
        Self {
            id,
            geometry: ParcelGeometry::default(),
            license_diamond: None,
            owner: None,
            content_hash: None,
            created_at_block: block,
            current_bid: None,
            pending_bid: None,
            geometry_incomplete: false,
        }
    }
}

/// Parcel geometry: either the ordered visited-cell list or an
/// axis-aligned bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParcelGeometry {
    Coordinates {
        /// Ordered cell ids, in exterior-ring order of the parcel.
        ids: Vec<String>,
    },
    BoundingBox {
        north: Decimal,
        south: Decimal,
        east: Decimal,
        west: Decimal,
    },
}

impl Default for ParcelGeometry {
    fn default() -> Self {
        ParcelGeometry::Coordinates { ids: Vec::new() }
    }
}

/// One visited grid cell, shared across events that retraverse it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCoordinate {
    /// Decimal string of the coordinate scalar.
    pub id: String,
    pub point_bl: String,
    pub point_br: String,
    pub point_tr: String,
    pub point_tl: String,
    pub parcel: String,
    pub created_at_block: u64,
}

/// A GPS corner point, deduplicated by `{lon};{lat}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub id: String,
    pub lon: Decimal,
    pub lat: Decimal,
}

/// An auction offer on a license. Superseded rows are unreferenced, not
/// deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: String,
    pub timestamp: U256,
    pub bidder: String,
    pub contribution_rate: U256,
    pub per_second_fee_numerator: U256,
    pub per_second_fee_denominator: U256,
    pub for_sale_price: U256,
    pub content_hash: Option<String>,
    pub parcel: String,
}

/// Existence-only marker for an address that has ever bid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bidder {
    pub id: String,
}

/// Legacy ERC-721 license row (older schema generations kept this
/// separate from the parcel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub id: String,
    pub owner: Option<String>,
    pub value: Option<U256>,
    pub expiration_timestamp: Option<U256>,
    pub root_cid: Option<String>,
}

impl License {
    pub fn new(id: String) -> Self {
        Self {
            id,
            owner: None,
            value: None,
            expiration_timestamp: None,
            root_cid: None,
        }
    }
}

/// Unified per-slot bid state read from chain, independent of which
/// interface generation served it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidSnapshot {
    pub timestamp: U256,
    pub bidder: Address,
    pub contribution_rate: U256,
    pub per_second_fee_numerator: U256,
    pub per_second_fee_denominator: U256,
    pub for_sale_price: U256,
    /// Always `None` when served by the split (V1) interface.
    pub content_hash: Option<String>,
}

impl BidSnapshot {
    /// Materialize this snapshot as a bid row for the given license.
    pub fn into_bid(self, license_id: U256, parcel: &str) -> Bid {
        Bid {
            id: bid_id(&self.bidder, license_id),
            timestamp: self.timestamp,
            bidder: address_id(&self.bidder),
            contribution_rate: self.contribution_rate,
            per_second_fee_numerator: self.per_second_fee_numerator,
            per_second_fee_denominator: self.per_second_fee_denominator,
            for_sale_price: self.for_sale_price,
            content_hash: self.content_hash,
            parcel: parcel.to_string(),
        }
    }
}
