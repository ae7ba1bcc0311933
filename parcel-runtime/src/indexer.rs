//! Event dispatch and per-event atomicity.
//!
//! The [`Indexer`] consumes one ordered event log and applies each
//! event as a single repository write batch: either every row the
//! handler staged lands, or none do. Replaying a prefix of the log
//! always yields the same dataset.
//!
//! Claims and transfers are emitted by the registry contracts and carry
//! their license id. Bid-lifecycle events are emitted by the
//! per-license instance deployed at claim time and carry none; the
//! indexer keeps an address → license routing table, extended on every
//! claim, and asks the host to deliver that instance's logs via the
//! [`InstanceRegistry`] seam.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tracing::{debug, info, warn};

use crate::adapter::{ClaimVersion, ParcelShape, VersionAdapter};
use crate::config::{GeometryMode, IndexerConfig};
use crate::coordinate::{traverse_path, Coordinate};
use crate::entities::{
    address_id, parcel_id, point_id, EntityKind, GeoPoint, GridCoordinate, Parcel, ParcelGeometry,
};
use crate::error::IndexerError;
use crate::events::{Event, EventKind, EventMeta};
use crate::projection::{bounding_box_of, cell_corners, rect_bounding_box, BoundingBox};
use crate::reconciler::Reconciler;
use crate::repo::{EntityRepository, EventTxn};

/// Contract generation of a freshly deployed per-license instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    LicenseDiamondV1,
    LicenseDiamondV2,
}

/// Host seam for dynamic log sources. Called once per claim with the
/// address of the instance whose future logs the host must deliver.
pub trait InstanceRegistry: Send + Sync {
    fn register_instance(&self, address: Address, kind: InstanceKind, license_id: U256);
}

/// Registry for hosts that already deliver every relevant log.
pub struct LoggingRegistry;

impl InstanceRegistry for LoggingRegistry {
    fn register_instance(&self, address: Address, kind: InstanceKind, license_id: U256) {
        info!(address = %address, ?kind, license = %license_id, "instance registered");
    }
}

/// What [`Indexer::apply`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The event came from an address with no known route and was
    /// dropped without touching the dataset.
    SkippedUnrouted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: u64,
    pub skipped: u64,
    pub failed: u64,
}

pub struct Indexer {
    config: IndexerConfig,
    adapter: VersionAdapter,
    repo: Box<dyn EntityRepository>,
    registry: Arc<dyn InstanceRegistry>,
    routes: HashMap<Address, U256>,
    cursor: Option<(u64, u64)>,
}

impl Indexer {
    pub fn new(
        config: IndexerConfig,
        adapter: VersionAdapter,
        repo: Box<dyn EntityRepository>,
        registry: Arc<dyn InstanceRegistry>,
    ) -> Self {
        Self {
            config,
            adapter,
            repo,
            registry,
            routes: HashMap::new(),
            cursor: None,
        }
    }

    pub fn repo(&self) -> &dyn EntityRepository {
        self.repo.as_ref()
    }

    /// Apply one event atomically.
    ///
    /// On error nothing the handler staged reaches the repository; the
    /// host decides whether to retry or skip, and routes and cursor are
    /// only advanced on success.
    pub async fn apply(&mut self, event: &Event) -> Result<ApplyOutcome, IndexerError> {
        if let Some(cursor) = self.cursor {
            if event.meta.position() <= cursor {
                warn!(
                    block = event.meta.block_number,
                    log_index = event.meta.log_index,
                    "event at or before cursor, applying idempotently"
                );
            }
        }

        let mut txn = EventTxn::new(self.repo.as_ref());
        let mut registration: Option<(Address, InstanceKind, U256)> = None;
        let meta = &event.meta;

        match event.kind.clone() {
            EventKind::ParcelClaimed { license_id } => {
                let (diamond, kind) = Self::claim(
                    &self.config,
                    &self.adapter,
                    &mut txn,
                    license_id,
                    ClaimVersion::V1,
                    meta,
                )
                .await?;
                registration = Some((diamond, kind, license_id));
            }
            EventKind::ParcelClaimedV2 { license_id } => {
                let (diamond, kind) = Self::claim(
                    &self.config,
                    &self.adapter,
                    &mut txn,
                    license_id,
                    ClaimVersion::V2,
                    meta,
                )
                .await?;
                registration = Some((diamond, kind, license_id));
            }
            EventKind::BidChanged => {
                let Some(license_id) = Self::route(&self.routes, meta) else {
                    return Ok(ApplyOutcome::SkippedUnrouted);
                };
                Reconciler::new(&mut txn, &self.adapter)
                    .bid_changed(license_id, meta.address, meta)
                    .await?;
            }
            EventKind::TransferTriggered { bidder } | EventKind::BidAccepted { bidder } => {
                let Some(license_id) = Self::route(&self.routes, meta) else {
                    return Ok(ApplyOutcome::SkippedUnrouted);
                };
                debug!(bidder = %bidder, license = %license_id, "pending bid promoted");
                Reconciler::new(&mut txn, &self.adapter)
                    .promote_pending(license_id, meta)
                    .await?;
            }
            EventKind::LicenseReclaimed => {
                let Some(license_id) = Self::route(&self.routes, meta) else {
                    return Ok(ApplyOutcome::SkippedUnrouted);
                };
                Reconciler::new(&mut txn, &self.adapter)
                    .reclaimed(license_id, meta.address, meta)
                    .await?;
            }
            EventKind::PayerContributionRateUpdated {
                payer,
                contribution_rate,
            } => {
                let Some(license_id) = Self::route(&self.routes, meta) else {
                    return Ok(ApplyOutcome::SkippedUnrouted);
                };
                Reconciler::new(&mut txn, &self.adapter)
                    .contribution_rate_updated(license_id, meta.address, payer, contribution_rate, meta)
                    .await?;
            }
            EventKind::PayerForSalePriceUpdated {
                payer,
                for_sale_price,
            } => {
                let Some(license_id) = Self::route(&self.routes, meta) else {
                    return Ok(ApplyOutcome::SkippedUnrouted);
                };
                Reconciler::new(&mut txn, &self.adapter)
                    .for_sale_price_updated(license_id, meta.address, payer, for_sale_price, meta)
                    .await?;
            }
            EventKind::PayerContentHashUpdated { payer } => {
                let Some(license_id) = Self::route(&self.routes, meta) else {
                    return Ok(ApplyOutcome::SkippedUnrouted);
                };
                Reconciler::new(&mut txn, &self.adapter)
                    .content_hash_updated(license_id, meta.address, payer, meta)
                    .await?;
            }
            EventKind::Transfer { to, token_id } => {
                Reconciler::new(&mut txn, &self.adapter)
                    .ownership_transferred(token_id, to, meta)?;
            }
            EventKind::LicenseInfoUpdated {
                license_id,
                value,
                expiration_timestamp,
            } => {
                Reconciler::new(&mut txn, &self.adapter).license_info_updated(
                    license_id,
                    value,
                    expiration_timestamp,
                )?;
            }
            EventKind::RootContentCidUpdated { token_id, root_cid } => {
                Reconciler::new(&mut txn, &self.adapter).root_cid_updated(token_id, root_cid)?;
            }
            EventKind::RootContentCidRemoved { token_id } => {
                Reconciler::new(&mut txn, &self.adapter).root_cid_removed(token_id)?;
            }
        }

        let batch = txn.into_batch();
        self.repo.apply(batch)?;

        if let Some((address, kind, license_id)) = registration {
            self.registry.register_instance(address, kind, license_id);
            self.routes.insert(address, license_id);
        }
        self.cursor = Some(event.meta.position());
        Ok(ApplyOutcome::Applied)
    }

    /// Replay an ordered event log front to back. Failed events are
    /// counted and skipped; every applied event landed atomically.
    pub async fn replay(&mut self, events: &[Event]) -> ReplaySummary {
        let mut summary = ReplaySummary::default();
        for event in events {
            match self.apply(event).await {
                Ok(ApplyOutcome::Applied) => summary.applied += 1,
                Ok(ApplyOutcome::SkippedUnrouted) => summary.skipped += 1,
                Err(e) => {
                    warn!(
                        block = event.meta.block_number,
                        log_index = event.meta.log_index,
                        error = %e,
                        "event aborted"
                    );
                    summary.failed += 1;
                }
            }
        }
        info!(
            applied = summary.applied,
            skipped = summary.skipped,
            failed = summary.failed,
            "replay complete"
        );
        summary
    }

    fn route(routes: &HashMap<Address, U256>, meta: &EventMeta) -> Option<U256> {
        let license = routes.get(&meta.address).copied();
        if license.is_none() {
            warn!(address = %meta.address, "no route for emitting instance, skipping event");
        }
        license
    }

    /// Handle a claim: read geometry and the instance address from the
    /// registry, persist the parcel and its derived geometry rows.
    ///
    /// Geometry is a pure function of the claim inputs, so reprocessing
    /// a claim rewrites byte-identical rows.
    async fn claim(
        config: &IndexerConfig,
        adapter: &VersionAdapter,
        txn: &mut EventTxn<'_>,
        license_id: U256,
        version: ClaimVersion,
        meta: &EventMeta,
    ) -> Result<(Address, InstanceKind), IndexerError> {
        let info = adapter.claim_info(license_id, version).await?;
        let pid = parcel_id(license_id);

        let mut parcel = txn
            .get::<Parcel>(EntityKind::Parcel, &pid)?
            .unwrap_or_else(|| Parcel::skeleton(pid.clone(), meta.block_number));
        parcel.license_diamond = Some(address_id(&info.diamond));
        parcel.content_hash = adapter
            .content_hash(info.diamond, crate::adapter::BidSlot::Current)
            .await?;

        match info.shape {
            ParcelShape::Path { origin, runs } => {
                let outcome = traverse_path(
                    Coordinate::new(origin),
                    &runs,
                    &config.grid,
                    config.max_traversal_steps,
                );
                parcel.geometry_incomplete = outcome.truncated;

                match config.geometry_mode {
                    GeometryMode::Full => {
                        let mut ids = Vec::with_capacity(outcome.cells.len());
                        for cell in &outcome.cells {
                            ids.push(Self::put_cell(config, txn, *cell, &pid, meta)?);
                        }
                        parcel.geometry = ParcelGeometry::Coordinates { ids };
                    }
                    GeometryMode::BoundingBox => {
                        // Nonempty: traversal always emits the origin.
                        let bbox = bounding_box_of(&outcome.cells, &config.grid)
                            .expect("traversal emits at least the origin");
                        Self::put_ring_points(txn, &bbox)?;
                        parcel.geometry = Self::bbox_geometry(&bbox);
                    }
                }
            }
            // Rectangle claims are a bounding box by construction, in
            // either geometry mode.
            ParcelShape::Rect {
                sw,
                lat_count,
                lng_count,
            } => {
                let bbox =
                    rect_bounding_box(Coordinate::new(sw), lat_count, lng_count, &config.grid);
                Self::put_ring_points(txn, &bbox)?;
                parcel.geometry = Self::bbox_geometry(&bbox);
            }
        }

        txn.put(EntityKind::Parcel, &pid, &parcel)?;

        let kind = match version {
            ClaimVersion::V1 => InstanceKind::LicenseDiamondV1,
            ClaimVersion::V2 => InstanceKind::LicenseDiamondV2,
        };
        Ok((info.diamond, kind))
    }

    /// Persist one visited cell and its four corner points, returning
    /// the cell's id. Corner points are shared across cells by id.
    fn put_cell(
        config: &IndexerConfig,
        txn: &mut EventTxn<'_>,
        cell: Coordinate,
        parcel: &str,
        meta: &EventMeta,
    ) -> Result<String, IndexerError> {
        let corners = cell_corners(cell, &config.grid);
        let mut corner_ids: [String; 4] = Default::default();
        for (slot, pos) in corner_ids.iter_mut().zip(corners) {
            let id = point_id(pos.lon, pos.lat);
            txn.put(
                EntityKind::GeoPoint,
                &id,
                &GeoPoint {
                    id: id.clone(),
                    lon: pos.lon,
                    lat: pos.lat,
                },
            )?;
            *slot = id;
        }

        let [bl, br, tr, tl] = corner_ids;
        let id = cell.id();
        txn.put(
            EntityKind::GridCoordinate,
            &id,
            &GridCoordinate {
                id: id.clone(),
                point_bl: bl,
                point_br: br,
                point_tr: tr,
                point_tl: tl,
                parcel: parcel.to_string(),
                created_at_block: meta.block_number,
            },
        )?;
        Ok(id)
    }

    /// Persist the four distinct ring corners of a bounding box.
    fn put_ring_points(txn: &mut EventTxn<'_>, bbox: &BoundingBox) -> Result<(), IndexerError> {
        for pos in &bbox.ring()[..4] {
            let id = point_id(pos.lon, pos.lat);
            txn.put(
                EntityKind::GeoPoint,
                &id,
                &GeoPoint {
                    id: id.clone(),
                    lon: pos.lon,
                    lat: pos.lat,
                },
            )?;
        }
        Ok(())
    }

    fn bbox_geometry(bbox: &BoundingBox) -> ParcelGeometry {
        ParcelGeometry::BoundingBox {
            north: bbox.north,
            south: bbox.south,
            east: bbox.east,
            west: bbox.west,
        }
    }
}
