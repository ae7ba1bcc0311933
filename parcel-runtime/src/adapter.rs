//! Version-spanning access to per-license chain state.
//!
//! [`VersionAdapter`] presents one bid-snapshot query over the two
//! incompatible interface generations: the unified (V2) query is tried
//! first; a revert falls back to the split (V1) query, whose positional
//! fields are remapped into the unified shape with a null content hash.
//! The fallback is evaluated independently per bid slot.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::entities::BidSnapshot;
use crate::error::{ChainError, IndexerError};

/// Which bid pointer of a license is being queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BidSlot {
    Current,
    Pending,
}

/// Which claim generation produced a parcel, selecting the registry
/// read shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClaimVersion {
    V1,
    V2,
}

/// Raw result of the unified (V2) bid query.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedBid {
    pub timestamp: U256,
    pub bidder: Address,
    pub contribution_rate: U256,
    pub per_second_fee_numerator: U256,
    pub per_second_fee_denominator: U256,
    pub for_sale_price: U256,
    pub content_hash: Bytes,
}

/// Raw result of a split (V1) bid query. No content hash exists in
/// this generation.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitBid {
    pub timestamp: U256,
    pub bidder: Address,
    pub contribution_rate: U256,
    pub per_second_fee_numerator: U256,
    pub per_second_fee_denominator: U256,
    pub for_sale_price: U256,
}

/// A bid read tagged with the interface generation that served it.
#[derive(Debug, Clone, PartialEq)]
pub enum VersionedBid {
    V1(SplitBid),
    V2(UnifiedBid),
}

impl VersionedBid {
    /// Remap into the unified snapshot shape.
    pub fn into_snapshot(self) -> BidSnapshot {
        match self {
            VersionedBid::V2(raw) => BidSnapshot {
                timestamp: raw.timestamp,
                bidder: raw.bidder,
                contribution_rate: raw.contribution_rate,
                per_second_fee_numerator: raw.per_second_fee_numerator,
                per_second_fee_denominator: raw.per_second_fee_denominator,
                for_sale_price: raw.for_sale_price,
                content_hash: if raw.content_hash.is_empty() {
                    None
                } else {
                    Some(format!("0x{}", hex::encode(&raw.content_hash)))
                },
            },
            VersionedBid::V1(raw) => BidSnapshot {
                timestamp: raw.timestamp,
                bidder: raw.bidder,
                contribution_rate: raw.contribution_rate,
                per_second_fee_numerator: raw.per_second_fee_numerator,
                per_second_fee_denominator: raw.per_second_fee_denominator,
                for_sale_price: raw.for_sale_price,
                content_hash: None,
            },
        }
    }
}

/// Geometry payload of a claim read.
#[derive(Debug, Clone, PartialEq)]
pub enum ParcelShape {
    /// Origin scalar plus ordered path runs (V1 claims).
    Path { origin: u64, runs: Vec<U256> },
    /// Southwest scalar plus cell counts per axis (V2 claims).
    Rect {
        sw: u64,
        lat_count: u64,
        lng_count: u64,
    },
}

/// Everything a claim handler needs from the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimInfo {
    /// Freshly deployed per-license contract address.
    pub diamond: Address,
    pub shape: ParcelShape,
}

/// Synchronous chain-state reads the indexer depends on. Reverts are
/// reported as [`ChainError::Reverted`], everything else as
/// [`ChainError::Transport`].
#[async_trait]
pub trait LicenseSource: Send + Sync {
    async fn unified_bid(&self, diamond: Address, slot: BidSlot) -> Result<UnifiedBid, ChainError>;

    async fn split_bid(&self, diamond: Address, slot: BidSlot) -> Result<SplitBid, ChainError>;

    async fn claim_info(
        &self,
        license_id: U256,
        version: ClaimVersion,
    ) -> Result<ClaimInfo, ChainError>;
}

/// Unified query surface over both interface generations.
#[derive(Clone)]
pub struct VersionAdapter {
    source: Arc<dyn LicenseSource>,
}

impl VersionAdapter {
    pub fn new(source: Arc<dyn LicenseSource>) -> Self {
        Self { source }
    }

    /// Read one bid slot of a license, unified across generations.
    ///
    /// Returns `Ok(None)` when both generations revert, a recoverable
    /// null-state, not a failure. Transport errors propagate.
    pub async fn bid_snapshot(
        &self,
        diamond: Address,
        slot: BidSlot,
    ) -> Result<Option<BidSnapshot>, IndexerError> {
        match self.source.unified_bid(diamond, slot).await {
            Ok(raw) => Ok(Some(VersionedBid::V2(raw).into_snapshot())),
            Err(ChainError::Reverted(reason)) => {
                debug!(
                    diamond = %diamond,
                    ?slot,
                    reason,
                    "unified bid query reverted, falling back to split interface"
                );
                match self.source.split_bid(diamond, slot).await {
                    Ok(raw) => Ok(Some(VersionedBid::V1(raw).into_snapshot())),
                    Err(ChainError::Reverted(reason)) => {
                        warn!(
                            diamond = %diamond,
                            ?slot,
                            reason,
                            "both interface generations reverted, treating bid state as absent"
                        );
                        Ok(None)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Content hash for one bid slot, `None` when unsupported.
    pub async fn content_hash(
        &self,
        diamond: Address,
        slot: BidSlot,
    ) -> Result<Option<String>, IndexerError> {
        Ok(self
            .bid_snapshot(diamond, slot)
            .await?
            .and_then(|snap| snap.content_hash))
    }

    /// Registry read for a freshly claimed parcel. Claims are expected
    /// to resolve, so any failure aborts the event.
    pub async fn claim_info(
        &self,
        license_id: U256,
        version: ClaimVersion,
    ) -> Result<ClaimInfo, IndexerError> {
        Ok(self.source.claim_info(license_id, version).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLicenseSource;

    fn diamond() -> Address {
        "0x00000000000000000000000000000000000000dd".parse().unwrap()
    }

    fn bidder() -> Address {
        "0x0000000000000000000000000000000000000bbb".parse().unwrap()
    }

    fn unified(hash: &[u8]) -> UnifiedBid {
        UnifiedBid {
            timestamp: U256::from(100),
            bidder: bidder(),
            contribution_rate: U256::from(3),
            per_second_fee_numerator: U256::from(1),
            per_second_fee_denominator: U256::from(10),
            for_sale_price: U256::from(5000),
            content_hash: Bytes::copy_from_slice(hash),
        }
    }

    fn split() -> SplitBid {
        SplitBid {
            timestamp: U256::from(90),
            bidder: bidder(),
            contribution_rate: U256::from(2),
            per_second_fee_numerator: U256::from(1),
            per_second_fee_denominator: U256::from(10),
            for_sale_price: U256::from(4000),
        }
    }

    #[tokio::test]
    async fn test_unified_query_served_directly() {
        let source = MockLicenseSource::new();
        source.set_unified(diamond(), BidSlot::Current, unified(&[0xab, 0xcd]));

        let adapter = VersionAdapter::new(Arc::new(source));
        let snap = adapter
            .bid_snapshot(diamond(), BidSlot::Current)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snap.for_sale_price, U256::from(5000));
        assert_eq!(snap.content_hash.as_deref(), Some("0xabcd"));
    }

    #[tokio::test]
    async fn test_fallback_remaps_split_fields() {
        let source = MockLicenseSource::new();
        source.set_split(diamond(), BidSlot::Current, split());

        let adapter = VersionAdapter::new(Arc::new(source));
        let snap = adapter
            .bid_snapshot(diamond(), BidSlot::Current)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snap.timestamp, U256::from(90));
        assert_eq!(snap.for_sale_price, U256::from(4000));
        assert_eq!(snap.content_hash, None);
    }

    #[tokio::test]
    async fn test_fallback_independent_per_slot() {
        let source = MockLicenseSource::new();
        source.set_unified(diamond(), BidSlot::Current, unified(&[]));
        source.set_split(diamond(), BidSlot::Pending, split());

        let adapter = VersionAdapter::new(Arc::new(source));
        let current = adapter
            .bid_snapshot(diamond(), BidSlot::Current)
            .await
            .unwrap()
            .unwrap();
        let pending = adapter
            .bid_snapshot(diamond(), BidSlot::Pending)
            .await
            .unwrap()
            .unwrap();
        // Empty on-chain content hash reads back as absent.
        assert_eq!(current.content_hash, None);
        assert_eq!(current.for_sale_price, U256::from(5000));
        assert_eq!(pending.for_sale_price, U256::from(4000));
    }

    #[tokio::test]
    async fn test_both_generations_reverting_is_null_state() {
        let source = MockLicenseSource::new();
        let adapter = VersionAdapter::new(Arc::new(source));
        let snap = adapter
            .bid_snapshot(diamond(), BidSlot::Current)
            .await
            .unwrap();
        assert!(snap.is_none());
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let source = MockLicenseSource::new();
        source.fail_transport();

        let adapter = VersionAdapter::new(Arc::new(source));
        let result = adapter.bid_snapshot(diamond(), BidSlot::Current).await;
        assert!(matches!(
            result,
            Err(IndexerError::Chain(ChainError::Transport(_)))
        ));
    }
}
