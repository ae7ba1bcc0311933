//! Per-license bid reconciliation.
//!
//! Each license moves through `Unclaimed → Claimed → Active`; the
//! reconciler keeps the parcel's current/pending bid pointers and the
//! referenced bid rows consistent as lifecycle events arrive. Adapter
//! failures inside a transition degrade the affected optional fields
//! instead of aborting it; superseded bid rows are left behind as
//! history, never deleted.

use alloy::primitives::{Address, U256};
use tracing::{debug, warn};

use crate::adapter::{BidSlot, VersionAdapter};
use crate::entities::{
    address_id, bid_id, parcel_id, Bid, Bidder, EntityKind, License, Parcel,
};
use crate::error::IndexerError;
use crate::events::EventMeta;
use crate::repo::EventTxn;

pub struct Reconciler<'a, 'r> {
    txn: &'a mut EventTxn<'r>,
    adapter: &'a VersionAdapter,
}

impl<'a, 'r> Reconciler<'a, 'r> {
    pub fn new(txn: &'a mut EventTxn<'r>, adapter: &'a VersionAdapter) -> Self {
        Self { txn, adapter }
    }

    /// Generic bid-change signal: re-read both slots from chain and
    /// repoint the parcel at whatever came back. A slot whose read
    /// degrades to null-state keeps its previous pointer rather than
    /// dropping it: the stale pointer still names a real prior bid,
    /// and a later successful refresh overwrites it.
    pub async fn bid_changed(
        &mut self,
        license_id: U256,
        diamond: Address,
        meta: &EventMeta,
    ) -> Result<(), IndexerError> {
        let mut parcel = self.get_or_create_parcel(license_id, Some(diamond), meta)?;

        match self.refresh_slot(license_id, &parcel.id, diamond, BidSlot::Current).await? {
            Some(id) => parcel.current_bid = Some(id),
            None => warn!(parcel = %parcel.id, "current-bid refresh unavailable, keeping pointer"),
        }
        match self.refresh_slot(license_id, &parcel.id, diamond, BidSlot::Pending).await? {
            Some(id) => parcel.pending_bid = Some(id),
            None => warn!(parcel = %parcel.id, "pending-bid refresh unavailable, keeping pointer"),
        }

        self.put_parcel(&parcel)
    }

    /// `PayerContributionRateUpdated`: overwrite only the event time and
    /// rate on the payer-keyed current bid, refresh the content hash.
    pub async fn contribution_rate_updated(
        &mut self,
        license_id: U256,
        diamond: Address,
        payer: Address,
        contribution_rate: U256,
        meta: &EventMeta,
    ) -> Result<(), IndexerError> {
        let mut bid = self.load_or_seed_current_bid(license_id, diamond, payer).await?;
        bid.timestamp = U256::from(meta.timestamp);
        bid.contribution_rate = contribution_rate;
        self.finish_payer_update(license_id, diamond, bid, meta).await
    }

    /// `PayerForSalePriceUpdated`: same shape as the rate update, for
    /// the sale price.
    pub async fn for_sale_price_updated(
        &mut self,
        license_id: U256,
        diamond: Address,
        payer: Address,
        for_sale_price: U256,
        meta: &EventMeta,
    ) -> Result<(), IndexerError> {
        let mut bid = self.load_or_seed_current_bid(license_id, diamond, payer).await?;
        bid.timestamp = U256::from(meta.timestamp);
        bid.for_sale_price = for_sale_price;
        self.finish_payer_update(license_id, diamond, bid, meta).await
    }

    /// `PayerContentHashUpdated`: content hash comes from a fresh
    /// adapter query only, with no timestamp or amount change.
    pub async fn content_hash_updated(
        &mut self,
        license_id: U256,
        diamond: Address,
        payer: Address,
        meta: &EventMeta,
    ) -> Result<(), IndexerError> {
        let bid = self.load_or_seed_current_bid(license_id, diamond, payer).await?;
        self.finish_payer_update(license_id, diamond, bid, meta).await
    }

    /// `TransferTriggered` / `BidAccepted`: promote the pending bid by
    /// pointer relabel. Deliberately no re-fetch: the promoted bid's
    /// numeric fields keep their last explicitly written values.
    pub async fn promote_pending(
        &mut self,
        license_id: U256,
        meta: &EventMeta,
    ) -> Result<(), IndexerError> {
        let mut parcel = self.get_or_create_parcel(license_id, None, meta)?;
        debug!(
            parcel = %parcel.id,
            pending = ?parcel.pending_bid,
            "promoting pending bid pointer without snapshot refresh"
        );
        parcel.current_bid = parcel.pending_bid.take();
        self.put_parcel(&parcel)
    }

    /// `LicenseReclaimed`: refresh the current bid keyed by the current
    /// payer, clear the pending pointer.
    pub async fn reclaimed(
        &mut self,
        license_id: U256,
        diamond: Address,
        meta: &EventMeta,
    ) -> Result<(), IndexerError> {
        let mut parcel = self.get_or_create_parcel(license_id, Some(diamond), meta)?;

        match self.refresh_slot(license_id, &parcel.id, diamond, BidSlot::Current).await? {
            Some(id) => parcel.current_bid = Some(id),
            None => warn!(parcel = %parcel.id, "reclaim refresh unavailable, keeping pointer"),
        }
        parcel.pending_bid = None;

        self.put_parcel(&parcel)
    }

    /// License token `Transfer`: updates ownership only, independent of
    /// bid state. Maintains the legacy license row alongside the parcel.
    pub fn ownership_transferred(
        &mut self,
        token_id: U256,
        to: Address,
        meta: &EventMeta,
    ) -> Result<(), IndexerError> {
        let owner = address_id(&to);

        let mut parcel = self.get_or_create_parcel(token_id, None, meta)?;
        parcel.owner = Some(owner.clone());
        self.put_parcel(&parcel)?;

        let mut license = self.get_or_create_license(token_id)?;
        license.owner = Some(owner);
        self.put_license(&license)
    }

    pub fn license_info_updated(
        &mut self,
        license_id: U256,
        value: U256,
        expiration_timestamp: U256,
    ) -> Result<(), IndexerError> {
        let mut license = self.get_or_create_license(license_id)?;
        license.value = Some(value);
        license.expiration_timestamp = Some(expiration_timestamp);
        self.put_license(&license)
    }

    pub fn root_cid_updated(
        &mut self,
        token_id: U256,
        root_cid: String,
    ) -> Result<(), IndexerError> {
        let mut license = self.get_or_create_license(token_id)?;
        license.root_cid = Some(root_cid);
        self.put_license(&license)
    }

    /// Removal writes the empty string, matching the historical rows.
    pub fn root_cid_removed(&mut self, token_id: U256) -> Result<(), IndexerError> {
        let mut license = self.get_or_create_license(token_id)?;
        license.root_cid = Some(String::new());
        self.put_license(&license)
    }

    // ── shared plumbing ──────────────────────────────────────────────

    fn get_or_create_parcel(
        &mut self,
        license_id: U256,
        diamond: Option<Address>,
        meta: &EventMeta,
    ) -> Result<Parcel, IndexerError> {
        let id = parcel_id(license_id);
        let mut parcel = match self.txn.get::<Parcel>(EntityKind::Parcel, &id)? {
            Some(parcel) => parcel,
            None => Parcel::skeleton(id, meta.block_number),
        };
        if parcel.license_diamond.is_none() {
            parcel.license_diamond = diamond.as_ref().map(address_id);
        }
        Ok(parcel)
    }

    fn get_or_create_license(&mut self, license_id: U256) -> Result<License, IndexerError> {
        let id = parcel_id(license_id);
        Ok(self
            .txn
            .get::<License>(EntityKind::License, &id)?
            .unwrap_or_else(|| License::new(id)))
    }

    fn put_parcel(&mut self, parcel: &Parcel) -> Result<(), IndexerError> {
        self.txn.put(EntityKind::Parcel, &parcel.id, parcel)
    }

    fn put_license(&mut self, license: &License) -> Result<(), IndexerError> {
        self.txn.put(EntityKind::License, &license.id, license)
    }

    fn ensure_bidder(&mut self, bidder: &str) -> Result<(), IndexerError> {
        if self.txn.get::<Bidder>(EntityKind::Bidder, bidder)?.is_none() {
            self.txn
                .put(EntityKind::Bidder, bidder, &Bidder { id: bidder.into() })?;
        }
        Ok(())
    }

    /// Re-read one slot and upsert the snapshot as a bid row, returning
    /// the row id. Null-state reads return `None` without writing.
    async fn refresh_slot(
        &mut self,
        license_id: U256,
        parcel: &str,
        diamond: Address,
        slot: BidSlot,
    ) -> Result<Option<String>, IndexerError> {
        match self.adapter.bid_snapshot(diamond, slot).await? {
            Some(snap) => {
                let bidder = address_id(&snap.bidder);
                self.ensure_bidder(&bidder)?;
                let bid = snap.into_bid(license_id, parcel);
                let id = bid.id.clone();
                self.txn.put(EntityKind::Bid, &id, &bid)?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Load the payer-keyed current bid, seeding a new row from the
    /// adapter snapshot (or zeroes if the chain has no bid state).
    async fn load_or_seed_current_bid(
        &mut self,
        license_id: U256,
        diamond: Address,
        payer: Address,
    ) -> Result<Bid, IndexerError> {
        let pid = parcel_id(license_id);
        let payer_key = address_id(&payer);
        let row_id = bid_id(&payer, license_id);

        if let Some(bid) = self.txn.get::<Bid>(EntityKind::Bid, &row_id)? {
            return Ok(bid);
        }

        let mut bid = match self.adapter.bid_snapshot(diamond, BidSlot::Current).await? {
            Some(snap) => snap.into_bid(license_id, &pid),
            None => Bid {
                id: row_id.clone(),
                timestamp: U256::ZERO,
                bidder: payer_key.clone(),
                contribution_rate: U256::ZERO,
                per_second_fee_numerator: U256::ZERO,
                per_second_fee_denominator: U256::ZERO,
                for_sale_price: U256::ZERO,
                content_hash: None,
                parcel: pid.clone(),
            },
        };
        // The row is keyed by the event's payer even when the snapshot
        // reports a different bidder.
        bid.id = row_id;
        bid.bidder = payer_key;
        Ok(bid)
    }

    /// Common tail of the payer-update transitions: refresh the content
    /// hash, persist the bid, and point the parcel at it. The pending
    /// pointer is untouched.
    async fn finish_payer_update(
        &mut self,
        license_id: U256,
        diamond: Address,
        mut bid: Bid,
        meta: &EventMeta,
    ) -> Result<(), IndexerError> {
        bid.content_hash = self.adapter.content_hash(diamond, BidSlot::Current).await?;

        let mut parcel = self.get_or_create_parcel(license_id, Some(diamond), meta)?;
        parcel.current_bid = Some(bid.id.clone());

        self.ensure_bidder(&bid.bidder)?;
        self.txn.put(EntityKind::Bid, &bid.id, &bid)?;
        self.put_parcel(&parcel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::adapter::{LicenseSource, SplitBid, UnifiedBid};
    use crate::repo::{EntityRepository, MemoryRepository};
    use crate::testing::MockLicenseSource;
    use alloy::primitives::Bytes;

    const LICENSE: u64 = 42;

    fn diamond() -> Address {
        "0x00000000000000000000000000000000000000dd".parse().unwrap()
    }

    fn addr(byte: u8) -> Address {
        Address::with_last_byte(byte)
    }

    fn meta(block: u64) -> EventMeta {
        EventMeta {
            block_number: block,
            log_index: 0,
            timestamp: 1_000 + block,
            address: diamond(),
        }
    }

    fn unified(bidder: Address, price: u64) -> UnifiedBid {
        UnifiedBid {
            timestamp: U256::from(500),
            bidder,
            contribution_rate: U256::from(3),
            per_second_fee_numerator: U256::from(1),
            per_second_fee_denominator: U256::from(10),
            for_sale_price: U256::from(price),
            content_hash: Bytes::new(),
        }
    }

    fn adapter(source: &Arc<MockLicenseSource>) -> VersionAdapter {
        let src: Arc<dyn LicenseSource> = source.clone();
        VersionAdapter::new(src)
    }

    /// Commits one `bid_changed` transition as the indexer would.
    async fn apply_bid_changed(
        repo: &mut MemoryRepository,
        adapter: &VersionAdapter,
        block: u64,
    ) {
        let mut txn = EventTxn::new(&*repo);
        Reconciler::new(&mut txn, adapter)
            .bid_changed(U256::from(LICENSE), diamond(), &meta(block))
            .await
            .unwrap();
        repo.apply(txn.into_batch()).unwrap();
    }

    #[tokio::test]
    async fn test_bid_changed_then_promote() {
        let source = Arc::new(MockLicenseSource::new());
        let adapter = adapter(&source);
        let mut repo = MemoryRepository::new();
        let license = U256::from(LICENSE);

        source.set_unified(diamond(), BidSlot::Current, unified(addr(0xa1), 1000));
        source.set_unified(diamond(), BidSlot::Pending, unified(addr(0xa2), 2000));

        apply_bid_changed(&mut repo, &adapter, 11).await;

        let parcel: Parcel = repo.get(EntityKind::Parcel, "42").unwrap();
        let current = bid_id(&addr(0xa1), license);
        let pending = bid_id(&addr(0xa2), license);
        assert_eq!(parcel.current_bid.as_deref(), Some(current.as_str()));
        assert_eq!(parcel.pending_bid.as_deref(), Some(pending.as_str()));
        assert_eq!(repo.count(EntityKind::Bidder), 2);

        let mut txn = EventTxn::new(&repo);
        Reconciler::new(&mut txn, &adapter)
            .promote_pending(license, &meta(12))
            .await
            .unwrap();
        repo.apply(txn.into_batch()).unwrap();

        let parcel: Parcel = repo.get(EntityKind::Parcel, "42").unwrap();
        assert_eq!(parcel.current_bid.as_deref(), Some(pending.as_str()));
        assert_eq!(parcel.pending_bid, None);

        // Promotion is a pointer relabel: the bid row still carries its
        // last explicitly written values.
        let bid: Bid = repo.get(EntityKind::Bid, &pending).unwrap();
        assert_eq!(bid.for_sale_price, U256::from(2000));
    }

    #[tokio::test]
    async fn test_bid_changed_null_state_keeps_pointers() {
        let source = Arc::new(MockLicenseSource::new());
        let adapter = adapter(&source);
        let mut repo = MemoryRepository::new();

        source.set_unified(diamond(), BidSlot::Current, unified(addr(0xa1), 1000));
        source.set_unified(diamond(), BidSlot::Pending, unified(addr(0xa2), 2000));
        apply_bid_changed(&mut repo, &adapter, 11).await;

        // All interface generations now revert: pointers survive.
        source.clear_unified(diamond(), BidSlot::Current);
        source.clear_unified(diamond(), BidSlot::Pending);
        apply_bid_changed(&mut repo, &adapter, 12).await;

        let parcel: Parcel = repo.get(EntityKind::Parcel, "42").unwrap();
        assert!(parcel.current_bid.is_some());
        assert!(parcel.pending_bid.is_some());
    }

    #[tokio::test]
    async fn test_contribution_rate_update_overwrites_rate_and_time() {
        let source = Arc::new(MockLicenseSource::new());
        let adapter = adapter(&source);
        let mut repo = MemoryRepository::new();
        let license = U256::from(LICENSE);
        let payer = addr(0xa1);

        source.set_unified(diamond(), BidSlot::Current, unified(payer, 1000));

        let mut txn = EventTxn::new(&repo);
        Reconciler::new(&mut txn, &adapter)
            .contribution_rate_updated(license, diamond(), payer, U256::from(77), &meta(20))
            .await
            .unwrap();
        repo.apply(txn.into_batch()).unwrap();

        let bid: Bid = repo.get(EntityKind::Bid, &bid_id(&payer, license)).unwrap();
        assert_eq!(bid.contribution_rate, U256::from(77));
        assert_eq!(bid.timestamp, U256::from(1_020));
        // Seeded fields survive untouched.
        assert_eq!(bid.for_sale_price, U256::from(1000));

        let parcel: Parcel = repo.get(EntityKind::Parcel, "42").unwrap();
        assert_eq!(
            parcel.current_bid.as_deref(),
            Some(bid_id(&payer, license).as_str())
        );
        assert_eq!(parcel.pending_bid, None);
    }

    #[tokio::test]
    async fn test_payer_update_seeds_zeroes_on_null_state() {
        let source = Arc::new(MockLicenseSource::new());
        let adapter = adapter(&source);
        let mut repo = MemoryRepository::new();
        let license = U256::from(LICENSE);
        let payer = addr(0xa9);

        let mut txn = EventTxn::new(&repo);
        Reconciler::new(&mut txn, &adapter)
            .for_sale_price_updated(license, diamond(), payer, U256::from(9000), &meta(30))
            .await
            .unwrap();
        repo.apply(txn.into_batch()).unwrap();

        let bid: Bid = repo.get(EntityKind::Bid, &bid_id(&payer, license)).unwrap();
        assert_eq!(bid.for_sale_price, U256::from(9000));
        assert_eq!(bid.contribution_rate, U256::ZERO);
        assert_eq!(bid.content_hash, None);
    }

    #[tokio::test]
    async fn test_content_hash_update_leaves_timestamp() {
        let source = Arc::new(MockLicenseSource::new());
        let adapter = adapter(&source);
        let mut repo = MemoryRepository::new();
        let license = U256::from(LICENSE);
        let payer = addr(0xa1);

        let mut with_hash = unified(payer, 1000);
        with_hash.content_hash = Bytes::from(vec![0x12, 0x34]);
        source.set_unified(diamond(), BidSlot::Current, with_hash);

        let mut txn = EventTxn::new(&repo);
        Reconciler::new(&mut txn, &adapter)
            .content_hash_updated(license, diamond(), payer, &meta(40))
            .await
            .unwrap();
        repo.apply(txn.into_batch()).unwrap();

        let bid: Bid = repo.get(EntityKind::Bid, &bid_id(&payer, license)).unwrap();
        assert_eq!(bid.content_hash.as_deref(), Some("0x1234"));
        // Seed timestamp, not event time.
        assert_eq!(bid.timestamp, U256::from(500));
    }

    #[tokio::test]
    async fn test_split_fallback_yields_null_content_hash() {
        let source = Arc::new(MockLicenseSource::new());
        let adapter = adapter(&source);
        let mut repo = MemoryRepository::new();
        let license = U256::from(LICENSE);
        let payer = addr(0xa1);

        source.set_split(
            diamond(),
            BidSlot::Current,
            SplitBid {
                timestamp: U256::from(400),
                bidder: payer,
                contribution_rate: U256::from(2),
                per_second_fee_numerator: U256::from(1),
                per_second_fee_denominator: U256::from(10),
                for_sale_price: U256::from(800),
            },
        );

        apply_bid_changed(&mut repo, &adapter, 50).await;

        let bid: Bid = repo.get(EntityKind::Bid, &bid_id(&payer, license)).unwrap();
        assert_eq!(bid.content_hash, None);
        assert_eq!(bid.for_sale_price, U256::from(800));
    }

    #[tokio::test]
    async fn test_reclaim_clears_pending() {
        let source = Arc::new(MockLicenseSource::new());
        let adapter = adapter(&source);
        let mut repo = MemoryRepository::new();
        let license = U256::from(LICENSE);

        source.set_unified(diamond(), BidSlot::Current, unified(addr(0xa1), 1000));
        source.set_unified(diamond(), BidSlot::Pending, unified(addr(0xa2), 2000));
        apply_bid_changed(&mut repo, &adapter, 11).await;

        let mut txn = EventTxn::new(&repo);
        Reconciler::new(&mut txn, &adapter)
            .reclaimed(license, diamond(), &meta(12))
            .await
            .unwrap();
        repo.apply(txn.into_batch()).unwrap();

        let parcel: Parcel = repo.get(EntityKind::Parcel, "42").unwrap();
        assert_eq!(
            parcel.current_bid.as_deref(),
            Some(bid_id(&addr(0xa1), license).as_str())
        );
        assert_eq!(parcel.pending_bid, None);
    }

    #[tokio::test]
    async fn test_ownership_transfer_touches_owner_only() {
        let source = Arc::new(MockLicenseSource::new());
        let adapter = adapter(&source);
        let mut repo = MemoryRepository::new();
        let license = U256::from(LICENSE);

        source.set_unified(diamond(), BidSlot::Current, unified(addr(0xa1), 1000));
        apply_bid_changed(&mut repo, &adapter, 11).await;

        let mut txn = EventTxn::new(&repo);
        Reconciler::new(&mut txn, &adapter)
            .ownership_transferred(license, addr(0xee), &meta(12))
            .unwrap();
        repo.apply(txn.into_batch()).unwrap();

        let parcel: Parcel = repo.get(EntityKind::Parcel, "42").unwrap();
        assert_eq!(parcel.owner.as_deref(), Some(address_id(&addr(0xee)).as_str()));
        assert!(parcel.current_bid.is_some());

        let legacy: License = repo.get(EntityKind::License, "42").unwrap();
        assert_eq!(legacy.owner.as_deref(), Some(address_id(&addr(0xee)).as_str()));
    }

    #[tokio::test]
    async fn test_legacy_license_rows() {
        let source = Arc::new(MockLicenseSource::new());
        let adapter = adapter(&source);
        let mut repo = MemoryRepository::new();
        let license = U256::from(LICENSE);

        let mut txn = EventTxn::new(&repo);
        {
            let mut reconciler = Reconciler::new(&mut txn, &adapter);
            reconciler
                .license_info_updated(license, U256::from(5000), U256::from(2_000_000))
                .unwrap();
            reconciler
                .root_cid_updated(license, "QmExample".into())
                .unwrap();
        }
        repo.apply(txn.into_batch()).unwrap();

        let row: License = repo.get(EntityKind::License, "42").unwrap();
        assert_eq!(row.value, Some(U256::from(5000)));
        assert_eq!(row.root_cid.as_deref(), Some("QmExample"));

        let mut txn = EventTxn::new(&repo);
        Reconciler::new(&mut txn, &adapter)
            .root_cid_removed(license)
            .unwrap();
        repo.apply(txn.into_batch()).unwrap();

        let row: License = repo.get(EntityKind::License, "42").unwrap();
        assert_eq!(row.root_cid.as_deref(), Some(""));
    }
}
