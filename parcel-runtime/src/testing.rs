//! Scripted collaborators for tests.
//!
//! The chain seam is a trait, so tests drive the adapter and handlers
//! with a [`MockLicenseSource`] whose responses are set up front.
//! Unset queries revert, matching how an absent or older deployment
//! behaves on chain.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use crate::adapter::{
    BidSlot, ClaimInfo, ClaimVersion, LicenseSource, SplitBid, UnifiedBid,
};
use crate::error::ChainError;
use crate::indexer::{InstanceKind, InstanceRegistry};

#[derive(Default)]
pub struct MockLicenseSource {
    unified: Mutex<HashMap<(Address, BidSlot), UnifiedBid>>,
    split: Mutex<HashMap<(Address, BidSlot), SplitBid>>,
    claims: Mutex<HashMap<(U256, ClaimVersion), ClaimInfo>>,
    transport_down: Mutex<bool>,
}

impl MockLicenseSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unified(&self, diamond: Address, slot: BidSlot, bid: UnifiedBid) {
        self.unified.lock().unwrap().insert((diamond, slot), bid);
    }

    pub fn clear_unified(&self, diamond: Address, slot: BidSlot) {
        self.unified.lock().unwrap().remove(&(diamond, slot));
    }

    pub fn set_split(&self, diamond: Address, slot: BidSlot, bid: SplitBid) {
        self.split.lock().unwrap().insert((diamond, slot), bid);
    }

    pub fn set_claim(&self, license_id: U256, version: ClaimVersion, info: ClaimInfo) {
        self.claims.lock().unwrap().insert((license_id, version), info);
    }

    /// Make every subsequent read fail at the transport layer.
    pub fn fail_transport(&self) {
        *self.transport_down.lock().unwrap() = true;
    }

    fn check_transport(&self) -> Result<(), ChainError> {
        if *self.transport_down.lock().unwrap() {
            Err(ChainError::Transport("mock transport down".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LicenseSource for MockLicenseSource {
    async fn unified_bid(&self, diamond: Address, slot: BidSlot) -> Result<UnifiedBid, ChainError> {
        self.check_transport()?;
        self.unified
            .lock()
            .unwrap()
            .get(&(diamond, slot))
            .cloned()
            .ok_or_else(|| ChainError::Reverted("mock: unified interface absent".into()))
    }

    async fn split_bid(&self, diamond: Address, slot: BidSlot) -> Result<SplitBid, ChainError> {
        self.check_transport()?;
        self.split
            .lock()
            .unwrap()
            .get(&(diamond, slot))
            .cloned()
            .ok_or_else(|| ChainError::Reverted("mock: split interface absent".into()))
    }

    async fn claim_info(
        &self,
        license_id: U256,
        version: ClaimVersion,
    ) -> Result<ClaimInfo, ChainError> {
        self.check_transport()?;
        self.claims
            .lock()
            .unwrap()
            .get(&(license_id, version))
            .cloned()
            .ok_or_else(|| ChainError::Reverted("mock: unknown license".into()))
    }
}

/// Records `register_instance` calls for inspection.
#[derive(Default)]
pub struct RecordingRegistry {
    registered: Mutex<Vec<(Address, InstanceKind, U256)>>,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registered(&self) -> Vec<(Address, InstanceKind, U256)> {
        self.registered.lock().unwrap().clone()
    }
}

impl InstanceRegistry for RecordingRegistry {
    fn register_instance(&self, address: Address, kind: InstanceKind, license_id: U256) {
        self.registered
            .lock()
            .unwrap()
            .push((address, kind, license_id));
    }
}
