//! Structured event logs consumed by the indexer.
//!
//! Events arrive one at a time in canonical order: ascending block
//! height, then intra-block log order. Bid-lifecycle events carry no
//! license id; it is implied by the emitting contract address, which
//! the indexer resolves through its instance routes.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Delivery metadata shared by every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub block_number: u64,
    pub log_index: u64,
    /// Block timestamp, seconds.
    pub timestamp: u64,
    /// Emitting contract: the registry for claims and transfers, the
    /// per-license instance for bid-lifecycle events.
    pub address: Address,
}

impl EventMeta {
    /// Canonical ordering key.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    ParcelClaimed { license_id: U256 },
    ParcelClaimedV2 { license_id: U256 },
    /// Generic bid-mutation signal; full current/pending snapshots are
    /// re-read from chain.
    BidChanged,
    TransferTriggered { bidder: Address },
    BidAccepted { bidder: Address },
    LicenseReclaimed,
    PayerContributionRateUpdated { payer: Address, contribution_rate: U256 },
    PayerForSalePriceUpdated { payer: Address, for_sale_price: U256 },
    PayerContentHashUpdated { payer: Address },
    /// Ownership transfer of the license token.
    Transfer { to: Address, token_id: U256 },
    LicenseInfoUpdated {
        license_id: U256,
        value: U256,
        expiration_timestamp: U256,
    },
    RootContentCidUpdated { token_id: U256, root_cid: String },
    RootContentCidRemoved { token_id: U256 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub meta: EventMeta,
    #[serde(flatten)]
    pub kind: EventKind,
}
