//! Shared chain client for connecting to EVM-compatible blockchains.
//!
//! The indexer only reads, so the provider carries the recommended
//! fillers but no signer.

use alloy::network::Ethereum;
use alloy::primitives::Address;
use alloy::providers::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller,
};
use alloy::providers::{Identity, ProviderBuilder, RootProvider};
use async_trait::async_trait;

use crate::adapter::{BidSlot, ClaimInfo, ClaimVersion, LicenseSource, ParcelShape, SplitBid, UnifiedBid};
use crate::contracts::{ILicenseDiamondV1, ILicenseDiamondV2, IParcelRegistry};
use crate::error::{ChainError, IndexerError};

/// The concrete provider type produced by `ProviderBuilder::new().connect_http(...)`.
pub type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
    Ethereum,
>;

/// A read-only chain client wrapping an alloy provider.
#[derive(Clone)]
pub struct ChainClient {
    pub provider: HttpProvider,
}

impl ChainClient {
    /// Create a new chain client from an RPC URL.
    pub fn new(rpc_url: &str) -> Result<Self, IndexerError> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| IndexerError::ConfigError(format!("Invalid RPC URL: {e}")))?;

        let provider = ProviderBuilder::new().connect_http(url);

        Ok(Self { provider })
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &HttpProvider {
        &self.provider
    }
}

/// Classify a contract-call failure.
///
/// A JSON-RPC error response is how nodes report reverts, and decode
/// failures mean the deployment does not speak this interface
/// generation; both allow fallback. Everything else is transport.
fn classify(e: alloy::contract::Error) -> ChainError {
    match e {
        alloy::contract::Error::TransportError(rpc) => match rpc.as_error_resp() {
            Some(resp) => ChainError::Reverted(resp.message.to_string()),
            None => ChainError::Transport(rpc.to_string()),
        },
        other => ChainError::Reverted(other.to_string()),
    }
}

/// [`LicenseSource`] backed by live RPC reads against the registry and
/// per-license instances.
#[derive(Clone)]
pub struct ChainLicenseSource {
    client: ChainClient,
    registry: Address,
}

impl ChainLicenseSource {
    pub fn new(client: ChainClient, registry: Address) -> Self {
        Self { client, registry }
    }
}

#[async_trait]
impl LicenseSource for ChainLicenseSource {
    async fn unified_bid(&self, diamond: Address, slot: BidSlot) -> Result<UnifiedBid, ChainError> {
        let instance = ILicenseDiamondV2::new(diamond, self.client.provider.clone());
        match slot {
            BidSlot::Current => {
                let ret = instance.currentBid().call().await.map_err(classify)?;
                Ok(UnifiedBid {
                    timestamp: ret.timestamp,
                    bidder: ret.bidder,
                    contribution_rate: ret.contributionRate,
                    per_second_fee_numerator: ret.perSecondFeeNumerator,
                    per_second_fee_denominator: ret.perSecondFeeDenominator,
                    for_sale_price: ret.forSalePrice,
                    content_hash: ret.contentHash,
                })
            }
            BidSlot::Pending => {
                let ret = instance.pendingBid().call().await.map_err(classify)?;
                Ok(UnifiedBid {
                    timestamp: ret.timestamp,
                    bidder: ret.bidder,
                    contribution_rate: ret.contributionRate,
                    per_second_fee_numerator: ret.perSecondFeeNumerator,
                    per_second_fee_denominator: ret.perSecondFeeDenominator,
                    for_sale_price: ret.forSalePrice,
                    content_hash: ret.contentHash,
                })
            }
        }
    }

    async fn split_bid(&self, diamond: Address, slot: BidSlot) -> Result<SplitBid, ChainError> {
        let instance = ILicenseDiamondV1::new(diamond, self.client.provider.clone());
        match slot {
            BidSlot::Current => {
                let ret = instance.bid().call().await.map_err(classify)?;
                Ok(SplitBid {
                    timestamp: ret.timestamp,
                    bidder: ret.bidder,
                    contribution_rate: ret.contributionRate,
                    per_second_fee_numerator: ret.perSecondFeeNumerator,
                    per_second_fee_denominator: ret.perSecondFeeDenominator,
                    for_sale_price: ret.forSalePrice,
                })
            }
            BidSlot::Pending => {
                let ret = instance.penaltyBid().call().await.map_err(classify)?;
                Ok(SplitBid {
                    timestamp: ret.timestamp,
                    bidder: ret.bidder,
                    contribution_rate: ret.contributionRate,
                    per_second_fee_numerator: ret.perSecondFeeNumerator,
                    per_second_fee_denominator: ret.perSecondFeeDenominator,
                    for_sale_price: ret.forSalePrice,
                })
            }
        }
    }

    async fn claim_info(
        &self,
        license_id: alloy::primitives::U256,
        version: ClaimVersion,
    ) -> Result<ClaimInfo, ChainError> {
        let registry = IParcelRegistry::new(self.registry, self.client.provider.clone());
        let diamond = registry
            .getLicenseDiamond(license_id)
            .call()
            .await
            .map_err(classify)?;

        let shape = match version {
            ClaimVersion::V1 => {
                let ret = registry.getLandParcel(license_id).call().await.map_err(classify)?;
                ParcelShape::Path {
                    origin: ret.baseCoordinate,
                    runs: ret.path,
                }
            }
            ClaimVersion::V2 => {
                let ret = registry
                    .getLandParcelV2(license_id)
                    .call()
                    .await
                    .map_err(classify)?;
                ParcelShape::Rect {
                    sw: ret.swCoordinate,
                    lat_count: ret.latDim.to::<u64>(),
                    lng_count: ret.lngDim.to::<u64>(),
                }
            }
        };

        Ok(ClaimInfo { diamond, shape })
    }
}
