//! Solidity bindings for the on-chain collaborators.
//!
//! Two incompatible per-license interface generations exist side by
//! side: the unified (V2) diamond exposes current/pending bids with a
//! content hash, the split (V1) deployment exposes a base bid and a
//! separate penalty bid without one. The registry likewise has a path
//! read and a rectangle read depending on claim generation.

use alloy::sol;

sol! {
    #[sol(rpc)]
    interface ILicenseDiamondV2 {
        function currentBid() external view returns (
            uint256 timestamp,
            address bidder,
            uint256 contributionRate,
            uint256 perSecondFeeNumerator,
            uint256 perSecondFeeDenominator,
            uint256 forSalePrice,
            bytes contentHash
        );

        function pendingBid() external view returns (
            uint256 timestamp,
            address bidder,
            uint256 contributionRate,
            uint256 perSecondFeeNumerator,
            uint256 perSecondFeeDenominator,
            uint256 forSalePrice,
            bytes contentHash
        );
    }

    #[sol(rpc)]
    interface ILicenseDiamondV1 {
        function bid() external view returns (
            uint256 timestamp,
            address bidder,
            uint256 contributionRate,
            uint256 perSecondFeeNumerator,
            uint256 perSecondFeeDenominator,
            uint256 forSalePrice
        );

        function penaltyBid() external view returns (
            uint256 timestamp,
            address bidder,
            uint256 contributionRate,
            uint256 perSecondFeeNumerator,
            uint256 perSecondFeeDenominator,
            uint256 forSalePrice
        );
    }

    #[sol(rpc)]
    interface IParcelRegistry {
        function getLandParcel(uint256 id) external view returns (
            uint64 baseCoordinate,
            uint256[] memory path
        );

        function getLandParcelV2(uint256 id) external view returns (
            uint64 swCoordinate,
            uint256 latDim,
            uint256 lngDim
        );

        function getLicenseDiamond(uint256 id) external view returns (address);
    }
}
