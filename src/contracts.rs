//! Centralized Contract Definitions
//!
//! Solidity interfaces the keeper talks to, defined with alloy's `sol!`
//! macro. Each interface is annotated with `#[sol(rpc)]` so it produces a
//! contract instance type usable with any alloy Provider.
//!
//! - `ISentinelHook`: range state, `maintain`, and the two events the
//!   listener subscribes to
//! - `IPoolManager`: `getSlot0` keyed by pool id
//! - `AggregatorV3Interface`: Chainlink-style reference price feeds

use alloy::sol;

// ── Sentinel hook ────────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface ISentinelHook {
        struct PoolState {
            int24 activeTickLower;
            int24 activeTickUpper;
            uint128 activeLiquidity;
            address priceFeed;
            bool priceFeedInverted;
            uint256 maxDeviationBps;
            address aToken0;
            address aToken1;
            uint256 idle0;
            uint256 idle1;
            uint256 aave0;
            uint256 aave1;
            address currency0;
            address currency1;
            uint8 decimals0;
            uint8 decimals1;
            uint24 fee;
            int24 tickSpacing;
            uint256 totalShares;
            bool isInitialized;
        }

        function getPoolState(bytes32 poolId) external view returns (PoolState memory);
        function maintain(bytes32 poolId, int24 newLower, int24 newUpper, uint256 volatility) external;

        event PoolInitialized(bytes32 indexed poolId, address priceFeed, bool priceFeedInverted, address aToken0, address aToken1);
        event TickCrossed(bytes32 indexed poolId, int24 tickLower, int24 tickUpper, int24 currentTick);
    }
}

// ── Pool manager ─────────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IPoolManager {
        function getSlot0(bytes32 poolId) external view returns (uint160 sqrtPriceX96, int24 tick, uint16 observationIndex, uint16 observationCardinality);
    }
}

// ── Reference price feeds ────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface AggregatorV3Interface {
        function latestRoundData() external view returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound);
        function decimals() external view returns (uint8);
    }
}
