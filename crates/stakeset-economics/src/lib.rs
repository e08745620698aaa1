// crates/stakeset-economics/src/lib.rs
//
// stakeset-economics: native balances, staking pools, stake positions,
// reward shares, tallying-rule slashing, stake subsidy and storage fund.
//
// All monetary values are tracked in nanos (the smallest unit of the native
// token). 1 token = 1,000,000,000 nanos (10^9).

pub mod exchange_rate;
pub mod position;
pub mod rewards;
pub mod slashing;
pub mod staking_pool;
pub mod storage_fund;
pub mod subsidy;
pub mod token;

// Re-export key types for ergonomic access from downstream crates.
pub use exchange_rate::{ExchangeRate, ExchangeRateLedger};
pub use position::{FungibleStake, FungibleSupply, PrincipalStake, StakePosition};
pub use rewards::{compute_reward_shares, split_commission, RewardShares};
pub use slashing::{compute_slashed_validators, ReportRecords};
pub use staking_pool::StakingPool;
pub use storage_fund::StorageFund;
pub use subsidy::StakeSubsidy;
pub use token::{
    apply_bps, mul_div, Balance, BASIS_POINT_DENOMINATOR, MIN_STAKING_THRESHOLD, NANOS_PER_TOKEN,
};
