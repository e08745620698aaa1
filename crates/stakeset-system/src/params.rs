// crates/stakeset-system/src/params.rs
//
// Committee parameters fixed at genesis.
// Deserializable from TOML or JSON; missing fields take the defaults below.

use serde::{Deserialize, Serialize};

use stakeset_core::StakesetError;
use stakeset_economics::NANOS_PER_TOKEN;

/// Highest commission a validator may charge, in basis points (20%).
pub const MAX_COMMISSION_RATE: u64 = 2_000;

/// Gas price quotes must stay strictly below this.
pub const MAX_VALIDATOR_GAS_PRICE: u64 = 100_000;

/// Layout version of `SystemState`.
pub const SYSTEM_STATE_VERSION: u64 = 1;

/// Parameters governing committee membership and subsidies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemParameters {
    /// Target epoch length; the stake subsidy is only paid for epochs that
    /// lasted at least this long.
    #[serde(default = "default_epoch_duration_ms")]
    pub epoch_duration_ms: u64,

    /// First epoch whose advance draws the stake subsidy.
    #[serde(default)]
    pub stake_subsidy_start_epoch: u64,

    /// Upper bound on the active committee size.
    #[serde(default = "default_max_validator_count")]
    pub max_validator_count: u64,

    /// Voluntary removals may not shrink the committee below this.
    #[serde(default = "default_min_validator_count")]
    pub min_validator_count: u64,

    /// Stake a candidate needs before it may request admission (in nanos).
    #[serde(default = "default_min_validator_joining_stake")]
    pub min_validator_joining_stake: u64,

    /// Below this stake an active validator is at risk (in nanos).
    #[serde(default = "default_validator_low_stake_threshold")]
    pub validator_low_stake_threshold: u64,

    /// Below this stake an active validator is removed at once (in nanos).
    #[serde(default = "default_validator_very_low_stake_threshold")]
    pub validator_very_low_stake_threshold: u64,

    /// Consecutive at-risk epochs tolerated before removal.
    #[serde(default = "default_validator_low_stake_grace_period")]
    pub validator_low_stake_grace_period: u64,
}

fn default_epoch_duration_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_max_validator_count() -> u64 {
    150
}

fn default_min_validator_count() -> u64 {
    4
}

fn default_min_validator_joining_stake() -> u64 {
    30_000_000 * NANOS_PER_TOKEN
}

fn default_validator_low_stake_threshold() -> u64 {
    20_000_000 * NANOS_PER_TOKEN
}

fn default_validator_very_low_stake_threshold() -> u64 {
    15_000_000 * NANOS_PER_TOKEN
}

fn default_validator_low_stake_grace_period() -> u64 {
    7
}

impl Default for SystemParameters {
    fn default() -> Self {
        Self {
            epoch_duration_ms: default_epoch_duration_ms(),
            stake_subsidy_start_epoch: 0,
            max_validator_count: default_max_validator_count(),
            min_validator_count: default_min_validator_count(),
            min_validator_joining_stake: default_min_validator_joining_stake(),
            validator_low_stake_threshold: default_validator_low_stake_threshold(),
            validator_very_low_stake_threshold: default_validator_very_low_stake_threshold(),
            validator_low_stake_grace_period: default_validator_low_stake_grace_period(),
        }
    }
}

impl SystemParameters {
    /// Reject inconsistent thresholds.
    pub fn validate(&self) -> Result<(), StakesetError> {
        if self.validator_very_low_stake_threshold > self.validator_low_stake_threshold {
            return Err(StakesetError::InvalidState(format!(
                "very low stake threshold {} exceeds low stake threshold {}",
                self.validator_very_low_stake_threshold, self.validator_low_stake_threshold
            )));
        }
        if self.min_validator_count > self.max_validator_count {
            return Err(StakesetError::InvalidState(format!(
                "min validator count {} exceeds max validator count {}",
                self.min_validator_count, self.max_validator_count
            )));
        }
        Ok(())
    }
}

/// Inputs of one epoch advance, as supplied by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceEpochParams {
    pub new_epoch: u64,
    pub next_protocol_version: u64,
    /// Storage charges collected this epoch (in nanos).
    pub storage_charge: u64,
    /// Computation charges collected this epoch (in nanos).
    pub computation_charge: u64,
    /// Storage rebates paid out this epoch (in nanos).
    pub storage_rebate: u64,
    /// Portion of the rebates kept by the storage fund (in nanos).
    pub non_refundable_storage_fee: u64,
    /// Share of the storage fund's reward that is reinvested, in bps.
    pub storage_fund_reinvest_rate: u64,
    /// Share of a slashed validator's reward that is withheld, in bps.
    pub reward_slashing_rate: u64,
    pub epoch_start_timestamp_ms: u64,
}
