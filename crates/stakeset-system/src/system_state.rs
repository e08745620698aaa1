// crates/stakeset-system/src/system_state.rs
//
// Top-level system state and the epoch-advance entry point.
//
// `advance_epoch` folds in any rewards held back by earlier safe-mode epochs,
// draws the stake subsidy, carves out the storage fund's share of the
// computation reward, runs the validator-set boundary and routes truncation
// leftovers and storage flows into the storage fund.
//
// `advance_epoch_or_safe_mode` is the host-side driver. It snapshots the
// whole state, attempts the full advance and, if anything fails, restores
// the snapshot and falls back to safe mode: the epoch number moves on but
// the committee and every stake stay as they were, and the epoch's inflows
// are accumulated for the next successful advance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::capability::{CapScope, OperationCap};
use crate::params::{AdvanceEpochParams, SystemParameters, SYSTEM_STATE_VERSION};
use crate::validator::ValidatorMetadata;
use crate::validator_set::{EpochChanges, ValidatorSet};
use stakeset_core::{Address, PoolId, StakesetError, SYSTEM_ADDRESS};
use stakeset_economics::{
    apply_bps, Balance, ExchangeRate, ExchangeRateLedger, FungibleStake,
    PrincipalStake, ReportRecords, StakePosition, StakeSubsidy, StorageFund,
    BASIS_POINT_DENOMINATOR,
};

/// Result of one call to `advance_epoch_or_safe_mode`.
#[derive(Debug)]
pub struct EpochOutcome {
    /// Storage rebate handed back to the host.
    pub refunded_storage_rebate: Balance,
    /// Whether the full advance failed and safe mode was entered.
    pub safe_mode: bool,
    /// The failure that triggered safe mode.
    pub error: Option<StakesetError>,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    epoch: u64,
    protocol_version: u64,
    system_state_version: u64,
    validators: ValidatorSet,
    storage_fund: StorageFund,
    parameters: SystemParameters,
    reference_gas_price: u64,
    /// Standing tallying-rule reports; cleared per validator on departure.
    validator_report_records: ReportRecords,
    stake_subsidy: StakeSubsidy,
    safe_mode: bool,
    safe_mode_storage_rewards: Balance,
    safe_mode_computation_rewards: Balance,
    safe_mode_storage_rebates: u64,
    safe_mode_non_refundable_storage_fee: u64,
    epoch_start_timestamp_ms: u64,
    /// Validator-owned reward stakes minted at epoch boundaries, awaiting pickup.
    validator_reward_stakes: BTreeMap<Address, Vec<PrincipalStake>>,
}

impl SystemState {
    /// Genesis state at epoch 0.
    pub fn new(
        validators: ValidatorSet,
        storage_fund: Balance,
        stake_subsidy: StakeSubsidy,
        parameters: SystemParameters,
        protocol_version: u64,
        epoch_start_timestamp_ms: u64,
    ) -> Result<Self, StakesetError> {
        parameters.validate()?;
        let reference_gas_price = validators.derive_reference_gas_price();
        Ok(Self {
            epoch: 0,
            protocol_version,
            system_state_version: SYSTEM_STATE_VERSION,
            validators,
            storage_fund: StorageFund::new(storage_fund),
            parameters,
            reference_gas_price,
            validator_report_records: ReportRecords::new(),
            stake_subsidy,
            safe_mode: false,
            safe_mode_storage_rewards: Balance::zero(),
            safe_mode_computation_rewards: Balance::zero(),
            safe_mode_storage_rebates: 0,
            safe_mode_non_refundable_storage_fee: 0,
            epoch_start_timestamp_ms,
            validator_reward_stakes: BTreeMap::new(),
        })
    }

    // -----------------------------------------------------------------
    // Epoch advance
    // -----------------------------------------------------------------

    /// Full epoch advance. Returns the refunded storage rebate.
    ///
    /// Partial effects are not rolled back on error; hosts that need
    /// all-or-nothing behaviour go through `advance_epoch_or_safe_mode`.
    ///
    /// # Errors
    /// - `StakesetError::NotSystemAddress` unless `caller` is the system.
    /// - `StakesetError::BpsTooLarge` for a rate above 10_000.
    /// - `StakesetError::AdvancedToWrongEpoch` unless moving one epoch forward.
    /// - Any invariant failure from reward distribution or settlement.
    pub fn advance_epoch(
        &mut self,
        caller: Address,
        params: &AdvanceEpochParams,
        mut storage_reward: Balance,
        mut computation_reward: Balance,
    ) -> Result<Balance, StakesetError> {
        self.check_advance_preconditions(caller, params)?;
        for rate in [params.storage_fund_reinvest_rate, params.reward_slashing_rate] {
            if rate > BASIS_POINT_DENOMINATOR {
                return Err(StakesetError::BpsTooLarge(rate));
            }
        }

        let old_epoch = self.epoch;
        let prev_epoch_start_timestamp = self.epoch_start_timestamp_ms;
        self.epoch = params.new_epoch;

        storage_reward.join(self.safe_mode_storage_rewards.withdraw_all());
        computation_reward.join(self.safe_mode_computation_rewards.withdraw_all());
        let storage_rebate = params
            .storage_rebate
            .checked_add(std::mem::take(&mut self.safe_mode_storage_rebates))
            .ok_or(StakesetError::ArithmeticOverflow("storage rebate"))?;
        let non_refundable_storage_fee = params
            .non_refundable_storage_fee
            .checked_add(std::mem::take(&mut self.safe_mode_non_refundable_storage_fee))
            .ok_or(StakesetError::ArithmeticOverflow("non-refundable storage fee"))?;
        // The storage fund's share is taken from the charge alone; the subsidy
        // goes entirely to stakers.
        let computation_charge = computation_reward.value();

        let total_validator_stake = self.validators.total_stake();
        let storage_fund_balance = self.storage_fund.total_balance();

        // Only full-length epochs past the start epoch earn the subsidy.
        let epoch_lasted = params
            .epoch_start_timestamp_ms
            .saturating_sub(prev_epoch_start_timestamp)
            >= self.parameters.epoch_duration_ms;
        if old_epoch >= self.parameters.stake_subsidy_start_epoch && epoch_lasted {
            let subsidy = self.stake_subsidy.advance_epoch()?;
            tracing::debug!(amount = subsidy.value(), "stake subsidy drawn");
            computation_reward.join(subsidy);
        }

        let storage_fund_share = storage_fund_reward_share(
            storage_fund_balance,
            total_validator_stake,
            computation_charge,
        )?;
        let mut storage_fund_reward = computation_reward.split(storage_fund_share)?;
        let reinvestment = storage_fund_reward.split(apply_bps(
            storage_fund_reward.value(),
            params.storage_fund_reinvest_rate,
        ))?;

        let changes = self.validators.advance_epoch(
            params.new_epoch,
            &mut computation_reward,
            &mut storage_fund_reward,
            &mut self.validator_report_records,
            params.reward_slashing_rate,
            &self.parameters,
        )?;
        self.collect_reward_stakes(changes);

        self.protocol_version = params.next_protocol_version;
        self.reference_gas_price = self.validators.derive_reference_gas_price();

        // Truncation leftovers belong to the storage fund.
        let mut leftovers = storage_fund_reward;
        leftovers.join(computation_reward);
        let refunded = self.storage_fund.advance_epoch(
            storage_reward,
            reinvestment,
            leftovers,
            storage_rebate,
            non_refundable_storage_fee,
        )?;

        self.epoch_start_timestamp_ms = params.epoch_start_timestamp_ms;
        self.safe_mode = false;

        tracing::info!(
            epoch = self.epoch,
            total_stake = self.validators.total_stake(),
            committee = self.validators.active_validators().len(),
            reference_gas_price = self.reference_gas_price,
            storage_fund = self.storage_fund.total_balance(),
            "epoch advanced"
        );
        Ok(refunded)
    }

    /// Degraded advance: bump the epoch and hold the inflows for later.
    pub fn advance_epoch_safe_mode(
        &mut self,
        params: &AdvanceEpochParams,
        storage_reward: Balance,
        computation_reward: Balance,
    ) {
        self.epoch = params.new_epoch;
        self.protocol_version = params.next_protocol_version;
        self.safe_mode = true;
        self.safe_mode_storage_rewards.join(storage_reward);
        self.safe_mode_computation_rewards.join(computation_reward);
        self.safe_mode_storage_rebates = self
            .safe_mode_storage_rebates
            .saturating_add(params.storage_rebate);
        self.safe_mode_non_refundable_storage_fee = self
            .safe_mode_non_refundable_storage_fee
            .saturating_add(params.non_refundable_storage_fee);
        self.epoch_start_timestamp_ms = params.epoch_start_timestamp_ms;
        tracing::warn!(epoch = self.epoch, "entered safe mode");
    }

    /// Advance atomically, falling back to safe mode on any failure.
    ///
    /// The epoch's storage and computation charges are minted here from
    /// `params`.
    ///
    /// # Errors
    /// Only a wrong caller or epoch, or a failed snapshot, is returned as an
    /// error; every other failure ends in safe mode.
    pub fn advance_epoch_or_safe_mode(
        &mut self,
        caller: Address,
        params: &AdvanceEpochParams,
    ) -> Result<EpochOutcome, StakesetError> {
        self.check_advance_preconditions(caller, params)?;
        let snapshot = self.snapshot()?;

        match self.advance_epoch(
            caller,
            params,
            Balance::new(params.storage_charge),
            Balance::new(params.computation_charge),
        ) {
            Ok(refunded) => Ok(EpochOutcome {
                refunded_storage_rebate: refunded,
                safe_mode: false,
                error: None,
            }),
            Err(e) => {
                tracing::warn!(epoch = params.new_epoch, error = %e, "epoch advance failed, falling back to safe mode");
                *self = Self::restore(&snapshot)?;
                self.advance_epoch_safe_mode(
                    params,
                    Balance::new(params.storage_charge),
                    Balance::new(params.computation_charge),
                );
                Ok(EpochOutcome {
                    refunded_storage_rebate: Balance::zero(),
                    safe_mode: true,
                    error: Some(e),
                })
            }
        }
    }

    fn check_advance_preconditions(
        &self,
        caller: Address,
        params: &AdvanceEpochParams,
    ) -> Result<(), StakesetError> {
        if caller != SYSTEM_ADDRESS {
            return Err(StakesetError::NotSystemAddress(caller));
        }
        if params.new_epoch != self.epoch + 1 {
            return Err(StakesetError::AdvancedToWrongEpoch {
                expected: self.epoch + 1,
                actual: params.new_epoch,
            });
        }
        Ok(())
    }

    fn collect_reward_stakes(&mut self, changes: EpochChanges) {
        for (address, stake) in changes.validator_rewards {
            self.validator_reward_stakes
                .entry(address)
                .or_default()
                .push(stake);
        }
    }

    /// Hand a validator the reward stakes minted for it so far.
    pub fn take_validator_reward_stakes(&mut self, address: &Address) -> Vec<PrincipalStake> {
        self.validator_reward_stakes
            .remove(address)
            .unwrap_or_default()
    }

    /// Serialize the whole state.
    pub fn snapshot(&self) -> Result<String, StakesetError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn restore(snapshot: &str) -> Result<Self, StakesetError> {
        Ok(serde_json::from_str(snapshot)?)
    }

    // -----------------------------------------------------------------
    // Delegators
    // -----------------------------------------------------------------

    pub fn request_add_stake(
        &mut self,
        validator_address: Address,
        stake: Balance,
    ) -> Result<StakePosition, StakesetError> {
        self.validators
            .request_add_stake(validator_address, stake, self.epoch)
            .map(StakePosition::Principal)
    }

    pub fn request_withdraw_stake(&mut self, position: StakePosition) -> Result<Balance, StakesetError> {
        self.validators.request_withdraw_stake(position, self.epoch)
    }

    /// Convert a principal position into pool tokens.
    ///
    /// # Errors
    /// Returns `StakesetError::IncompatiblePositions` for a position that is
    /// already fungible.
    pub fn convert_to_fungible_stake(
        &mut self,
        position: StakePosition,
    ) -> Result<StakePosition, StakesetError> {
        match position {
            StakePosition::Principal(stake) => self
                .validators
                .convert_to_fungible_stake(stake, self.epoch)
                .map(StakePosition::Fungible),
            StakePosition::Fungible(_) => Err(StakesetError::IncompatiblePositions),
        }
    }

    // -----------------------------------------------------------------
    // Operators
    // -----------------------------------------------------------------

    pub fn request_add_validator_candidate(
        &mut self,
        sender: Address,
        metadata: ValidatorMetadata,
        gas_price: u64,
        commission_rate: u64,
    ) -> Result<OperationCap, StakesetError> {
        if metadata.address != sender {
            return Err(StakesetError::InvalidState(format!(
                "sender {} cannot register validator {}",
                sender, metadata.address
            )));
        }
        self.validators
            .request_add_validator_candidate(metadata, gas_price, commission_rate)
    }

    pub fn request_remove_validator_candidate(&mut self, cap: &OperationCap) -> Result<(), StakesetError> {
        self.validators
            .request_remove_validator_candidate(cap, self.epoch)
    }

    pub fn request_add_validator(&mut self, cap: &OperationCap) -> Result<(), StakesetError> {
        self.validators.request_add_validator(cap, &self.parameters)
    }

    pub fn request_remove_validator(&mut self, cap: &OperationCap) -> Result<(), StakesetError> {
        self.validators
            .request_remove_validator(cap, &self.parameters)
    }

    pub fn request_set_gas_price(&mut self, cap: &OperationCap, price: u64) -> Result<(), StakesetError> {
        self.validators.request_set_gas_price(cap, price)
    }

    pub fn request_set_commission_rate(
        &mut self,
        cap: &OperationCap,
        rate: u64,
    ) -> Result<(), StakesetError> {
        self.validators.request_set_commission_rate(cap, rate)
    }

    /// File a tallying-rule report against an active peer.
    pub fn report_validator(&mut self, cap: &OperationCap, reportee: Address) -> Result<(), StakesetError> {
        let verified = self.validators.verify_cap(cap, CapScope::Active)?;
        if !self.validators.is_active_validator(&reportee) {
            return Err(StakesetError::NotAValidator(reportee));
        }
        self.validator_report_records
            .report(verified.validator_address(), reportee)
    }

    pub fn undo_report_validator(
        &mut self,
        cap: &OperationCap,
        reportee: Address,
    ) -> Result<(), StakesetError> {
        let verified = self.validators.verify_cap(cap, CapScope::Active)?;
        self.validator_report_records
            .undo_report(verified.validator_address(), reportee)
    }

    pub fn rotate_operation_cap(&mut self, cap: &OperationCap) -> Result<OperationCap, StakesetError> {
        self.validators.rotate_operation_cap(cap)
    }

    pub fn stage_next_epoch_network_address(
        &mut self,
        cap: &OperationCap,
        network_address: String,
    ) -> Result<(), StakesetError> {
        self.validators
            .stage_next_epoch_network_address(cap, network_address)
    }

    pub fn stage_next_epoch_protocol_pubkey(
        &mut self,
        cap: &OperationCap,
        protocol_pubkey: String,
    ) -> Result<(), StakesetError> {
        self.validators
            .stage_next_epoch_protocol_pubkey(cap, protocol_pubkey)
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn protocol_version(&self) -> u64 {
        self.protocol_version
    }

    pub fn system_state_version(&self) -> u64 {
        self.system_state_version
    }

    pub fn is_safe_mode(&self) -> bool {
        self.safe_mode
    }

    pub fn epoch_start_timestamp_ms(&self) -> u64 {
        self.epoch_start_timestamp_ms
    }

    pub fn parameters(&self) -> &SystemParameters {
        &self.parameters
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn storage_fund(&self) -> &StorageFund {
        &self.storage_fund
    }

    pub fn stake_subsidy(&self) -> &StakeSubsidy {
        &self.stake_subsidy
    }

    pub fn report_records(&self) -> &ReportRecords {
        &self.validator_report_records
    }

    pub fn reference_gas_price(&self) -> u64 {
        self.reference_gas_price
    }

    pub fn total_stake(&self) -> u64 {
        self.validators.total_stake()
    }

    pub fn active_validator_addresses(&self) -> Vec<Address> {
        self.validators.active_validator_addresses()
    }

    pub fn validator_voting_power(&self, address: &Address) -> Result<u64, StakesetError> {
        self.validators.validator_voting_power(address)
    }

    pub fn validator_stake_amount(&self, address: &Address) -> Result<u64, StakesetError> {
        self.validators.validator_stake_amount(address)
    }

    pub fn pending_stake_amount(&self, address: &Address) -> Result<u64, StakesetError> {
        self.validators.pending_stake_amount(address)
    }

    pub fn pending_withdraw_amount(&self, address: &Address) -> Result<u64, StakesetError> {
        self.validators.pending_withdraw_amount(address)
    }

    pub fn validator_address_by_pool(&self, pool_id: &PoolId) -> Result<Address, StakesetError> {
        self.validators.validator_address_by_pool(pool_id)
    }

    pub fn pool_exchange_rates(&self, pool_id: &PoolId) -> Result<&ExchangeRateLedger, StakesetError> {
        self.validators.pool_exchange_rates(pool_id)
    }

    pub fn pool_exchange_rate_at(&self, pool_id: &PoolId, epoch: u64) -> Result<ExchangeRate, StakesetError> {
        self.validators.pool_exchange_rate_at(pool_id, epoch)
    }

    /// Current native value of a fungible position.
    pub fn fungible_stake_value(&self, stake: &FungibleStake) -> Result<u64, StakesetError> {
        self.validators
            .pool_exchange_rate_at(&stake.pool_id(), self.epoch)?
            .value_for(stake.pool_tokens())
    }

    /// Held-back inflows: (storage rewards, computation rewards).
    pub fn safe_mode_rewards(&self) -> (u64, u64) {
        (
            self.safe_mode_storage_rewards.value(),
            self.safe_mode_computation_rewards.value(),
        )
    }

    /// Value held by the state itself: pool reward reserves, fungible
    /// principal, the storage fund, the subsidy fund, safe-mode
    /// accumulators and undelivered reward stakes. Principal positions are
    /// held by their owners and are not counted.
    pub fn total_value_held(&self) -> u128 {
        let pools: u128 = self
            .validators
            .all_validators()
            .map(|v| {
                let pool = v.staking_pool();
                pool.rewards_balance() as u128
                    + pool.fungible_supply().map_or(0, |f| f.principal()) as u128
            })
            .sum();
        let inbox: u128 = self
            .validator_reward_stakes
            .values()
            .flatten()
            .map(|s| s.amount() as u128)
            .sum();
        pools
            + inbox
            + self.storage_fund.total_balance() as u128
            + self.stake_subsidy.balance() as u128
            + self.safe_mode_storage_rewards.value() as u128
            + self.safe_mode_computation_rewards.value() as u128
    }
}

/// Storage fund's share of `computation_charge`, proportional to its size
/// against total stake.
pub fn storage_fund_reward_share(
    storage_fund_balance: u64,
    total_validator_stake: u64,
    computation_charge: u64,
) -> Result<u64, StakesetError> {
    let total = storage_fund_balance as u128 + total_validator_stake as u128;
    if total == 0 {
        return Ok(0);
    }
    let share = storage_fund_balance as u128 * computation_charge as u128 / total;
    u64::try_from(share).map_err(|_| StakesetError::ArithmeticOverflow("storage fund reward"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::Validator;
    use stakeset_economics::NANOS_PER_TOKEN;

    fn state(stakes: &[u64]) -> (SystemState, Vec<OperationCap>) {
        state_with(stakes, 0, 0)
    }

    fn state_with(
        stakes: &[u64],
        storage_fund: u64,
        subsidy_per_epoch: u64,
    ) -> (SystemState, Vec<OperationCap>) {
        let mut validators = Vec::new();
        let mut caps = Vec::new();
        for (i, &stake) in stakes.iter().enumerate() {
            let n = i as u64 + 1;
            let metadata = ValidatorMetadata::new(
                Address::from_low_u64(n),
                format!("v{}", n),
                format!("/dns/v{}", n),
                format!("{:02x}", n),
            );
            let (mut v, cap) = Validator::new(metadata, 1_000, 0).unwrap();
            let _position = v.request_add_stake_at_genesis(Balance::new(stake)).unwrap();
            validators.push(v);
            caps.push(cap);
        }
        let params = SystemParameters {
            min_validator_count: 1,
            validator_low_stake_threshold: 0,
            validator_very_low_stake_threshold: 0,
            epoch_duration_ms: 0,
            ..SystemParameters::default()
        };
        let subsidy = StakeSubsidy::new(
            Balance::new(subsidy_per_epoch * 10),
            subsidy_per_epoch,
            1,
            0,
        )
        .unwrap();
        let set = ValidatorSet::new(validators, 0).unwrap();
        let state =
            SystemState::new(set, Balance::new(storage_fund), subsidy, params, 1, 0).unwrap();
        (state, caps)
    }

    fn epoch_params(new_epoch: u64) -> AdvanceEpochParams {
        AdvanceEpochParams {
            new_epoch,
            next_protocol_version: 1,
            epoch_start_timestamp_ms: new_epoch * 1_000,
            ..AdvanceEpochParams::default()
        }
    }

    #[test]
    fn test_only_system_may_advance() {
        let (mut state, _) = state(&[100, 100]);
        let caller = Address::from_low_u64(1);
        assert_eq!(
            state
                .advance_epoch(caller, &epoch_params(1), Balance::zero(), Balance::zero())
                .unwrap_err(),
            StakesetError::NotSystemAddress(caller)
        );
    }

    #[test]
    fn test_must_advance_one_epoch() {
        let (mut state, _) = state(&[100, 100]);
        assert_eq!(
            state
                .advance_epoch(SYSTEM_ADDRESS, &epoch_params(2), Balance::zero(), Balance::zero())
                .unwrap_err(),
            StakesetError::AdvancedToWrongEpoch {
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn test_rate_above_100_percent_enters_safe_mode() {
        let (mut state, _) = state(&[100, 100]);
        let params = AdvanceEpochParams {
            reward_slashing_rate: 10_001,
            storage_charge: 30,
            computation_charge: 70,
            ..epoch_params(1)
        };
        let outcome = state
            .advance_epoch_or_safe_mode(SYSTEM_ADDRESS, &params)
            .unwrap();
        assert!(outcome.safe_mode);
        assert_eq!(outcome.error, Some(StakesetError::BpsTooLarge(10_001)));
        assert_eq!(state.epoch(), 1);
        assert!(state.is_safe_mode());
        assert_eq!(state.safe_mode_rewards(), (30, 70));
    }

    #[test]
    fn test_reward_stakes_collected_for_validators() {
        let (mut state, _) = state(&[100, 100]);
        let params = AdvanceEpochParams {
            computation_charge: 1_000,
            ..epoch_params(1)
        };
        let outcome = state
            .advance_epoch_or_safe_mode(SYSTEM_ADDRESS, &params)
            .unwrap();
        assert!(!outcome.safe_mode);
        // No commission and no storage fund: all reward goes to stakers.
        assert!(state.take_validator_reward_stakes(&Address::from_low_u64(1)).is_empty());
        assert_eq!(state.validator_stake_amount(&Address::from_low_u64(1)).unwrap(), 600);
    }

    #[test]
    fn test_subsidy_goes_entirely_to_stakers() {
        let (mut state, _) = state_with(&[500_000, 500_000], 1_000_000, 1_000);
        let params = AdvanceEpochParams {
            storage_fund_reinvest_rate: 10_000,
            ..epoch_params(1)
        };
        let outcome = state
            .advance_epoch_or_safe_mode(SYSTEM_ADDRESS, &params)
            .unwrap();
        assert!(!outcome.safe_mode);
        assert_eq!(state.storage_fund().total_balance(), 1_000_000);
        assert_eq!(state.validator_stake_amount(&Address::from_low_u64(1)).unwrap(), 500_500);
        assert_eq!(state.validator_stake_amount(&Address::from_low_u64(2)).unwrap(), 500_500);
        assert_eq!(state.stake_subsidy().balance(), 9_000);
    }

    #[test]
    fn test_storage_fund_share_uses_charge_alongside_subsidy() {
        let (mut state, _) = state_with(&[500_000, 500_000], 1_000_000, 1_000);
        let params = AdvanceEpochParams {
            computation_charge: 2_000,
            storage_fund_reinvest_rate: 10_000,
            ..epoch_params(1)
        };
        state
            .advance_epoch_or_safe_mode(SYSTEM_ADDRESS, &params)
            .unwrap();
        // Half of the 2_000 charge is the fund's share, all of it reinvested.
        assert_eq!(state.storage_fund().total_balance(), 1_001_000);
        assert_eq!(state.validator_stake_amount(&Address::from_low_u64(1)).unwrap(), 501_000);
    }

    #[test]
    fn test_safe_mode_accumulators_saturate() {
        let (mut state, _) = state(&[100, 100]);
        let params = AdvanceEpochParams {
            storage_rebate: u64::MAX,
            non_refundable_storage_fee: u64::MAX,
            ..epoch_params(1)
        };
        state.advance_epoch_safe_mode(&params, Balance::zero(), Balance::zero());
        state.advance_epoch_safe_mode(
            &AdvanceEpochParams { new_epoch: 2, ..params },
            Balance::zero(),
            Balance::zero(),
        );
        assert_eq!(state.epoch(), 2);
        assert_eq!(state.safe_mode_storage_rebates, u64::MAX);
        assert_eq!(state.safe_mode_non_refundable_storage_fee, u64::MAX);

        let outcome = state
            .advance_epoch_or_safe_mode(
                SYSTEM_ADDRESS,
                &AdvanceEpochParams {
                    storage_rebate: 1,
                    ..epoch_params(3)
                },
            )
            .unwrap();
        assert!(outcome.safe_mode);
        assert_eq!(
            outcome.error,
            Some(StakesetError::ArithmeticOverflow("storage rebate"))
        );
        assert_eq!(state.epoch(), 3);
    }

    #[test]
    fn test_report_requires_active_reportee() {
        let (mut state, caps) = state(&[100, 100]);
        assert_eq!(
            state
                .report_validator(&caps[0], Address::from_low_u64(9))
                .unwrap_err(),
            StakesetError::NotAValidator(Address::from_low_u64(9))
        );
        state.report_validator(&caps[0], Address::from_low_u64(2)).unwrap();
        assert_eq!(state.report_records().report_count(&Address::from_low_u64(2)), 1);
    }

    #[test]
    fn test_snapshot_restores_identical_state() {
        let (state, _) = state(&[100, 250]);
        let snapshot = state.snapshot().unwrap();
        let restored = SystemState::restore(&snapshot).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_storage_fund_reward_share() {
        assert_eq!(storage_fund_reward_share(0, 0, 100).unwrap(), 0);
        assert_eq!(storage_fund_reward_share(100, 300, 1_000).unwrap(), 250);
        assert_eq!(
            storage_fund_reward_share(u64::MAX, u64::MAX, 10).unwrap(),
            5
        );
    }

    #[test]
    fn test_convert_fungible_twice_rejected() {
        let (mut state, _) = state(&[100 * NANOS_PER_TOKEN, 100 * NANOS_PER_TOKEN]);
        let position = state
            .request_add_stake(Address::from_low_u64(1), Balance::new(NANOS_PER_TOKEN))
            .unwrap();
        state
            .advance_epoch_or_safe_mode(SYSTEM_ADDRESS, &epoch_params(1))
            .unwrap();
        let fungible = state.convert_to_fungible_stake(position).unwrap();
        assert!(fungible.is_fungible());
        assert_eq!(
            state.convert_to_fungible_stake(fungible).unwrap_err(),
            StakesetError::IncompatiblePositions
        );
    }
}
