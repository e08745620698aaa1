// crates/stakeset-system/src/validator_set.rs
//
// The validator committee and its epoch-boundary state machine.
//
// Lifecycle: candidate -> pending-active -> active -> inactive. Candidates
// and inactive validators live in versioned tables; the active list is
// index-addressed (removals are recorded by index). Inactive validators are
// kept forever, keyed by pool id, so their delegators can still withdraw.
//
// `advance_epoch` runs the boundary in a fixed order:
//   1. distribute rewards into every active pool
//   2. apply staged gas prices and commission rates
//   3. settle every active pool at the new epoch
//   4. per-validator telemetry
//   5. admit pending-active validators (their pools activate at the new epoch)
//   6. voluntary removals, highest index first
//   7. low-stake departures, scanning in reverse index order
//   8. recompute total stake and voting power
//   9. apply staged metadata

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::capability::{CapScope, OperationCap, VerifiedCap};
use crate::params::SystemParameters;
use crate::reference_price::derive_reference_gas_price;
use crate::validator::{Validator, ValidatorMetadata};
use crate::versioned::VersionedValidator;
use crate::voting_power::{derive_voting_powers, QUORUM_THRESHOLD, TOTAL_VOTING_POWER};
use stakeset_core::{Address, PoolId, StakesetError};
use stakeset_economics::{
    compute_reward_shares, compute_slashed_validators, split_commission, Balance,
    ExchangeRate, ExchangeRateLedger, FungibleStake, PrincipalStake, ReportRecords,
    StakePosition, MIN_STAKING_THRESHOLD,
};

/// Why a validator left the active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepartureReason {
    /// Requested removal.
    Voluntary,
    /// Below the low-stake threshold for longer than the grace period.
    LowStakeGracePeriod,
    /// Below the very-low-stake threshold.
    VeryLowStake,
}

/// Membership changes and reward positions produced by one boundary.
#[derive(Debug, Default)]
pub struct EpochChanges {
    /// Commission and storage-fund cut minted as stake for each validator.
    pub validator_rewards: Vec<(Address, PrincipalStake)>,
    pub joined: Vec<Address>,
    pub departed: Vec<(Address, DepartureReason)>,
    pub slashed: BTreeSet<Address>,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    /// Sum of active validators' stake as of the last boundary.
    total_stake: u64,
    active_validators: Vec<Validator>,
    pending_active_validators: Vec<Validator>,
    /// Indices into `active_validators` leaving at the next boundary.
    pending_removals: Vec<usize>,
    /// Pool id -> address for every active, pending and candidate validator.
    staking_pool_mappings: BTreeMap<PoolId, Address>,
    /// Deactivated validators, kept for historical withdrawals.
    inactive_validators: BTreeMap<PoolId, VersionedValidator>,
    validator_candidates: BTreeMap<Address, VersionedValidator>,
    /// Consecutive epochs each active validator has spent below the low threshold.
    at_risk_validators: BTreeMap<Address, u64>,
}

impl ValidatorSet {
    /// Build the genesis committee. Pools activate at `epoch`.
    ///
    /// # Errors
    /// Returns `StakesetError::DuplicateValidator` if two validators share
    /// any identity field.
    pub fn new(mut validators: Vec<Validator>, epoch: u64) -> Result<Self, StakesetError> {
        for (i, a) in validators.iter().enumerate() {
            if validators[i + 1..]
                .iter()
                .any(|b| a.metadata().is_duplicate(b.metadata()))
            {
                return Err(StakesetError::DuplicateValidator(a.address()));
            }
        }
        let mut staking_pool_mappings = BTreeMap::new();
        for validator in validators.iter_mut() {
            validator.activate(epoch)?;
            staking_pool_mappings.insert(validator.pool_id(), validator.address());
        }
        let mut set = Self {
            active_validators: validators,
            staking_pool_mappings,
            ..Self::default()
        };
        set.recompute_stake_and_voting_power()?;
        Ok(set)
    }

    // -----------------------------------------------------------------
    // Capabilities
    // -----------------------------------------------------------------

    /// Resolve the validator named by `cap` within `scope` and check the cap
    /// against the id registered on it.
    ///
    /// # Errors
    /// - `StakesetError::NotAValidator` / `NotACandidate` if the authorizer is
    ///   not in scope.
    /// - `StakesetError::InvalidCap` if the id does not match.
    pub fn verify_cap(
        &self,
        cap: &OperationCap,
        scope: CapScope,
    ) -> Result<VerifiedCap, StakesetError> {
        let address = cap.authorizer();
        let validator = match scope {
            CapScope::Active => self.active_validator(&address),
            CapScope::Candidate => self.candidate(&address),
            CapScope::Any => self
                .active_validator(&address)
                .or_else(|| self.pending_validator(&address))
                .or_else(|| self.candidate(&address)),
        };
        let validator = validator.ok_or(match scope {
            CapScope::Candidate => StakesetError::NotACandidate(address),
            _ => StakesetError::NotAValidator(address),
        })?;
        if validator.operation_cap_id() != cap.id() {
            return Err(StakesetError::InvalidCap(address));
        }
        Ok(VerifiedCap::new(address))
    }

    /// Issue a new cap for the cap holder's validator, invalidating `cap`.
    pub fn rotate_operation_cap(
        &mut self,
        cap: &OperationCap,
    ) -> Result<OperationCap, StakesetError> {
        let verified = self.verify_cap(cap, CapScope::Any)?;
        let validator = self.validator_mut(&verified.validator_address())?;
        Ok(validator.rotate_operation_cap())
    }

    // -----------------------------------------------------------------
    // Membership requests
    // -----------------------------------------------------------------

    /// Register a new candidate.
    ///
    /// # Errors
    /// - `StakesetError::AlreadyCandidate` if the address is a candidate.
    /// - `StakesetError::DuplicateValidator` if any identity field collides
    ///   with an active, pending or candidate validator.
    pub fn request_add_validator_candidate(
        &mut self,
        metadata: ValidatorMetadata,
        gas_price: u64,
        commission_rate: u64,
    ) -> Result<OperationCap, StakesetError> {
        let address = metadata.address;
        if self.validator_candidates.contains_key(&address) {
            return Err(StakesetError::AlreadyCandidate(address));
        }
        // Pool ids derive from the address, and retired pools are kept forever.
        if self.is_duplicate(&metadata, None)
            || self.inactive_validators.contains_key(&PoolId::derive(&address))
        {
            return Err(StakesetError::DuplicateValidator(address));
        }
        let (validator, cap) = Validator::new(metadata, gas_price, commission_rate)?;
        self.staking_pool_mappings
            .insert(validator.pool_id(), address);
        self.validator_candidates
            .insert(address, VersionedValidator::new(validator));
        tracing::info!(validator = %address.short(), "validator candidate registered");
        Ok(cap)
    }

    /// Withdraw a candidacy. The pool is deactivated at `epoch` and retained.
    pub fn request_remove_validator_candidate(
        &mut self,
        cap: &OperationCap,
        epoch: u64,
    ) -> Result<(), StakesetError> {
        let verified = self.verify_cap(cap, CapScope::Candidate)?;
        let address = verified.validator_address();
        let mut validator = self
            .validator_candidates
            .remove(&address)
            .ok_or(StakesetError::NotACandidate(address))?
            .into_validator();
        validator.deactivate(epoch)?;
        self.staking_pool_mappings.remove(&validator.pool_id());
        self.inactive_validators
            .insert(validator.pool_id(), VersionedValidator::new(validator));
        tracing::info!(validator = %address.short(), "validator candidate withdrawn");
        Ok(())
    }

    /// Promote a candidate to pending-active.
    ///
    /// # Errors
    /// - `StakesetError::MinJoiningStakeNotReached` below the joining stake.
    /// - `StakesetError::LimitExceeded` if the committee is full.
    /// - `StakesetError::DuplicateValidator` on identity collision.
    pub fn request_add_validator(
        &mut self,
        cap: &OperationCap,
        params: &SystemParameters,
    ) -> Result<(), StakesetError> {
        let verified = self.verify_cap(cap, CapScope::Candidate)?;
        let address = verified.validator_address();
        if self.next_epoch_validator_count() as u64 >= params.max_validator_count {
            return Err(StakesetError::LimitExceeded(format!(
                "committee already has {} of at most {} validators",
                self.next_epoch_validator_count(),
                params.max_validator_count
            )));
        }
        let candidate = self
            .validator_candidates
            .get(&address)
            .ok_or(StakesetError::NotACandidate(address))?
            .validator();
        let stake = candidate.stake_amount();
        if stake < params.min_validator_joining_stake {
            return Err(StakesetError::MinJoiningStakeNotReached {
                stake,
                minimum: params.min_validator_joining_stake,
            });
        }
        if self.is_duplicate(candidate.metadata(), Some(&address)) {
            return Err(StakesetError::DuplicateValidator(address));
        }
        let validator = self
            .validator_candidates
            .remove(&address)
            .ok_or(StakesetError::NotACandidate(address))?
            .into_validator();
        self.pending_active_validators.push(validator);
        tracing::info!(validator = %address.short(), stake, "validator pending activation");
        Ok(())
    }

    /// Schedule an active validator's departure at the next boundary.
    ///
    /// # Errors
    /// - `StakesetError::ValidatorAlreadyRemoved` if already scheduled.
    /// - `StakesetError::LimitExceeded` if the committee would drop below
    ///   `min_validator_count`.
    pub fn request_remove_validator(
        &mut self,
        cap: &OperationCap,
        params: &SystemParameters,
    ) -> Result<(), StakesetError> {
        let verified = self.verify_cap(cap, CapScope::Active)?;
        let address = verified.validator_address();
        let index = self
            .active_index(&address)
            .ok_or(StakesetError::NotAValidator(address))?;
        if self.pending_removals.contains(&index) {
            return Err(StakesetError::ValidatorAlreadyRemoved(address));
        }
        let next_count = self.next_epoch_validator_count() as u64;
        if self.active_validators.len() as u64 >= params.min_validator_count
            && next_count <= params.min_validator_count
        {
            return Err(StakesetError::LimitExceeded(format!(
                "removing {} would leave {} validators, minimum is {}",
                address,
                next_count.saturating_sub(1),
                params.min_validator_count
            )));
        }
        self.pending_removals.push(index);
        tracing::info!(validator = %address.short(), "validator removal requested");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Operator settings
    // -----------------------------------------------------------------

    /// Stage a gas price for next epoch, or apply it now for a candidate.
    pub fn request_set_gas_price(
        &mut self,
        cap: &OperationCap,
        price: u64,
    ) -> Result<(), StakesetError> {
        let verified = self.verify_cap(cap, CapScope::Any)?;
        let address = verified.validator_address();
        if self.validator_candidates.contains_key(&address) {
            self.validator_mut(&address)?.set_candidate_gas_price(price)
        } else {
            self.validator_mut(&address)?.request_set_gas_price(price)
        }
    }

    /// Stage a commission rate for next epoch, or apply it now for a candidate.
    pub fn request_set_commission_rate(
        &mut self,
        cap: &OperationCap,
        rate: u64,
    ) -> Result<(), StakesetError> {
        let verified = self.verify_cap(cap, CapScope::Any)?;
        let address = verified.validator_address();
        if self.validator_candidates.contains_key(&address) {
            self.validator_mut(&address)?
                .set_candidate_commission_rate(rate)
        } else {
            self.validator_mut(&address)?
                .request_set_commission_rate(rate)
        }
    }

    pub fn stage_next_epoch_network_address(
        &mut self,
        cap: &OperationCap,
        network_address: String,
    ) -> Result<(), StakesetError> {
        let verified = self.verify_cap(cap, CapScope::Any)?;
        let address = verified.validator_address();
        let mut probe = self.validator(&address)?.metadata().clone();
        probe.next_epoch_network_address = Some(network_address.clone());
        if self.is_duplicate(&probe, Some(&address)) {
            return Err(StakesetError::DuplicateValidator(address));
        }
        let is_candidate = self.validator_candidates.contains_key(&address);
        let validator = self.validator_mut(&address)?;
        if is_candidate {
            validator.set_candidate_network_address(network_address);
        } else {
            validator.stage_next_epoch_network_address(network_address);
        }
        Ok(())
    }

    pub fn stage_next_epoch_protocol_pubkey(
        &mut self,
        cap: &OperationCap,
        protocol_pubkey: String,
    ) -> Result<(), StakesetError> {
        let verified = self.verify_cap(cap, CapScope::Any)?;
        let address = verified.validator_address();
        let mut probe = self.validator(&address)?.metadata().clone();
        probe.next_epoch_protocol_pubkey = Some(protocol_pubkey.clone());
        if self.is_duplicate(&probe, Some(&address)) {
            return Err(StakesetError::DuplicateValidator(address));
        }
        let is_candidate = self.validator_candidates.contains_key(&address);
        let validator = self.validator_mut(&address)?;
        if is_candidate {
            validator.set_candidate_protocol_pubkey(protocol_pubkey);
        } else {
            validator.stage_next_epoch_protocol_pubkey(protocol_pubkey);
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Delegator requests
    // -----------------------------------------------------------------

    /// Stake with an active, pending or candidate validator during `epoch`.
    ///
    /// # Errors
    /// - `StakesetError::BelowMinimumStake` under `MIN_STAKING_THRESHOLD`.
    /// - `StakesetError::NotAValidator` for an unknown or departed validator.
    pub fn request_add_stake(
        &mut self,
        validator_address: Address,
        stake: Balance,
        epoch: u64,
    ) -> Result<PrincipalStake, StakesetError> {
        if stake.value() < MIN_STAKING_THRESHOLD {
            return Err(StakesetError::BelowMinimumStake {
                amount: stake.value(),
                minimum: MIN_STAKING_THRESHOLD,
            });
        }
        self.validator_mut(&validator_address)?
            .request_add_stake(stake, epoch)
    }

    /// Withdraw a position from whichever pool issued it, including pools of
    /// departed validators.
    pub fn request_withdraw_stake(
        &mut self,
        position: StakePosition,
        epoch: u64,
    ) -> Result<Balance, StakesetError> {
        let pool_id = position.pool_id();
        self.validator_by_pool_mut(&pool_id)?
            .request_withdraw_stake(position, epoch)
    }

    pub fn convert_to_fungible_stake(
        &mut self,
        stake: PrincipalStake,
        epoch: u64,
    ) -> Result<FungibleStake, StakesetError> {
        let pool_id = stake.pool_id();
        self.validator_by_pool_mut(&pool_id)?
            .convert_to_fungible_stake(stake, epoch)
    }

    // -----------------------------------------------------------------
    // Epoch boundary
    // -----------------------------------------------------------------

    /// Run the boundary into `new_epoch`.
    ///
    /// Rewards are split out of `computation_reward` and `storage_fund_reward`;
    /// whatever truncation leaves behind stays in them for the caller.
    pub fn advance_epoch(
        &mut self,
        new_epoch: u64,
        computation_reward: &mut Balance,
        storage_fund_reward: &mut Balance,
        report_records: &mut ReportRecords,
        reward_slashing_rate: u64,
        params: &SystemParameters,
    ) -> Result<EpochChanges, StakesetError> {
        let mut changes = EpochChanges::default();

        // 1. Rewards.
        changes.slashed = compute_slashed_validators(report_records, QUORUM_THRESHOLD, |a| {
            self.active_validator(a).map(Validator::voting_power)
        })?;
        changes.validator_rewards = self.distribute_rewards(
            new_epoch,
            computation_reward,
            storage_fund_reward,
            &changes.slashed,
            reward_slashing_rate,
        )?;

        // 2-3. Staged settings, then settlement.
        for validator in self.active_validators.iter_mut() {
            validator.adjust_stake_and_gas_price();
            validator.settle(new_epoch)?;
        }

        // 4. Telemetry.
        for validator in &self.active_validators {
            let rate = validator.latest_exchange_rate();
            tracing::info!(
                epoch = new_epoch,
                validator = %validator.address().short(),
                stake = validator.stake_amount(),
                voting_power = validator.voting_power(),
                commission_rate = validator.commission_rate(),
                gas_price = validator.gas_price(),
                pool_value = rate.value,
                pool_tokens = rate.pool_tokens,
                reporters = report_records.report_count(&validator.address()),
                slashed = changes.slashed.contains(&validator.address()),
                "validator epoch info"
            );
        }

        // 5. Admissions.
        for mut validator in std::mem::take(&mut self.pending_active_validators) {
            validator.activate(new_epoch)?;
            tracing::info!(validator = %validator.address().short(), epoch = new_epoch, "validator joined");
            changes.joined.push(validator.address());
            self.active_validators.push(validator);
        }

        // 6. Voluntary removals, highest index first.
        let mut removals = std::mem::take(&mut self.pending_removals);
        removals.sort_unstable_by(|a, b| b.cmp(a));
        for index in removals {
            let address = self.depart(index, new_epoch, report_records)?;
            changes.departed.push((address, DepartureReason::Voluntary));
        }

        // 7. Low-stake departures.
        for index in (0..self.active_validators.len()).rev() {
            let validator = &self.active_validators[index];
            let address = validator.address();
            let stake = validator.stake_amount();
            let reason = if stake >= params.validator_low_stake_threshold {
                self.at_risk_validators.remove(&address);
                None
            } else if stake >= params.validator_very_low_stake_threshold {
                let epochs_at_risk = self.at_risk_validators.entry(address).or_insert(0);
                *epochs_at_risk += 1;
                tracing::warn!(
                    validator = %address.short(),
                    stake,
                    epochs_at_risk = *epochs_at_risk,
                    "validator below low stake threshold"
                );
                (*epochs_at_risk > params.validator_low_stake_grace_period)
                    .then_some(DepartureReason::LowStakeGracePeriod)
            } else {
                Some(DepartureReason::VeryLowStake)
            };
            if let Some(reason) = reason {
                self.depart(index, new_epoch, report_records)?;
                changes.departed.push((address, reason));
            }
        }

        // 8. Stake and voting power for the new committee.
        self.recompute_stake_and_voting_power()?;

        // 9. Staged metadata.
        for validator in self.active_validators.iter_mut() {
            validator.effectuate_staged_metadata();
        }

        Ok(changes)
    }

    fn distribute_rewards(
        &mut self,
        new_epoch: u64,
        computation_reward: &mut Balance,
        storage_fund_reward: &mut Balance,
        slashed: &BTreeSet<Address>,
        reward_slashing_rate: u64,
    ) -> Result<Vec<(Address, PrincipalStake)>, StakesetError> {
        let voting_powers: Vec<u64> = self
            .active_validators
            .iter()
            .map(Validator::voting_power)
            .collect();
        let slashed_indices: BTreeSet<usize> = self
            .active_validators
            .iter()
            .enumerate()
            .filter(|(_, v)| slashed.contains(&v.address()))
            .map(|(i, _)| i)
            .collect();
        let shares = compute_reward_shares(
            &voting_powers,
            TOTAL_VOTING_POWER,
            &slashed_indices,
            reward_slashing_rate,
            computation_reward.value(),
            storage_fund_reward.value(),
        )?;

        let mut validator_rewards = Vec::new();
        for (index, validator) in self.active_validators.iter_mut().enumerate() {
            let mut staker_reward = computation_reward.split(shares.staking[index])?;
            let (commission, _) = split_commission(staker_reward.value(), validator.commission_rate());
            let mut validator_reward = staker_reward.split(commission)?;
            validator_reward.join(storage_fund_reward.split(shares.storage[index])?);

            tracing::debug!(
                validator = %validator.address().short(),
                staker_reward = staker_reward.value(),
                validator_reward = validator_reward.value(),
                "reward distributed"
            );

            if validator_reward.value() > 0 {
                let stake = validator.request_add_stake(validator_reward, new_epoch.saturating_sub(1))?;
                validator_rewards.push((validator.address(), stake));
            } else {
                validator_reward.destroy_zero()?;
            }
            validator.deposit_stake_rewards(staker_reward)?;
        }
        Ok(validator_rewards)
    }

    /// Remove the active validator at `index`, clear its reports and retire its pool.
    fn depart(
        &mut self,
        index: usize,
        epoch: u64,
        report_records: &mut ReportRecords,
    ) -> Result<Address, StakesetError> {
        if index >= self.active_validators.len() {
            return Err(StakesetError::InvalidState(format!(
                "removal index {} out of range",
                index
            )));
        }
        let mut validator = self.active_validators.remove(index);
        let address = validator.address();
        report_records.clear_leaving(&address);
        self.at_risk_validators.remove(&address);
        self.staking_pool_mappings.remove(&validator.pool_id());
        validator.deactivate(epoch)?;
        tracing::info!(validator = %address.short(), epoch, "validator departed");
        self.inactive_validators
            .insert(validator.pool_id(), VersionedValidator::new(validator));
        Ok(address)
    }

    fn recompute_stake_and_voting_power(&mut self) -> Result<(), StakesetError> {
        let stakes: Vec<u64> = self
            .active_validators
            .iter()
            .map(Validator::stake_amount)
            .collect();
        self.total_stake = stakes
            .iter()
            .try_fold(0u64, |acc, &s| acc.checked_add(s))
            .ok_or(StakesetError::ArithmeticOverflow("total stake"))?;
        let powers = derive_voting_powers(&stakes)?;
        for (validator, power) in self.active_validators.iter_mut().zip(powers) {
            validator.set_voting_power(power);
        }
        Ok(())
    }

    /// Reference gas price of the current committee.
    pub fn derive_reference_gas_price(&self) -> u64 {
        derive_reference_gas_price(
            self.active_validators
                .iter()
                .map(|v| (v.gas_price(), v.voting_power())),
        )
    }

    // -----------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------

    fn active_index(&self, address: &Address) -> Option<usize> {
        self.active_validators
            .iter()
            .position(|v| v.address() == *address)
    }

    fn active_validator(&self, address: &Address) -> Option<&Validator> {
        self.active_validators.iter().find(|v| v.address() == *address)
    }

    fn pending_validator(&self, address: &Address) -> Option<&Validator> {
        self.pending_active_validators
            .iter()
            .find(|v| v.address() == *address)
    }

    fn candidate(&self, address: &Address) -> Option<&Validator> {
        self.validator_candidates
            .get(address)
            .map(VersionedValidator::validator)
    }

    /// Active, pending or candidate validator by address.
    pub fn validator(&self, address: &Address) -> Result<&Validator, StakesetError> {
        self.active_validator(address)
            .or_else(|| self.pending_validator(address))
            .or_else(|| self.candidate(address))
            .ok_or(StakesetError::NotAValidator(*address))
    }

    fn validator_mut(&mut self, address: &Address) -> Result<&mut Validator, StakesetError> {
        if let Some(i) = self.active_index(address) {
            return Ok(&mut self.active_validators[i]);
        }
        if let Some(i) = self
            .pending_active_validators
            .iter()
            .position(|v| v.address() == *address)
        {
            return Ok(&mut self.pending_active_validators[i]);
        }
        self.validator_candidates
            .get_mut(address)
            .map(VersionedValidator::load_validator_maybe_upgrade)
            .ok_or(StakesetError::NotAValidator(*address))
    }

    fn validator_by_pool_mut(&mut self, pool_id: &PoolId) -> Result<&mut Validator, StakesetError> {
        if let Some(address) = self.staking_pool_mappings.get(pool_id).copied() {
            return self.validator_mut(&address);
        }
        self.inactive_validators
            .get_mut(pool_id)
            .map(VersionedValidator::load_validator_maybe_upgrade)
            .ok_or(StakesetError::NoPoolFound(*pool_id))
    }

    fn validator_by_pool(&self, pool_id: &PoolId) -> Result<&Validator, StakesetError> {
        if let Some(address) = self.staking_pool_mappings.get(pool_id) {
            return self.validator(address);
        }
        self.inactive_validators
            .get(pool_id)
            .map(VersionedValidator::validator)
            .ok_or(StakesetError::NoPoolFound(*pool_id))
    }

    /// Whether metadata collides with any active, pending or candidate
    /// validator other than `except`.
    fn is_duplicate(&self, metadata: &ValidatorMetadata, except: Option<&Address>) -> bool {
        self.active_validators
            .iter()
            .chain(self.pending_active_validators.iter())
            .chain(self.validator_candidates.values().map(VersionedValidator::validator))
            .filter(|v| Some(&v.address()) != except)
            .any(|v| v.metadata().is_duplicate(metadata))
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    pub fn total_stake(&self) -> u64 {
        self.total_stake
    }

    pub fn active_validators(&self) -> &[Validator] {
        &self.active_validators
    }

    pub fn pending_active_validators(&self) -> &[Validator] {
        &self.pending_active_validators
    }

    pub fn pending_removals(&self) -> &[usize] {
        &self.pending_removals
    }

    pub fn active_validator_addresses(&self) -> Vec<Address> {
        self.active_validators.iter().map(Validator::address).collect()
    }

    pub fn is_active_validator(&self, address: &Address) -> bool {
        self.active_validator(address).is_some()
    }

    pub fn is_candidate(&self, address: &Address) -> bool {
        self.validator_candidates.contains_key(address)
    }

    /// Active validators after pending admissions and removals.
    pub fn next_epoch_validator_count(&self) -> usize {
        self.active_validators.len() - self.pending_removals.len()
            + self.pending_active_validators.len()
    }

    pub fn validator_voting_power(&self, address: &Address) -> Result<u64, StakesetError> {
        self.active_validator(address)
            .map(Validator::voting_power)
            .ok_or(StakesetError::NotAValidator(*address))
    }

    pub fn validator_stake_amount(&self, address: &Address) -> Result<u64, StakesetError> {
        self.validator(address).map(Validator::stake_amount)
    }

    pub fn pending_stake_amount(&self, address: &Address) -> Result<u64, StakesetError> {
        self.validator(address).map(Validator::pending_stake_amount)
    }

    pub fn pending_withdraw_amount(&self, address: &Address) -> Result<u64, StakesetError> {
        self.validator(address).map(Validator::pending_withdraw_amount)
    }

    pub fn validator_address_by_pool(&self, pool_id: &PoolId) -> Result<Address, StakesetError> {
        self.staking_pool_mappings
            .get(pool_id)
            .copied()
            .ok_or(StakesetError::NoPoolFound(*pool_id))
    }

    pub fn pool_exchange_rates(&self, pool_id: &PoolId) -> Result<&ExchangeRateLedger, StakesetError> {
        self.validator_by_pool(pool_id)
            .map(|v| v.staking_pool().exchange_rates())
    }

    pub fn pool_exchange_rate_at(
        &self,
        pool_id: &PoolId,
        epoch: u64,
    ) -> Result<ExchangeRate, StakesetError> {
        self.validator_by_pool(pool_id)
            .map(|v| v.staking_pool().rate_at_epoch(epoch))
    }

    pub fn at_risk_epochs(&self, address: &Address) -> u64 {
        self.at_risk_validators.get(address).copied().unwrap_or(0)
    }

    pub fn inactive_validator(&self, pool_id: &PoolId) -> Option<&Validator> {
        self.inactive_validators
            .get(pool_id)
            .map(VersionedValidator::validator)
    }

    /// Every validator ever registered: active, pending, candidate, inactive.
    pub fn all_validators(&self) -> impl Iterator<Item = &Validator> {
        self.active_validators
            .iter()
            .chain(self.pending_active_validators.iter())
            .chain(self.validator_candidates.values().map(VersionedValidator::validator))
            .chain(self.inactive_validators.values().map(VersionedValidator::validator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakeset_economics::NANOS_PER_TOKEN;

    fn metadata(n: u64) -> ValidatorMetadata {
        ValidatorMetadata::new(
            Address::from_low_u64(n),
            format!("validator-{}", n),
            format!("/dns/v{}.example/tcp/8080", n),
            format!("{:064x}", n),
        )
    }

    fn params() -> SystemParameters {
        SystemParameters {
            min_validator_count: 1,
            min_validator_joining_stake: 100 * NANOS_PER_TOKEN,
            validator_low_stake_threshold: 50 * NANOS_PER_TOKEN,
            validator_very_low_stake_threshold: 10 * NANOS_PER_TOKEN,
            validator_low_stake_grace_period: 2,
            ..SystemParameters::default()
        }
    }

    /// Genesis set with one validator per stake (in tokens), addresses 1..=n.
    fn genesis(stakes: &[u64]) -> (ValidatorSet, Vec<OperationCap>) {
        let mut validators = Vec::new();
        let mut caps = Vec::new();
        for (i, &stake) in stakes.iter().enumerate() {
            let (mut v, cap) = Validator::new(metadata(i as u64 + 1), 1_000, 1_000).unwrap();
            let _position = v
                .request_add_stake(Balance::new(stake * NANOS_PER_TOKEN), 0)
                .unwrap();
            validators.push(v);
            caps.push(cap);
        }
        (ValidatorSet::new(validators, 0).unwrap(), caps)
    }

    fn advance(set: &mut ValidatorSet, epoch: u64, records: &mut ReportRecords) -> EpochChanges {
        let mut computation = Balance::zero();
        let mut storage = Balance::zero();
        set.advance_epoch(epoch, &mut computation, &mut storage, records, 0, &params())
            .unwrap()
    }

    #[test]
    fn test_genesis_assigns_voting_power() {
        let (set, _) = genesis(&[100, 100, 100, 100]);
        assert_eq!(set.total_stake(), 400 * NANOS_PER_TOKEN);
        for v in set.active_validators() {
            assert_eq!(v.voting_power(), 2_500);
        }
    }

    #[test]
    fn test_genesis_rejects_duplicates() {
        let (a, _) = Validator::new(metadata(1), 1, 0).unwrap();
        let mut dup = metadata(2);
        dup.name = "validator-1".to_string();
        let (b, _) = Validator::new(dup, 1, 0).unwrap();
        assert_eq!(
            ValidatorSet::new(vec![a, b], 0).unwrap_err(),
            StakesetError::DuplicateValidator(Address::from_low_u64(1))
        );
    }

    #[test]
    fn test_verify_cap_rejects_stale_cap() {
        let (mut set, mut caps) = genesis(&[100, 100]);
        let old = caps.remove(0);
        let new = set.rotate_operation_cap(&old).unwrap();
        assert_eq!(
            set.verify_cap(&old, CapScope::Active).unwrap_err(),
            StakesetError::InvalidCap(Address::from_low_u64(1))
        );
        assert_eq!(
            set.verify_cap(&new, CapScope::Active).unwrap().validator_address(),
            Address::from_low_u64(1)
        );
    }

    #[test]
    fn test_verify_cap_respects_scope() {
        let (set, caps) = genesis(&[100]);
        assert_eq!(
            set.verify_cap(&caps[0], CapScope::Candidate).unwrap_err(),
            StakesetError::NotACandidate(Address::from_low_u64(1))
        );
    }

    #[test]
    fn test_candidate_joins_at_next_boundary() {
        let (mut set, _) = genesis(&[100, 100]);
        let cap = set
            .request_add_validator_candidate(metadata(3), 500, 0)
            .unwrap();
        assert_eq!(
            set.request_add_validator(&cap, &params()).unwrap_err(),
            StakesetError::MinJoiningStakeNotReached {
                stake: 0,
                minimum: 100 * NANOS_PER_TOKEN
            }
        );
        let _position = set
            .request_add_stake(Address::from_low_u64(3), Balance::new(100 * NANOS_PER_TOKEN), 0)
            .unwrap();
        set.request_add_validator(&cap, &params()).unwrap();
        assert_eq!(set.next_epoch_validator_count(), 3);
        assert!(!set.is_active_validator(&Address::from_low_u64(3)));

        let mut records = ReportRecords::new();
        let changes = advance(&mut set, 1, &mut records);
        assert_eq!(changes.joined, vec![Address::from_low_u64(3)]);
        let joined = set.validator(&Address::from_low_u64(3)).unwrap();
        assert_eq!(joined.staking_pool().activation_epoch(), Some(1));
        assert_eq!(
            joined.staking_pool().exchange_rates().get(1),
            Some(&ExchangeRate::new(100 * NANOS_PER_TOKEN, 100 * NANOS_PER_TOKEN))
        );
    }

    #[test]
    fn test_duplicate_candidate_rejected() {
        let (mut set, _) = genesis(&[100]);
        let mut dup = metadata(9);
        dup.network_address = "/dns/v1.example/tcp/8080".to_string();
        assert_eq!(
            set.request_add_validator_candidate(dup, 500, 0).unwrap_err(),
            StakesetError::DuplicateValidator(Address::from_low_u64(9))
        );
    }

    #[test]
    fn test_removed_candidate_pool_still_withdrawable() {
        let (mut set, _) = genesis(&[100]);
        let cap = set
            .request_add_validator_candidate(metadata(5), 500, 0)
            .unwrap();
        let position = set
            .request_add_stake(Address::from_low_u64(5), Balance::new(3 * NANOS_PER_TOKEN), 0)
            .unwrap();
        let pool_id = position.pool_id();
        set.request_remove_validator_candidate(&cap, 0).unwrap();
        assert!(set.inactive_validator(&pool_id).is_some());
        let out = set
            .request_withdraw_stake(StakePosition::Principal(position), 0)
            .unwrap();
        assert_eq!(out.value(), 3 * NANOS_PER_TOKEN);
    }

    #[test]
    fn test_stake_below_minimum_rejected() {
        let (mut set, _) = genesis(&[100]);
        assert_eq!(
            set.request_add_stake(Address::from_low_u64(1), Balance::new(NANOS_PER_TOKEN - 1), 0)
                .unwrap_err(),
            StakesetError::BelowMinimumStake {
                amount: NANOS_PER_TOKEN - 1,
                minimum: NANOS_PER_TOKEN
            }
        );
    }

    #[test]
    fn test_removals_processed_highest_index_first() {
        let (mut set, caps) = genesis(&[100, 100, 100, 100]);
        set.request_remove_validator(&caps[1], &params()).unwrap();
        set.request_remove_validator(&caps[3], &params()).unwrap();
        assert_eq!(
            set.request_remove_validator(&caps[3], &params()).unwrap_err(),
            StakesetError::ValidatorAlreadyRemoved(Address::from_low_u64(4))
        );

        let mut records = ReportRecords::new();
        records.report(Address::from_low_u64(2), Address::from_low_u64(1)).unwrap();
        records.report(Address::from_low_u64(3), Address::from_low_u64(4)).unwrap();
        let changes = advance(&mut set, 1, &mut records);

        assert_eq!(
            changes.departed,
            vec![
                (Address::from_low_u64(4), DepartureReason::Voluntary),
                (Address::from_low_u64(2), DepartureReason::Voluntary),
            ]
        );
        assert_eq!(
            set.active_validator_addresses(),
            vec![Address::from_low_u64(1), Address::from_low_u64(3)]
        );
        assert!(records.is_empty());
        for v in set.active_validators() {
            assert_eq!(v.voting_power(), 5_000);
        }
    }

    #[test]
    fn test_remove_respects_min_validator_count() {
        let (mut set, caps) = genesis(&[100, 100]);
        let strict = SystemParameters {
            min_validator_count: 2,
            ..params()
        };
        assert!(matches!(
            set.request_remove_validator(&caps[0], &strict),
            Err(StakesetError::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_very_low_stake_departs_immediately() {
        let (mut set, _) = genesis(&[100, 100, 5]);
        let mut records = ReportRecords::new();
        let changes = advance(&mut set, 1, &mut records);
        assert_eq!(
            changes.departed,
            vec![(Address::from_low_u64(3), DepartureReason::VeryLowStake)]
        );
    }

    #[test]
    fn test_advance_distributes_and_settles() {
        let (mut set, _) = genesis(&[100, 100]);
        let mut records = ReportRecords::new();
        let mut computation = Balance::new(1_000_000);
        let mut storage = Balance::new(1_001);
        let changes = set
            .advance_epoch(1, &mut computation, &mut storage, &mut records, 0, &params())
            .unwrap();

        // 500_000 each; 10% commission -> 50_000 commission + 500 storage share.
        assert_eq!(changes.validator_rewards.len(), 2);
        for (_, stake) in &changes.validator_rewards {
            assert_eq!(stake.amount(), 50_500);
            assert_eq!(stake.activation_epoch(), 1);
        }
        assert_eq!(computation.value(), 0);
        assert_eq!(storage.value(), 1);
        assert_eq!(set.total_stake(), 200 * NANOS_PER_TOKEN + 1_001_000);
    }

    #[test]
    fn test_next_epoch_settings_apply_at_boundary() {
        let (mut set, caps) = genesis(&[100, 100]);
        set.request_set_gas_price(&caps[0], 7_000).unwrap();
        set.request_set_commission_rate(&caps[0], 200).unwrap();
        assert_eq!(set.validator(&Address::from_low_u64(1)).unwrap().gas_price(), 1_000);
        let mut records = ReportRecords::new();
        advance(&mut set, 1, &mut records);
        let v = set.validator(&Address::from_low_u64(1)).unwrap();
        assert_eq!(v.gas_price(), 7_000);
        assert_eq!(v.commission_rate(), 200);
    }

    #[test]
    fn test_pool_lookup_falls_back_to_inactive() {
        let (mut set, caps) = genesis(&[100, 100]);
        let pool_id = set.validator(&Address::from_low_u64(2)).unwrap().pool_id();
        set.request_remove_validator(&caps[1], &params()).unwrap();
        let mut records = ReportRecords::new();
        advance(&mut set, 1, &mut records);
        assert!(set.validator_address_by_pool(&pool_id).is_err());
        let rates = set.pool_exchange_rates(&pool_id).unwrap();
        assert_eq!(rates.latest().map(|(e, _)| e), Some(1));
    }
}
