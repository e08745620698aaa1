// crates/stakeset-system/src/validator.rs
//
// A committee member: identity, quotes, commission and its staking pool.
//
// Gas price and commission changes requested by an active or pending
// validator are staged in `next_epoch_*` fields and take effect at the next
// boundary; a candidate's changes apply immediately. `next_epoch_stake`
// tracks what the pool's value will be once the current epoch settles and
// is checked against it at settlement.

use serde::{Deserialize, Serialize};

use crate::capability::OperationCap;
use crate::params::{MAX_COMMISSION_RATE, MAX_VALIDATOR_GAS_PRICE};
use stakeset_core::{Address, CapId, PoolId, StakesetError};
use stakeset_economics::{
    Balance, ExchangeRate, FungibleStake, PrincipalStake, StakePosition, StakingPool,
};

/// Identity and networking information of a validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorMetadata {
    pub address: Address,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub network_address: String,
    /// Hex-encoded consensus public key.
    pub protocol_pubkey: String,
    #[serde(default)]
    pub next_epoch_network_address: Option<String>,
    #[serde(default)]
    pub next_epoch_protocol_pubkey: Option<String>,
}

impl ValidatorMetadata {
    pub fn new(
        address: Address,
        name: impl Into<String>,
        network_address: impl Into<String>,
        protocol_pubkey: impl Into<String>,
    ) -> Self {
        Self {
            address,
            name: name.into(),
            description: String::new(),
            network_address: network_address.into(),
            protocol_pubkey: protocol_pubkey.into(),
            next_epoch_network_address: None,
            next_epoch_protocol_pubkey: None,
        }
    }

    /// Whether the two share any address, name, network address or key,
    /// counting staged next-epoch values.
    pub fn is_duplicate(&self, other: &ValidatorMetadata) -> bool {
        fn network(m: &ValidatorMetadata) -> Vec<&str> {
            std::iter::once(m.network_address.as_str())
                .chain(m.next_epoch_network_address.as_deref())
                .collect()
        }
        fn keys(m: &ValidatorMetadata) -> Vec<&str> {
            std::iter::once(m.protocol_pubkey.as_str())
                .chain(m.next_epoch_protocol_pubkey.as_deref())
                .collect()
        }
        let overlaps = |a: Vec<&str>, b: Vec<&str>| a.iter().any(|x| b.contains(x));

        self.address == other.address
            || self.name == other.name
            || overlaps(network(self), network(other))
            || overlaps(keys(self), keys(other))
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    metadata: ValidatorMetadata,
    voting_power: u64,
    operation_cap_id: CapId,
    cap_rotation: u64,
    gas_price: u64,
    staking_pool: StakingPool,
    /// Commission in basis points.
    commission_rate: u64,
    next_epoch_stake: u64,
    next_epoch_gas_price: u64,
    next_epoch_commission_rate: u64,
}

impl Validator {
    /// Create a validator with an empty, preactive pool and its first cap.
    ///
    /// # Errors
    /// - `StakesetError::CommissionRateTooHigh` above `MAX_COMMISSION_RATE`.
    /// - `StakesetError::GasPriceTooHigh` at or above `MAX_VALIDATOR_GAS_PRICE`.
    pub fn new(
        metadata: ValidatorMetadata,
        gas_price: u64,
        commission_rate: u64,
    ) -> Result<(Self, OperationCap), StakesetError> {
        check_commission_rate(commission_rate)?;
        check_gas_price(gas_price)?;
        let cap = OperationCap::issue(metadata.address, 0);
        let pool_id = PoolId::derive(&metadata.address);
        let validator = Self {
            metadata,
            voting_power: 0,
            operation_cap_id: cap.id(),
            cap_rotation: 0,
            gas_price,
            staking_pool: StakingPool::new(pool_id),
            commission_rate,
            next_epoch_stake: 0,
            next_epoch_gas_price: gas_price,
            next_epoch_commission_rate: commission_rate,
        };
        Ok((validator, cap))
    }

    // -----------------------------------------------------------------
    // Stake
    // -----------------------------------------------------------------

    /// Deposit `stake` during `epoch`; it starts earning at `epoch + 1`.
    pub fn request_add_stake(
        &mut self,
        stake: Balance,
        epoch: u64,
    ) -> Result<PrincipalStake, StakesetError> {
        let amount = stake.value();
        let position = self.staking_pool.deposit(stake, epoch + 1)?;
        self.next_epoch_stake += amount;
        if self.staking_pool.is_preactive() {
            self.staking_pool.process_pending_deposit()?;
        }
        Ok(position)
    }

    /// Genesis allocation: earns from epoch 0.
    ///
    /// # Errors
    /// Returns `StakesetError::PoolAlreadyActive` once the pool has activated.
    pub fn request_add_stake_at_genesis(&mut self, stake: Balance) -> Result<PrincipalStake, StakesetError> {
        if !self.staking_pool.is_preactive() {
            return Err(StakesetError::PoolAlreadyActive(self.pool_id()));
        }
        let amount = stake.value();
        let position = self.staking_pool.deposit(stake, 0)?;
        self.staking_pool.process_pending_deposit()?;
        self.next_epoch_stake += amount;
        Ok(position)
    }

    /// Withdraw a position of either kind at `epoch`.
    pub fn request_withdraw_stake(
        &mut self,
        position: StakePosition,
        epoch: u64,
    ) -> Result<Balance, StakesetError> {
        let withdrawn = self.staking_pool.withdraw(position, epoch)?;
        // An inactive pool is no longer settled, so its stake is no longer tracked.
        self.next_epoch_stake = self.next_epoch_stake.saturating_sub(withdrawn.value());
        Ok(withdrawn)
    }

    pub fn convert_to_fungible_stake(
        &mut self,
        stake: PrincipalStake,
        epoch: u64,
    ) -> Result<FungibleStake, StakesetError> {
        self.staking_pool.convert_to_fungible(stake, epoch)
    }

    /// Staker share of this epoch's reward.
    pub(crate) fn deposit_stake_rewards(&mut self, reward: Balance) -> Result<(), StakesetError> {
        self.next_epoch_stake += reward.value();
        self.staking_pool.deposit_rewards(reward)
    }

    /// Settle the pool at `new_epoch` and check the tracked stake.
    pub(crate) fn settle(&mut self, new_epoch: u64) -> Result<(), StakesetError> {
        self.staking_pool.settle_epoch(new_epoch)?;
        if self.staking_pool.total_value() != self.next_epoch_stake {
            return Err(StakesetError::InvalidState(format!(
                "validator {} settled at {} but expected {}",
                self.metadata.address,
                self.staking_pool.total_value(),
                self.next_epoch_stake
            )));
        }
        Ok(())
    }

    pub(crate) fn activate(&mut self, epoch: u64) -> Result<(), StakesetError> {
        self.staking_pool.activate(epoch)
    }

    pub(crate) fn deactivate(&mut self, epoch: u64) -> Result<(), StakesetError> {
        self.staking_pool.deactivate(epoch)
    }

    // -----------------------------------------------------------------
    // Operator settings
    // -----------------------------------------------------------------

    pub(crate) fn request_set_gas_price(&mut self, price: u64) -> Result<(), StakesetError> {
        check_gas_price(price)?;
        self.next_epoch_gas_price = price;
        Ok(())
    }

    pub(crate) fn set_candidate_gas_price(&mut self, price: u64) -> Result<(), StakesetError> {
        check_gas_price(price)?;
        self.next_epoch_gas_price = price;
        self.gas_price = price;
        Ok(())
    }

    pub(crate) fn request_set_commission_rate(&mut self, rate: u64) -> Result<(), StakesetError> {
        check_commission_rate(rate)?;
        self.next_epoch_commission_rate = rate;
        Ok(())
    }

    pub(crate) fn set_candidate_commission_rate(&mut self, rate: u64) -> Result<(), StakesetError> {
        check_commission_rate(rate)?;
        self.next_epoch_commission_rate = rate;
        self.commission_rate = rate;
        Ok(())
    }

    /// Apply the staged gas price and commission.
    pub(crate) fn adjust_stake_and_gas_price(&mut self) {
        self.gas_price = self.next_epoch_gas_price;
        self.commission_rate = self.next_epoch_commission_rate;
    }

    pub(crate) fn stage_next_epoch_network_address(&mut self, address: String) {
        self.metadata.next_epoch_network_address = Some(address);
    }

    pub(crate) fn stage_next_epoch_protocol_pubkey(&mut self, key: String) {
        self.metadata.next_epoch_protocol_pubkey = Some(key);
    }

    pub(crate) fn set_candidate_network_address(&mut self, address: String) {
        self.metadata.network_address = address;
    }

    pub(crate) fn set_candidate_protocol_pubkey(&mut self, key: String) {
        self.metadata.protocol_pubkey = key;
    }

    /// Move staged metadata into place.
    pub(crate) fn effectuate_staged_metadata(&mut self) {
        if let Some(address) = self.metadata.next_epoch_network_address.take() {
            self.metadata.network_address = address;
        }
        if let Some(key) = self.metadata.next_epoch_protocol_pubkey.take() {
            self.metadata.protocol_pubkey = key;
        }
    }

    /// Register a fresh cap; every earlier cap stops verifying.
    pub(crate) fn rotate_operation_cap(&mut self) -> OperationCap {
        self.cap_rotation += 1;
        let cap = OperationCap::issue(self.metadata.address, self.cap_rotation);
        self.operation_cap_id = cap.id();
        cap
    }

    pub(crate) fn set_voting_power(&mut self, voting_power: u64) {
        self.voting_power = voting_power;
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    pub fn address(&self) -> Address {
        self.metadata.address
    }

    pub fn metadata(&self) -> &ValidatorMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn voting_power(&self) -> u64 {
        self.voting_power
    }

    pub fn operation_cap_id(&self) -> CapId {
        self.operation_cap_id
    }

    pub fn gas_price(&self) -> u64 {
        self.gas_price
    }

    pub fn next_epoch_gas_price(&self) -> u64 {
        self.next_epoch_gas_price
    }

    pub fn commission_rate(&self) -> u64 {
        self.commission_rate
    }

    pub fn next_epoch_commission_rate(&self) -> u64 {
        self.next_epoch_commission_rate
    }

    pub fn pool_id(&self) -> PoolId {
        self.staking_pool.id()
    }

    pub fn staking_pool(&self) -> &StakingPool {
        &self.staking_pool
    }

    /// Settled value of the pool, in nanos.
    pub fn stake_amount(&self) -> u64 {
        self.staking_pool.total_value()
    }

    pub fn pending_stake_amount(&self) -> u64 {
        self.staking_pool.pending_deposit()
    }

    pub fn pending_withdraw_amount(&self) -> u64 {
        self.staking_pool.pending_withdraw_value()
    }

    pub fn next_epoch_stake(&self) -> u64 {
        self.next_epoch_stake
    }

    /// Rate the pool recorded most recently.
    pub fn latest_exchange_rate(&self) -> ExchangeRate {
        self.staking_pool
            .exchange_rates()
            .latest()
            .map(|(_, rate)| rate)
            .unwrap_or_else(ExchangeRate::initial)
    }
}

fn check_commission_rate(rate: u64) -> Result<(), StakesetError> {
    if rate > MAX_COMMISSION_RATE {
        return Err(StakesetError::CommissionRateTooHigh(rate));
    }
    Ok(())
}

fn check_gas_price(price: u64) -> Result<(), StakesetError> {
    if price >= MAX_VALIDATOR_GAS_PRICE {
        return Err(StakesetError::GasPriceTooHigh(price));
    }
    Ok(())
}
