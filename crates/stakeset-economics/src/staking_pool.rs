// crates/stakeset-economics/src/staking_pool.rs
//
// Per-validator staking pool: pool-token accounting and epoch settlement.
//
// A pool tracks the native value it manages (`total_value`, which includes
// every outstanding principal plus undistributed rewards) and the pool tokens
// issued against it. Deposits and withdrawals made during an epoch only touch
// the pending accumulators; `settle_epoch` applies them at the boundary in a
// fixed order:
//   1. withdrawals leave (value and tokens),
//   2. the pending deposit is valued at the rate left by step 1 and added,
//   3. the resulting {value, tokens} is recorded as the epoch's rate,
//   4. the supply is checked against that rate.
// Rewards are deposited before settlement so they compound into the same
// epoch's rate.
//
// Lifecycle: preactive (no activation epoch, 1:1, deposits settle on
// arrival) -> active (earning, settled every epoch) -> inactive
// (deactivation epoch set, no more earning, withdrawals settle immediately).

use serde::{Deserialize, Serialize};

use crate::exchange_rate::{ExchangeRate, ExchangeRateLedger};
use crate::position::{FungibleStake, FungibleSupply, PrincipalStake, StakePosition};
use crate::token::{mul_div, Balance};
use stakeset_core::{PoolId, StakesetError};

/// Accounting unit holding all stake delegated to one validator.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingPool {
    id: PoolId,
    /// Epoch the pool started earning. `None` while preactive.
    activation_epoch: Option<u64>,
    /// Epoch the pool stopped earning. Once set it never clears.
    deactivation_epoch: Option<u64>,
    /// Native value under management: all principal plus undistributed rewards.
    total_value: u64,
    /// Reward value reserved for withdrawals, distinct from principal.
    rewards: Balance,
    /// Pool tokens outstanding.
    pool_token_supply: u64,
    exchange_rates: ExchangeRateLedger,
    pending_deposit: u64,
    pending_withdraw_value: u64,
    pending_withdraw_tokens: u64,
    /// Backing for fungible positions, created on first conversion.
    fungible: Option<FungibleSupply>,
}

impl StakingPool {
    /// Create an empty, preactive pool.
    pub fn new(id: PoolId) -> Self {
        Self {
            id,
            activation_epoch: None,
            deactivation_epoch: None,
            total_value: 0,
            rewards: Balance::zero(),
            pool_token_supply: 0,
            exchange_rates: ExchangeRateLedger::new(),
            pending_deposit: 0,
            pending_withdraw_value: 0,
            pending_withdraw_tokens: 0,
            fungible: None,
        }
    }

    // -----------------------------------------------------------------
    // Deposits and withdrawals
    // -----------------------------------------------------------------

    /// Deposit `stake`, to start earning at `activation_epoch`.
    ///
    /// The value waits in the pending accumulator until the next settlement;
    /// the pool-token supply does not move yet.
    ///
    /// # Errors
    /// - `StakesetError::InactivePool` if the pool has been deactivated.
    /// - `StakesetError::ZeroAmount` if `stake` is empty.
    pub fn deposit(
        &mut self,
        stake: Balance,
        activation_epoch: u64,
    ) -> Result<PrincipalStake, StakesetError> {
        if self.is_inactive() {
            return Err(StakesetError::InactivePool(self.id));
        }
        let amount = stake.value();
        if amount == 0 {
            return Err(StakesetError::ZeroAmount);
        }
        self.pending_deposit = self
            .pending_deposit
            .checked_add(amount)
            .ok_or(StakesetError::ArithmeticOverflow("pending_deposit"))?;
        Ok(PrincipalStake::new(self.id, activation_epoch, stake))
    }

    /// Withdraw a position of either kind. Returns principal plus reward.
    pub fn withdraw(
        &mut self,
        position: StakePosition,
        current_epoch: u64,
    ) -> Result<Balance, StakesetError> {
        match position {
            StakePosition::Principal(stake) => self.withdraw_principal(stake, current_epoch),
            StakePosition::Fungible(stake) => self.redeem_fungible(stake, current_epoch),
        }
    }

    /// Withdraw a principal position at `current_epoch`.
    ///
    /// A position that has not reached its activation epoch never earned, so
    /// the exact principal comes back and the pending deposit shrinks. An
    /// earning position is converted to pool tokens at the rate of its own
    /// activation epoch and valued at the current rate; the excess over
    /// principal is paid from the rewards balance (capped by it).
    pub fn withdraw_principal(
        &mut self,
        stake: PrincipalStake,
        current_epoch: u64,
    ) -> Result<Balance, StakesetError> {
        self.check_pool(stake.pool_id())?;
        let principal_amount = stake.amount();

        if self.is_preactive() {
            // Preactive deposits were settled on arrival at 1:1.
            let total_value = self.total_value.checked_sub(principal_amount);
            let supply = self.pool_token_supply.checked_sub(principal_amount);
            let (Some(total_value), Some(supply)) = (total_value, supply) else {
                return Err(StakesetError::InvalidState(format!(
                    "preactive pool {} holds less than withdrawn principal {}",
                    self.id, principal_amount
                )));
            };
            self.total_value = total_value;
            self.pool_token_supply = supply;
            return Ok(stake.into_principal());
        }

        if stake.activation_epoch() > current_epoch {
            self.pending_deposit = self
                .pending_deposit
                .checked_sub(principal_amount)
                .ok_or_else(|| {
                    StakesetError::InvalidState(format!(
                        "pending deposit of pool {} is below principal {}",
                        self.id, principal_amount
                    ))
                })?;
            return Ok(stake.into_principal());
        }

        let rate_at_staking = self.rate_at_epoch(stake.activation_epoch());
        let tokens = rate_at_staking.tokens_for(principal_amount)?;
        let current_value = self.rate_at_epoch(current_epoch).value_for(tokens)?;
        // The rewards balance can fall short when the pool is being emptied.
        let reward_amount = current_value
            .saturating_sub(principal_amount)
            .min(self.rewards.value());

        let mut out = stake.into_principal();
        out.join(self.rewards.split(reward_amount)?);
        self.record_pending_withdraw(out.value(), tokens)?;

        tracing::debug!(
            pool = %self.id.short(),
            principal = principal_amount,
            reward = reward_amount,
            tokens,
            "stake withdrawn"
        );
        Ok(out)
    }

    /// Add this epoch's staker rewards. Called before `settle_epoch`.
    pub fn deposit_rewards(&mut self, rewards: Balance) -> Result<(), StakesetError> {
        self.total_value = self
            .total_value
            .checked_add(rewards.value())
            .ok_or(StakesetError::ArithmeticOverflow("deposit_rewards"))?;
        self.rewards.join(rewards);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Settlement
    // -----------------------------------------------------------------

    /// Apply the epoch's pending withdrawals and deposit, then record the
    /// resulting rate under `epoch`.
    ///
    /// # Errors
    /// Returns `StakesetError::ExchangeRateMismatch` if the supply diverges
    /// from the freshly recorded rate, or `NonMonotonicEpoch` if `epoch` was
    /// already settled.
    pub fn settle_epoch(&mut self, epoch: u64) -> Result<(), StakesetError> {
        self.process_pending_withdrawals()?;
        self.process_pending_deposit()?;
        self.exchange_rates.record(
            epoch,
            ExchangeRate::new(self.total_value, self.pool_token_supply),
        )?;
        self.check_balance_invariants(epoch)?;
        tracing::debug!(
            pool = %self.id.short(),
            epoch,
            value = self.total_value,
            tokens = self.pool_token_supply,
            "pool settled"
        );
        Ok(())
    }

    fn process_pending_withdrawals(&mut self) -> Result<(), StakesetError> {
        let total_value = self.total_value.checked_sub(self.pending_withdraw_value);
        let supply = self
            .pool_token_supply
            .checked_sub(self.pending_withdraw_tokens);
        let (Some(total_value), Some(supply)) = (total_value, supply) else {
            return Err(StakesetError::InvalidState(format!(
                "pool {} pending withdrawals exceed balances",
                self.id
            )));
        };
        self.total_value = total_value;
        self.pool_token_supply = supply;
        self.pending_withdraw_value = 0;
        self.pending_withdraw_tokens = 0;
        Ok(())
    }

    /// Value the pending deposit at the pool's current (post-withdrawal,
    /// pre-deposit) rate and fold it into the balances.
    ///
    /// Also used to settle deposits into a preactive pool on arrival.
    pub fn process_pending_deposit(&mut self) -> Result<(), StakesetError> {
        let latest = ExchangeRate::new(self.total_value, self.pool_token_supply);
        let total_value = self
            .total_value
            .checked_add(self.pending_deposit)
            .ok_or(StakesetError::ArithmeticOverflow("process_pending_deposit"))?;
        // Recomputing the whole supply also turns dust value with no tokens into 1:1 tokens.
        let supply = latest.tokens_for(total_value)?;
        self.total_value = total_value;
        self.pool_token_supply = supply;
        self.pending_deposit = 0;
        Ok(())
    }

    fn check_balance_invariants(&self, epoch: u64) -> Result<(), StakesetError> {
        let rate = self.rate_at_epoch(epoch);
        let expected = rate.tokens_for(self.total_value)?;
        if expected != self.pool_token_supply {
            return Err(StakesetError::ExchangeRateMismatch {
                epoch,
                expected,
                actual: self.pool_token_supply,
            });
        }
        Ok(())
    }

    fn record_pending_withdraw(&mut self, value: u64, tokens: u64) -> Result<(), StakesetError> {
        self.pending_withdraw_value = self
            .pending_withdraw_value
            .checked_add(value)
            .ok_or(StakesetError::ArithmeticOverflow("pending_withdraw_value"))?;
        self.pending_withdraw_tokens = self
            .pending_withdraw_tokens
            .checked_add(tokens)
            .ok_or(StakesetError::ArithmeticOverflow("pending_withdraw_tokens"))?;
        // No boundary will ever settle an inactive or preactive pool.
        if self.is_inactive() || self.is_preactive() {
            self.process_pending_withdrawals()?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Start earning at `epoch`, recording the first snapshot.
    pub fn activate(&mut self, epoch: u64) -> Result<(), StakesetError> {
        if !self.is_preactive() {
            return Err(StakesetError::PoolAlreadyActive(self.id));
        }
        if self.is_inactive() {
            return Err(StakesetError::InactivePool(self.id));
        }
        self.exchange_rates.record(
            epoch,
            ExchangeRate::new(self.total_value, self.pool_token_supply),
        )?;
        self.activation_epoch = Some(epoch);
        Ok(())
    }

    /// Stop earning from `epoch`. The pool keeps settling withdrawals.
    pub fn deactivate(&mut self, epoch: u64) -> Result<(), StakesetError> {
        if self.is_inactive() {
            return Err(StakesetError::InactivePool(self.id));
        }
        self.deactivation_epoch = Some(epoch);
        Ok(())
    }

    pub fn is_preactive(&self) -> bool {
        self.activation_epoch.is_none()
    }

    pub fn is_inactive(&self) -> bool {
        self.deactivation_epoch.is_some()
    }

    /// Whether the pool had not started earning by `epoch`.
    pub fn is_preactive_at_epoch(&self, epoch: u64) -> bool {
        match self.activation_epoch {
            None => true,
            Some(activation) => activation > epoch,
        }
    }

    /// Exchange rate in force at `epoch`.
    ///
    /// Preactive pools are 1:1. Otherwise this is the latest snapshot at or
    /// before `epoch` (clamped to the deactivation epoch) and not before the
    /// activation epoch.
    pub fn rate_at_epoch(&self, epoch: u64) -> ExchangeRate {
        let Some(activation) = self.activation_epoch else {
            return ExchangeRate::initial();
        };
        if activation > epoch {
            return ExchangeRate::initial();
        }
        let clamped = self.deactivation_epoch.unwrap_or(epoch).min(epoch);
        self.exchange_rates
            .latest_at_or_before(clamped, activation)
            .map(|(_, rate)| rate)
            // Unreachable while activation always records a snapshot.
            .unwrap_or_else(ExchangeRate::initial)
    }

    // -----------------------------------------------------------------
    // Fungible stake
    // -----------------------------------------------------------------

    /// Turn a principal position into pool tokens.
    ///
    /// # Errors
    /// - `StakesetError::WrongPool` if the position belongs elsewhere.
    /// - `StakesetError::NotYetActive` before the position's activation epoch.
    pub fn convert_to_fungible(
        &mut self,
        stake: PrincipalStake,
        current_epoch: u64,
    ) -> Result<FungibleStake, StakesetError> {
        self.check_pool(stake.pool_id())?;
        if current_epoch < stake.activation_epoch() {
            return Err(StakesetError::NotYetActive {
                activation_epoch: stake.activation_epoch(),
                current_epoch,
            });
        }
        let tokens = self
            .rate_at_epoch(stake.activation_epoch())
            .tokens_for(stake.amount())?;
        let supply = self.fungible.get_or_insert_with(FungibleSupply::default);
        supply.total_supply = supply
            .total_supply
            .checked_add(tokens)
            .ok_or(StakesetError::ArithmeticOverflow("fungible total_supply"))?;
        supply.principal.join(stake.into_principal());
        Ok(FungibleStake::new(self.id, tokens))
    }

    /// Redeem a fungible position at the current rate.
    ///
    /// The value of the tokens is split proportionally between the aggregate
    /// fungible principal and the pool's rewards balance.
    pub fn redeem_fungible(
        &mut self,
        stake: FungibleStake,
        current_epoch: u64,
    ) -> Result<Balance, StakesetError> {
        self.check_pool(stake.pool_id())?;
        let rate = self.rate_at_epoch(current_epoch);
        let tokens = stake.pool_tokens();
        let supply = self
            .fungible
            .as_mut()
            .ok_or(StakesetError::NoFungibleSupply(self.id))?;
        if tokens > supply.total_supply {
            return Err(StakesetError::InsufficientPoolTokens {
                requested: tokens,
                available: supply.total_supply,
            });
        }
        let (principal_amount, reward_amount) = fungible_withdraw_amounts(
            rate,
            tokens,
            supply.principal.value(),
            supply.total_supply,
        )?;
        if reward_amount > self.rewards.value() {
            return Err(StakesetError::InsufficientBalance {
                requested: reward_amount,
                available: self.rewards.value(),
            });
        }

        supply.total_supply -= stake.into_tokens();
        let mut out = supply.principal.split(principal_amount)?;
        out.join(self.rewards.split(reward_amount)?);
        self.record_pending_withdraw(out.value(), tokens)?;
        Ok(out)
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn activation_epoch(&self) -> Option<u64> {
        self.activation_epoch
    }

    pub fn deactivation_epoch(&self) -> Option<u64> {
        self.deactivation_epoch
    }

    pub fn total_value(&self) -> u64 {
        self.total_value
    }

    pub fn pool_token_supply(&self) -> u64 {
        self.pool_token_supply
    }

    pub fn rewards_balance(&self) -> u64 {
        self.rewards.value()
    }

    pub fn pending_deposit(&self) -> u64 {
        self.pending_deposit
    }

    pub fn pending_withdraw_value(&self) -> u64 {
        self.pending_withdraw_value
    }

    pub fn pending_withdraw_tokens(&self) -> u64 {
        self.pending_withdraw_tokens
    }

    pub fn exchange_rates(&self) -> &ExchangeRateLedger {
        &self.exchange_rates
    }

    pub fn fungible_supply(&self) -> Option<&FungibleSupply> {
        self.fungible.as_ref()
    }

    fn check_pool(&self, position: PoolId) -> Result<(), StakesetError> {
        if position != self.id {
            return Err(StakesetError::WrongPool {
                position,
                pool: self.id,
            });
        }
        Ok(())
    }
}

/// Split the current value of `tokens` fungible pool tokens into
/// (principal, reward) parts, proportional to the aggregate record.
fn fungible_withdraw_amounts(
    rate: ExchangeRate,
    tokens: u64,
    aggregate_principal: u64,
    total_supply: u64,
) -> Result<(u64, u64), StakesetError> {
    if total_supply == 0 {
        return Ok((0, 0));
    }
    let total_value = rate.value_for(total_supply)?;
    let aggregate_principal = aggregate_principal.min(total_value);
    let total_rewards = total_value - aggregate_principal;

    let principal = mul_div(tokens, aggregate_principal, total_supply, "fungible principal")?;
    let reward = mul_div(tokens, total_rewards, total_supply, "fungible reward")?;

    let expected = rate.value_for(tokens)?;
    if principal + reward > expected {
        return Err(StakesetError::FungibleSupplyMismatch {
            withdrawn: principal + reward,
            expected,
        });
    }
    Ok((principal, reward))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakeset_core::Address;

    fn pool_id() -> PoolId {
        PoolId::derive(&Address::from_low_u64(7))
    }

    fn active_pool(activation_epoch: u64) -> StakingPool {
        let mut pool = StakingPool::new(pool_id());
        pool.activate(activation_epoch).unwrap();
        pool
    }

    #[test]
    fn test_worked_scenario() {
        // Activates at epoch 5 with no stake.
        let mut pool = active_pool(5);
        assert_eq!(pool.exchange_rates().get(5), Some(&ExchangeRate::initial()));

        // 100 deposited during epoch 5, earning from epoch 6.
        let stake = pool.deposit(Balance::new(100), 6).unwrap();
        assert_eq!(pool.pending_deposit(), 100);
        assert_eq!(pool.pool_token_supply(), 0);
        pool.settle_epoch(6).unwrap();
        assert_eq!(pool.exchange_rates().get(6), Some(&ExchangeRate::new(100, 100)));

        // 10 of reward before epoch 7's settlement.
        pool.deposit_rewards(Balance::new(10)).unwrap();
        pool.settle_epoch(7).unwrap();
        assert_eq!(pool.exchange_rates().get(7), Some(&ExchangeRate::new(110, 100)));

        let out = pool.withdraw_principal(stake, 7).unwrap();
        assert_eq!(out.value(), 110);
        assert_eq!(pool.pending_withdraw_value(), 110);
        assert_eq!(pool.pending_withdraw_tokens(), 100);
        assert_eq!(pool.rewards_balance(), 0);

        pool.settle_epoch(8).unwrap();
        assert_eq!(pool.total_value(), 0);
        assert_eq!(pool.pool_token_supply(), 0);
    }

    #[test]
    fn test_withdraw_before_activation_returns_exact_principal() {
        let mut pool = active_pool(0);
        let first = pool.deposit(Balance::new(1_000), 1).unwrap();
        pool.settle_epoch(1).unwrap();
        pool.deposit_rewards(Balance::new(500)).unwrap();

        let early = pool.deposit(Balance::new(250), 2).unwrap();
        assert_eq!(pool.pending_deposit(), 250);
        let out = pool.withdraw_principal(early, 1).unwrap();
        assert_eq!(out.value(), 250);
        assert_eq!(pool.pending_deposit(), 0);
        // Nothing queued for withdrawal, rewards untouched.
        assert_eq!(pool.pending_withdraw_value(), 0);
        assert_eq!(pool.rewards_balance(), 500);
        let _ = first;
    }

    #[test]
    fn test_deposit_rejects_zero_and_inactive() {
        let mut pool = active_pool(0);
        assert_eq!(
            pool.deposit(Balance::zero(), 1).unwrap_err(),
            StakesetError::ZeroAmount
        );
        pool.deactivate(3).unwrap();
        assert_eq!(
            pool.deposit(Balance::new(10), 4).unwrap_err(),
            StakesetError::InactivePool(pool_id())
        );
    }

    #[test]
    fn test_withdraw_from_wrong_pool() {
        let mut pool = active_pool(0);
        let mut other = StakingPool::new(PoolId::derive(&Address::from_low_u64(8)));
        other.activate(0).unwrap();
        let stake = other.deposit(Balance::new(10), 1).unwrap();
        assert!(matches!(
            pool.withdraw_principal(stake, 1),
            Err(StakesetError::WrongPool { .. })
        ));
    }

    #[test]
    fn test_settlement_withdraws_before_deposit() {
        let mut pool = active_pool(0);
        let a = pool.deposit(Balance::new(1_000), 1).unwrap();
        pool.settle_epoch(1).unwrap();
        pool.deposit_rewards(Balance::new(1_000)).unwrap();
        pool.settle_epoch(2).unwrap();
        assert_eq!(pool.rate_at_epoch(2), ExchangeRate::new(2_000, 1_000));

        // Same epoch: a full withdrawal and a new deposit.
        let out = pool.withdraw_principal(a, 2).unwrap();
        assert_eq!(out.value(), 2_000);
        let _b = pool.deposit(Balance::new(300), 3).unwrap();
        pool.settle_epoch(3).unwrap();

        // The deposit was valued at the post-withdrawal rate, which is the
        // (0, 0) sentinel, so it mints 1:1.
        assert_eq!(pool.total_value(), 300);
        assert_eq!(pool.pool_token_supply(), 300);
        assert_eq!(pool.rate_at_epoch(3), ExchangeRate::new(300, 300));
    }

    #[test]
    fn test_deposit_after_rewards_mints_fewer_tokens() {
        let mut pool = active_pool(0);
        let _a = pool.deposit(Balance::new(100), 1).unwrap();
        pool.settle_epoch(1).unwrap();
        pool.deposit_rewards(Balance::new(100)).unwrap();
        let _b = pool.deposit(Balance::new(100), 2).unwrap();
        pool.settle_epoch(2).unwrap();
        // Rate before deposit is (200, 100): 100 more value buys 50 tokens.
        assert_eq!(pool.rate_at_epoch(2), ExchangeRate::new(300, 150));
    }

    #[test]
    fn test_exchange_rate_monotonic_under_rewards() {
        let mut pool = active_pool(0);
        let mut stakes = Vec::new();
        stakes.push(pool.deposit(Balance::new(1_000_003), 1).unwrap());
        pool.settle_epoch(1).unwrap();

        let rewards = [0u64, 1, 7, 0, 12_345, 3];
        let deposits = [17u64, 0, 999, 5, 0, 1_000_000];
        let probe = 1_000_000u64;
        let mut last = pool.rate_at_epoch(1).value_for(probe).unwrap();
        for (i, (&reward, &deposit)) in rewards.iter().zip(deposits.iter()).enumerate() {
            let epoch = i as u64 + 2;
            pool.deposit_rewards(Balance::new(reward)).unwrap();
            if deposit > 0 {
                stakes.push(pool.deposit(Balance::new(deposit), epoch).unwrap());
            }
            pool.settle_epoch(epoch).unwrap();
            let now = pool.rate_at_epoch(epoch).value_for(probe).unwrap();
            assert!(now >= last, "epoch {}: {} < {}", epoch, now, last);
            last = now;
        }
        assert_eq!(stakes.len(), 5);
    }

    #[test]
    fn test_rate_at_epoch_fills_gaps_and_clamps() {
        let mut pool = active_pool(2);
        let _s = pool.deposit(Balance::new(100), 3).unwrap();
        pool.settle_epoch(3).unwrap();
        pool.deposit_rewards(Balance::new(50)).unwrap();
        pool.settle_epoch(6).unwrap();

        // Before activation the pool is preactive: 1:1.
        assert_eq!(pool.rate_at_epoch(1), ExchangeRate::initial());
        assert_eq!(pool.rate_at_epoch(4), ExchangeRate::new(100, 100));
        assert_eq!(pool.rate_at_epoch(9), ExchangeRate::new(150, 100));

        pool.deactivate(5).unwrap();
        // Clamped to the deactivation epoch, which falls in the gap 3..6.
        assert_eq!(pool.rate_at_epoch(9), ExchangeRate::new(100, 100));
    }

    #[test]
    fn test_inactive_pool_settles_withdrawal_immediately() {
        let mut pool = active_pool(0);
        let stake = pool.deposit(Balance::new(100), 1).unwrap();
        pool.settle_epoch(1).unwrap();
        pool.deposit_rewards(Balance::new(20)).unwrap();
        pool.settle_epoch(2).unwrap();
        pool.deactivate(2).unwrap();

        let out = pool.withdraw_principal(stake, 10).unwrap();
        assert_eq!(out.value(), 120);
        assert_eq!(pool.pending_withdraw_value(), 0);
        assert_eq!(pool.pending_withdraw_tokens(), 0);
        assert_eq!(pool.total_value(), 0);
        assert_eq!(pool.pool_token_supply(), 0);
    }

    #[test]
    fn test_preactive_pool_deposits_and_withdraws_one_to_one() {
        let mut pool = StakingPool::new(pool_id());
        let stake = pool.deposit(Balance::new(40), 1).unwrap();
        pool.process_pending_deposit().unwrap();
        assert_eq!(pool.total_value(), 40);
        assert_eq!(pool.pool_token_supply(), 40);

        let out = pool.withdraw_principal(stake, 0).unwrap();
        assert_eq!(out.value(), 40);
        assert_eq!(pool.total_value(), 0);
        assert_eq!(pool.pool_token_supply(), 0);
    }

    #[test]
    fn test_activation_records_current_balances() {
        let mut pool = StakingPool::new(pool_id());
        let _s = pool.deposit(Balance::new(40), 1).unwrap();
        pool.process_pending_deposit().unwrap();
        pool.activate(3).unwrap();
        assert_eq!(pool.exchange_rates().get(3), Some(&ExchangeRate::new(40, 40)));
        assert_eq!(pool.activate(4), Err(StakesetError::PoolAlreadyActive(pool_id())));
    }

    #[test]
    fn test_settle_same_epoch_twice_fails() {
        let mut pool = active_pool(0);
        pool.settle_epoch(1).unwrap();
        assert_eq!(
            pool.settle_epoch(1),
            Err(StakesetError::NonMonotonicEpoch { epoch: 1, latest: 1 })
        );
    }

    #[test]
    fn test_invariant_detects_divergence() {
        let mut pool = active_pool(0);
        let _s = pool.deposit(Balance::new(100), 1).unwrap();
        pool.settle_epoch(1).unwrap();
        // Corrupt the supply behind the ledger's back.
        pool.pool_token_supply += 1;
        assert_eq!(
            pool.check_balance_invariants(1),
            Err(StakesetError::ExchangeRateMismatch {
                epoch: 1,
                expected: 100,
                actual: 101
            })
        );
    }

    #[test]
    fn test_fungible_convert_and_redeem() {
        let mut pool = active_pool(0);
        let stake = pool.deposit(Balance::new(100), 1).unwrap();
        pool.settle_epoch(1).unwrap();

        let mut fungible = pool.convert_to_fungible(stake, 1).unwrap();
        assert_eq!(fungible.pool_tokens(), 100);
        assert_eq!(pool.fungible_supply().unwrap().total_supply(), 100);
        assert_eq!(pool.fungible_supply().unwrap().principal(), 100);

        pool.deposit_rewards(Balance::new(20)).unwrap();
        pool.settle_epoch(2).unwrap();

        let half = fungible.split(50).unwrap();
        let out = pool.redeem_fungible(half, 2).unwrap();
        // value_for(50) at (120, 100) = 60: 50 principal + 10 reward.
        assert_eq!(out.value(), 60);
        assert_eq!(pool.rewards_balance(), 10);
        assert_eq!(pool.fungible_supply().unwrap().total_supply(), 50);
        assert_eq!(pool.fungible_supply().unwrap().principal(), 50);

        pool.settle_epoch(3).unwrap();
        assert_eq!(pool.rate_at_epoch(3), ExchangeRate::new(60, 50));
        let rest = pool.redeem_fungible(fungible, 3).unwrap();
        assert_eq!(rest.value(), 60);
        assert_eq!(pool.fungible_supply().unwrap().total_supply(), 0);
    }

    #[test]
    fn test_convert_before_activation_fails() {
        let mut pool = active_pool(0);
        let stake = pool.deposit(Balance::new(100), 4).unwrap();
        let err = pool.convert_to_fungible(stake, 3).unwrap_err();
        assert_eq!(
            err,
            StakesetError::NotYetActive {
                activation_epoch: 4,
                current_epoch: 3
            }
        );
    }

    #[test]
    fn test_redeem_without_supply_fails() {
        let mut pool = active_pool(0);
        let stray = FungibleStake::new(pool_id(), 5);
        assert_eq!(
            pool.redeem_fungible(stray, 1).unwrap_err(),
            StakesetError::NoFungibleSupply(pool_id())
        );
    }

    #[test]
    fn test_fungible_amounts_never_exceed_token_value() {
        let rate = ExchangeRate::new(1_234_567, 1_000_003);
        for tokens in [1u64, 2, 999, 500_000, 1_000_003] {
            let (p, r) = fungible_withdraw_amounts(rate, tokens, 1_000_003, 1_000_003).unwrap();
            assert!(p + r <= rate.value_for(tokens).unwrap());
        }
    }
}
