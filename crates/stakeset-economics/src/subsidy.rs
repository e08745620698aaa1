// crates/stakeset-economics/src/subsidy.rs
//
// Stake subsidy: a pre-funded emission source that tops up the computation
// reward each epoch.
//
// Every draw pays out `min(current_distribution_amount, balance)`. After each
// `period_length` draws the distribution amount is reduced by
// `decrease_rate` basis points, giving a stepped geometric decay. Once the
// balance is exhausted the draws are zero.

use serde::{Deserialize, Serialize};

use crate::token::{apply_bps, Balance, BASIS_POINT_DENOMINATOR};
use stakeset_core::StakesetError;

/// Emission source for stake subsidies.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeSubsidy {
    /// Remaining subsidy funds.
    balance: Balance,
    /// Number of draws made so far.
    distribution_counter: u64,
    /// Amount paid by the next draw (before capping to the balance).
    current_distribution_amount: u64,
    /// Draws per decay step.
    period_length: u64,
    /// Decay applied at the end of each period, in basis points.
    decrease_rate: u64,
}

impl StakeSubsidy {
    /// # Errors
    /// - `StakesetError::BpsTooLarge` if `decrease_rate` exceeds 10_000.
    /// - `StakesetError::InvalidState` if `period_length` is zero.
    pub fn new(
        balance: Balance,
        initial_distribution_amount: u64,
        period_length: u64,
        decrease_rate: u64,
    ) -> Result<Self, StakesetError> {
        if decrease_rate > BASIS_POINT_DENOMINATOR {
            return Err(StakesetError::BpsTooLarge(decrease_rate));
        }
        if period_length == 0 {
            return Err(StakesetError::InvalidState(
                "stake subsidy period length must be positive".to_string(),
            ));
        }
        Ok(Self {
            balance,
            distribution_counter: 0,
            current_distribution_amount: initial_distribution_amount,
            period_length,
            decrease_rate,
        })
    }

    /// Draw this epoch's subsidy.
    pub fn advance_epoch(&mut self) -> Result<Balance, StakesetError> {
        let amount = self.current_distribution_amount.min(self.balance.value());
        let subsidy = self.balance.split(amount)?;
        self.distribution_counter += 1;
        if self.distribution_counter % self.period_length == 0 {
            let decrease = apply_bps(self.current_distribution_amount, self.decrease_rate);
            self.current_distribution_amount -= decrease;
        }
        Ok(subsidy)
    }

    /// What the next draw would pay.
    pub fn current_epoch_subsidy_amount(&self) -> u64 {
        self.current_distribution_amount.min(self.balance.value())
    }

    pub fn distribution_counter(&self) -> u64 {
        self.distribution_counter
    }

    pub fn balance(&self) -> u64 {
        self.balance.value()
    }
}
