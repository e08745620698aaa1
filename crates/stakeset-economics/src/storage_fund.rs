// crates/stakeset-economics/src/storage_fund.rs
//
// Storage fund: collects storage charges and pays storage rebates.
//
// Two balances are kept apart:
//   - total_object_storage_rebates: what is owed back to users when they
//     delete stored objects.
//   - non_refundable_balance: value that belongs to the fund for good
//     (reinvested rewards, truncation leftovers, non-refundable fees).
// The fund's total balance earns a share of the computation reward each
// epoch in proportion to its size relative to total stake.

use serde::{Deserialize, Serialize};

use crate::token::Balance;
use stakeset_core::StakesetError;

#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageFund {
    total_object_storage_rebates: Balance,
    non_refundable_balance: Balance,
}

impl StorageFund {
    /// Create a fund whose initial value is non-refundable.
    pub fn new(initial: Balance) -> Self {
        Self {
            total_object_storage_rebates: Balance::zero(),
            non_refundable_balance: initial,
        }
    }

    /// Apply one epoch of storage flows and return the refunded rebate.
    ///
    /// # Errors
    /// Returns `StakesetError::InsufficientBalance` if the fee or rebate
    /// amounts exceed the rebate pool.
    pub fn advance_epoch(
        &mut self,
        storage_charges: Balance,
        reinvestment: Balance,
        leftover_rewards: Balance,
        storage_rebate_amount: u64,
        non_refundable_fee_amount: u64,
    ) -> Result<Balance, StakesetError> {
        self.non_refundable_balance.join(reinvestment);
        self.non_refundable_balance.join(leftover_rewards);
        self.total_object_storage_rebates.join(storage_charges);

        let fee = self
            .total_object_storage_rebates
            .split(non_refundable_fee_amount)?;
        self.non_refundable_balance.join(fee);

        self.total_object_storage_rebates.split(storage_rebate_amount)
    }

    pub fn total_object_storage_rebates(&self) -> u64 {
        self.total_object_storage_rebates.value()
    }

    pub fn non_refundable_balance(&self) -> u64 {
        self.non_refundable_balance.value()
    }

    pub fn total_balance(&self) -> u64 {
        self.total_object_storage_rebates.value() + self.non_refundable_balance.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_epoch_routes_flows() {
        let mut fund = StorageFund::new(Balance::new(1_000));
        let refunded = fund
            .advance_epoch(Balance::new(500), Balance::new(20), Balance::new(3), 100, 50)
            .unwrap();
        assert_eq!(refunded.value(), 100);
        assert_eq!(fund.total_object_storage_rebates(), 350);
        assert_eq!(fund.non_refundable_balance(), 1_073);
        assert_eq!(fund.total_balance(), 1_423);
    }

    #[test]
    fn test_rebate_larger_than_pool_fails() {
        let mut fund = StorageFund::default();
        let result = fund.advance_epoch(
            Balance::new(10),
            Balance::zero(),
            Balance::zero(),
            11,
            0,
        );
        assert!(matches!(
            result,
            Err(StakesetError::InsufficientBalance { .. })
        ));
    }
}
