// crates/stakeset-economics/src/exchange_rate.rs
//
// Pool-token exchange rates and the per-pool history of them.
//
// A rate is the pair {value, pool_tokens}: `value` nanos are worth
// `pool_tokens` pool tokens. The (0, 0) pair is the sentinel for "no stake
// yet" and converts 1:1. A pool records one snapshot per settled epoch,
// starting at its activation epoch; the history is never pruned because
// withdrawals look up the rate at the position's own activation epoch, which
// can be arbitrarily old.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::token::mul_div;
use stakeset_core::StakesetError;

/// The ratio between native value and pool tokens at one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Native value under management, in nanos.
    pub value: u64,
    /// Pool tokens outstanding against that value.
    pub pool_tokens: u64,
}

impl ExchangeRate {
    /// The 1:1 sentinel used before a pool has any stake.
    pub const fn initial() -> Self {
        Self {
            value: 0,
            pool_tokens: 0,
        }
    }

    pub fn new(value: u64, pool_tokens: u64) -> Self {
        Self { value, pool_tokens }
    }

    /// Whether either side is zero, in which case conversions are 1:1.
    pub fn is_sentinel(&self) -> bool {
        self.value == 0 || self.pool_tokens == 0
    }

    /// Native value of `tokens` pool tokens, floored.
    pub fn value_for(&self, tokens: u64) -> Result<u64, StakesetError> {
        // A pool with no stake may still hold dust; treat it as 1:1.
        if self.is_sentinel() {
            return Ok(tokens);
        }
        mul_div(self.value, tokens, self.pool_tokens, "value_for")
    }

    /// Pool tokens worth `value` nanos, floored.
    pub fn tokens_for(&self, value: u64) -> Result<u64, StakesetError> {
        if self.is_sentinel() {
            return Ok(value);
        }
        mul_div(value, self.pool_tokens, self.value, "tokens_for")
    }
}

/// Append-only, epoch-keyed history of a pool's exchange rates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRateLedger {
    rates: BTreeMap<u64, ExchangeRate>,
}

impl ExchangeRateLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the snapshot for `epoch`.
    ///
    /// # Errors
    /// Returns `StakesetError::NonMonotonicEpoch` unless `epoch` is strictly
    /// greater than every recorded epoch.
    pub fn record(&mut self, epoch: u64, rate: ExchangeRate) -> Result<(), StakesetError> {
        if let Some((&latest, _)) = self.rates.last_key_value() {
            if epoch <= latest {
                return Err(StakesetError::NonMonotonicEpoch { epoch, latest });
            }
        }
        self.rates.insert(epoch, rate);
        Ok(())
    }

    /// Rate recorded exactly at `epoch`.
    pub fn get(&self, epoch: u64) -> Option<&ExchangeRate> {
        self.rates.get(&epoch)
    }

    /// Latest snapshot at or before `epoch` whose key is at least `floor`.
    pub fn latest_at_or_before(&self, epoch: u64, floor: u64) -> Option<(u64, ExchangeRate)> {
        if epoch < floor {
            return None;
        }
        self.rates
            .range(floor..=epoch)
            .next_back()
            .map(|(&e, &rate)| (e, rate))
    }

    /// Most recently recorded epoch and rate.
    pub fn latest(&self) -> Option<(u64, ExchangeRate)> {
        self.rates.last_key_value().map(|(&e, &rate)| (e, rate))
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// All snapshots in epoch order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, ExchangeRate)> + '_ {
        self.rates.iter().map(|(&e, &rate)| (e, rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_converts_one_to_one() {
        let rate = ExchangeRate::initial();
        assert_eq!(rate.value_for(123).unwrap(), 123);
        assert_eq!(rate.tokens_for(123).unwrap(), 123);
        // Dust on one side only is still treated as 1:1.
        let dusty = ExchangeRate::new(5, 0);
        assert_eq!(dusty.tokens_for(7).unwrap(), 7);
    }

    #[test]
    fn test_conversions_floor() {
        let rate = ExchangeRate::new(110, 100);
        assert_eq!(rate.value_for(100).unwrap(), 110);
        assert_eq!(rate.value_for(9).unwrap(), 9); // 9.9 floors to 9
        assert_eq!(rate.tokens_for(110).unwrap(), 100);
        assert_eq!(rate.tokens_for(10).unwrap(), 9); // 9.09 floors to 9
    }

    #[test]
    fn test_conversions_do_not_overflow_large_pools() {
        let rate = ExchangeRate::new(u64::MAX / 2, u64::MAX / 3);
        let tokens = u64::MAX / 3;
        assert_eq!(rate.value_for(tokens).unwrap(), u64::MAX / 2);
    }

    #[test]
    fn test_record_requires_increasing_epochs() {
        let mut ledger = ExchangeRateLedger::new();
        ledger.record(5, ExchangeRate::initial()).unwrap();
        ledger.record(6, ExchangeRate::new(100, 100)).unwrap();
        assert_eq!(
            ledger.record(6, ExchangeRate::new(1, 1)),
            Err(StakesetError::NonMonotonicEpoch { epoch: 6, latest: 6 })
        );
        assert_eq!(
            ledger.record(3, ExchangeRate::new(1, 1)),
            Err(StakesetError::NonMonotonicEpoch { epoch: 3, latest: 6 })
        );
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_latest_at_or_before_skips_gaps() {
        let mut ledger = ExchangeRateLedger::new();
        ledger.record(2, ExchangeRate::new(10, 10)).unwrap();
        ledger.record(5, ExchangeRate::new(20, 10)).unwrap();
        assert_eq!(ledger.latest_at_or_before(4, 2), Some((2, ExchangeRate::new(10, 10))));
        assert_eq!(ledger.latest_at_or_before(9, 2), Some((5, ExchangeRate::new(20, 10))));
        assert_eq!(ledger.latest_at_or_before(1, 0), None);
        assert_eq!(ledger.latest_at_or_before(1, 2), None);
    }
}
