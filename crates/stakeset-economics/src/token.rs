// crates/stakeset-economics/src/token.rs
//
// Native token balance and the fixed-point helpers shared by the pool and
// reward math.
//
// The smallest unit of the native token is the "nano". 1 token = 10^9 nanos.
// All accounting is integer nanos. Ratio math widens to u128 before
// multiplying so a product of two u64 values can never overflow; the only
// failure left is a quotient that does not fit back into u64, which is
// reported rather than truncated.

use serde::{Deserialize, Serialize};
use std::fmt;

use stakeset_core::StakesetError;

/// Number of nanos in one token. 1 token = 10^9 nanos.
pub const NANOS_PER_TOKEN: u64 = 1_000_000_000;

/// Smallest principal a stake position may hold (1 token).
pub const MIN_STAKING_THRESHOLD: u64 = NANOS_PER_TOKEN;

/// 100% expressed in basis points.
pub const BASIS_POINT_DENOMINATOR: u64 = 10_000;

/// `floor(a * b / c)` computed in u128.
///
/// # Errors
/// Returns `StakesetError::ArithmeticOverflow` if `c` is zero or the quotient
/// does not fit in a u64.
pub fn mul_div(a: u64, b: u64, c: u64, what: &'static str) -> Result<u64, StakesetError> {
    if c == 0 {
        return Err(StakesetError::ArithmeticOverflow(what));
    }
    let wide = (a as u128) * (b as u128) / (c as u128);
    u64::try_from(wide).map_err(|_| StakesetError::ArithmeticOverflow(what))
}

/// `floor(amount * rate_bps / 10_000)`.
///
/// Never overflows because `rate_bps` is checked to be at most 10_000 by the
/// callers, so the result is at most `amount`.
pub fn apply_bps(amount: u64, rate_bps: u64) -> u64 {
    ((amount as u128) * (rate_bps.min(BASIS_POINT_DENOMINATOR) as u128)
        / (BASIS_POINT_DENOMINATOR as u128)) as u64
}

/// An amount of the native token that is owned by whoever holds it.
///
/// `Balance` is deliberately not `Clone`: value moves between pools,
/// positions, reward buckets and the storage fund only through `split` and
/// `join`, so the sum over all live balances never changes except at
/// `Balance::new`, which is reserved for external inflows (gas charges,
/// genesis allocations, subsidy funding).
#[must_use]
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Balance {
    value: u64,
}

impl Balance {
    /// An empty balance.
    pub fn zero() -> Self {
        Self { value: 0 }
    }

    /// Bring external value into the system.
    pub fn new(value: u64) -> Self {
        Self { value }
    }

    /// Amount held, in nanos.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Move `amount` out of this balance into a new one.
    ///
    /// # Errors
    /// Returns `StakesetError::InsufficientBalance` if `amount` exceeds the
    /// held value. The balance is left unchanged on error.
    pub fn split(&mut self, amount: u64) -> Result<Balance, StakesetError> {
        if amount > self.value {
            return Err(StakesetError::InsufficientBalance {
                requested: amount,
                available: self.value,
            });
        }
        self.value -= amount;
        Ok(Balance { value: amount })
    }

    /// Absorb `other` into this balance. Returns the new value.
    pub fn join(&mut self, other: Balance) -> u64 {
        // Total supply is bounded by u64, so two live balances can't overflow.
        self.value += other.value;
        self.value
    }

    /// Move everything out, leaving this balance empty.
    pub fn withdraw_all(&mut self) -> Balance {
        Balance {
            value: std::mem::take(&mut self.value),
        }
    }

    /// Consume a balance that must be empty.
    ///
    /// # Errors
    /// Returns `StakesetError::NonZeroBalance` if any value remains.
    pub fn destroy_zero(self) -> Result<(), StakesetError> {
        if self.value != 0 {
            return Err(StakesetError::NonZeroBalance(self.value));
        }
        Ok(())
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.value / NANOS_PER_TOKEN;
        let frac = self.value % NANOS_PER_TOKEN;
        if frac == 0 {
            write!(f, "{}", whole)
        } else {
            // Display up to 9 decimal places, trimming trailing zeros
            let frac_str = format!("{:09}", frac);
            let trimmed = frac_str.trim_end_matches('0');
            write!(f, "{}.{}", whole, trimmed)
        }
    }
}
