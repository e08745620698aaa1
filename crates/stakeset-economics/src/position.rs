// crates/stakeset-economics/src/position.rs
//
// Caller-held claims against a staking pool.
//
// A principal position holds the staked balance itself plus the epoch at
// which it starts earning; two principal positions are interchangeable only
// if they share pool and activation epoch. A fungible position holds pool
// tokens instead, so positions minted at different epochs merge freely; the
// value backing them sits in the pool's aggregate `FungibleSupply`.
//
// Neither kind is `Clone`. Every transition (withdraw, split, join, convert)
// takes the position by value, so a position can only disappear by being
// routed through one of them.

use serde::{Deserialize, Serialize};

use crate::token::{Balance, MIN_STAKING_THRESHOLD};
use stakeset_core::{PoolId, StakesetError};

/// Stake denominated in principal, earning from `activation_epoch` onward.
#[must_use]
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalStake {
    pool_id: PoolId,
    activation_epoch: u64,
    principal: Balance,
}

impl PrincipalStake {
    pub(crate) fn new(pool_id: PoolId, activation_epoch: u64, principal: Balance) -> Self {
        Self {
            pool_id,
            activation_epoch,
            principal,
        }
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub fn activation_epoch(&self) -> u64 {
        self.activation_epoch
    }

    /// Principal amount in nanos.
    pub fn amount(&self) -> u64 {
        self.principal.value()
    }

    pub(crate) fn into_principal(self) -> Balance {
        self.principal
    }

    /// Split `amount` off into a new position with the same pool and epoch.
    ///
    /// # Errors
    /// - `StakesetError::InsufficientBalance` if `amount` exceeds the principal.
    /// - `StakesetError::SplitBelowThreshold` if either part would be below
    ///   `MIN_STAKING_THRESHOLD`.
    pub fn split(&mut self, amount: u64) -> Result<PrincipalStake, StakesetError> {
        let original = self.principal.value();
        if amount > original {
            return Err(StakesetError::InsufficientBalance {
                requested: amount,
                available: original,
            });
        }
        let remaining = original - amount;
        if remaining < MIN_STAKING_THRESHOLD || amount < MIN_STAKING_THRESHOLD {
            return Err(StakesetError::SplitBelowThreshold {
                minimum: MIN_STAKING_THRESHOLD,
            });
        }
        Ok(PrincipalStake {
            pool_id: self.pool_id,
            activation_epoch: self.activation_epoch,
            principal: self.principal.split(amount)?,
        })
    }

    /// Merge `other` into this position.
    ///
    /// # Errors
    /// Returns `StakesetError::IncompatiblePositions` together with `other`,
    /// untouched, if pool or activation epoch differ.
    pub fn join(&mut self, other: PrincipalStake) -> Result<(), (StakesetError, PrincipalStake)> {
        if !self.is_equal_staking_metadata(&other) {
            return Err((StakesetError::IncompatiblePositions, other));
        }
        self.principal.join(other.principal);
        Ok(())
    }

    /// Same pool and same activation epoch.
    pub fn is_equal_staking_metadata(&self, other: &PrincipalStake) -> bool {
        self.pool_id == other.pool_id && self.activation_epoch == other.activation_epoch
    }
}

/// Stake denominated in pool tokens.
#[must_use]
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FungibleStake {
    pool_id: PoolId,
    pool_tokens: u64,
}

impl FungibleStake {
    pub(crate) fn new(pool_id: PoolId, pool_tokens: u64) -> Self {
        Self {
            pool_id,
            pool_tokens,
        }
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub fn pool_tokens(&self) -> u64 {
        self.pool_tokens
    }

    pub(crate) fn into_tokens(self) -> u64 {
        self.pool_tokens
    }

    /// Split `amount` pool tokens off into a new position.
    pub fn split(&mut self, amount: u64) -> Result<FungibleStake, StakesetError> {
        if amount > self.pool_tokens {
            return Err(StakesetError::InsufficientPoolTokens {
                requested: amount,
                available: self.pool_tokens,
            });
        }
        self.pool_tokens -= amount;
        Ok(FungibleStake {
            pool_id: self.pool_id,
            pool_tokens: amount,
        })
    }

    /// Merge `other` into this position. Only the pool has to match.
    pub fn join(&mut self, other: FungibleStake) -> Result<(), (StakesetError, FungibleStake)> {
        if self.pool_id != other.pool_id {
            return Err((StakesetError::IncompatiblePositions, other));
        }
        self.pool_tokens += other.pool_tokens;
        Ok(())
    }
}

/// A stake position of either kind, as handed to and returned by callers.
#[must_use]
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakePosition {
    Principal(PrincipalStake),
    Fungible(FungibleStake),
}

impl StakePosition {
    pub fn pool_id(&self) -> PoolId {
        match self {
            StakePosition::Principal(p) => p.pool_id(),
            StakePosition::Fungible(f) => f.pool_id(),
        }
    }

    /// Principal (for principal positions) or pool tokens (for fungible ones).
    pub fn amount(&self) -> u64 {
        match self {
            StakePosition::Principal(p) => p.amount(),
            StakePosition::Fungible(f) => f.pool_tokens(),
        }
    }

    pub fn is_fungible(&self) -> bool {
        matches!(self, StakePosition::Fungible(_))
    }

    /// Split `amount` off into a new position of the same kind.
    pub fn split(&mut self, amount: u64) -> Result<StakePosition, StakesetError> {
        match self {
            StakePosition::Principal(p) => p.split(amount).map(StakePosition::Principal),
            StakePosition::Fungible(f) => f.split(amount).map(StakePosition::Fungible),
        }
    }

    /// Merge `other` into this position.
    ///
    /// On failure `other` is handed back alongside the error so it is never lost.
    pub fn join(&mut self, other: StakePosition) -> Result<(), (StakesetError, StakePosition)> {
        match (self, other) {
            (StakePosition::Principal(a), StakePosition::Principal(b)) => {
                a.join(b).map_err(|(e, b)| (e, StakePosition::Principal(b)))
            }
            (StakePosition::Fungible(a), StakePosition::Fungible(b)) => {
                a.join(b).map_err(|(e, b)| (e, StakePosition::Fungible(b)))
            }
            (_, other) => Err((StakesetError::IncompatiblePositions, other)),
        }
    }
}

/// Aggregate backing for every fungible position of one pool.
///
/// The sum of all outstanding `FungibleStake::pool_tokens` equals
/// `total_supply`.
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FungibleSupply {
    pub(crate) total_supply: u64,
    pub(crate) principal: Balance,
}

impl FungibleSupply {
    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    pub fn principal(&self) -> u64 {
        self.principal.value()
    }
}
