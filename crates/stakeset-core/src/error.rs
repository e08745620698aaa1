use thiserror::Error;

use crate::identity::{Address, PoolId};

/// Protocol-wide error types for the stakeset validator committee.
///
/// Precondition failures abort the whole operation with no partial effects.
/// Invariant failures (exchange-rate mismatch, fungible supply mismatch,
/// overflow) should never occur; during an epoch advance they push the system
/// into safe mode.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StakesetError {
    // -----------------------------------------------------------------
    // Balance and stake preconditions
    // -----------------------------------------------------------------
    /// A deposit or stake request carried no value.
    #[error("Amount must be greater than zero")]
    ZeroAmount,

    /// A stake request is smaller than the minimum staking threshold.
    #[error("Stake of {amount} is below the minimum of {minimum}")]
    BelowMinimumStake { amount: u64, minimum: u64 },

    /// A split would leave one side of a principal position below the threshold.
    #[error("Split would leave a stake position below the minimum of {minimum}")]
    SplitBelowThreshold { minimum: u64 },

    /// Tried to take more value out of a balance than it holds.
    #[error("Insufficient balance: requested {requested} but only {available} available")]
    InsufficientBalance { requested: u64, available: u64 },

    /// Tried to split more pool tokens than a fungible position holds.
    #[error("Insufficient pool tokens: requested {requested} but only {available} available")]
    InsufficientPoolTokens { requested: u64, available: u64 },

    /// A non-empty balance was destroyed as if it were empty.
    #[error("Balance still holds {0}")]
    NonZeroBalance(u64),

    /// A stake position was presented to a pool it does not belong to.
    #[error("Stake position belongs to pool {position} but was presented to pool {pool}")]
    WrongPool { position: PoolId, pool: PoolId },

    /// Two positions cannot be joined (different pool or activation epoch, or different kinds).
    #[error("Stake positions are not compatible for joining")]
    IncompatiblePositions,

    /// A principal position cannot become fungible before it starts earning.
    #[error("Stake activates at epoch {activation_epoch}, current epoch is {current_epoch}")]
    NotYetActive {
        activation_epoch: u64,
        current_epoch: u64,
    },

    // -----------------------------------------------------------------
    // Pool lifecycle
    // -----------------------------------------------------------------
    /// Deposit into, or deactivation of, a pool that is already deactivated.
    #[error("Staking pool {0} is inactive")]
    InactivePool(PoolId),

    /// Activation of a pool that already has an activation epoch.
    #[error("Staking pool {0} is already active")]
    PoolAlreadyActive(PoolId),

    /// The pool holds fungible stake data only after the first conversion.
    #[error("Staking pool {0} has no fungible stake supply")]
    NoFungibleSupply(PoolId),

    /// No active, candidate or inactive validator owns this pool.
    #[error("No staking pool found with id {0}")]
    NoPoolFound(PoolId),

    // -----------------------------------------------------------------
    // Invariant violations
    // -----------------------------------------------------------------
    /// Double-width ratio math produced a result that does not fit in u64.
    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    /// Pool-token supply diverged from the value implied by the recorded rate.
    #[error("Pool token supply {actual} does not match {expected} implied by the exchange rate at epoch {epoch}")]
    ExchangeRateMismatch {
        epoch: u64,
        expected: u64,
        actual: u64,
    },

    /// Redeemed principal plus reward exceeded the value of the redeemed tokens.
    #[error("Fungible stake redemption of {withdrawn} exceeds token value {expected}")]
    FungibleSupplyMismatch { withdrawn: u64, expected: u64 },

    /// Exchange rates are keyed by strictly increasing epochs.
    #[error("Exchange rate for epoch {epoch} is not after the latest recorded epoch {latest}")]
    NonMonotonicEpoch { epoch: u64, latest: u64 },

    /// A rate parameter exceeded 100% (10_000 basis points).
    #[error("Rate of {0} basis points exceeds 10000")]
    BpsTooLarge(u64),

    // -----------------------------------------------------------------
    // Validator set and capabilities
    // -----------------------------------------------------------------
    /// The capability does not match the one currently registered on the validator.
    #[error("Operation capability is not valid for validator {0}")]
    InvalidCap(Address),

    /// Address is not an active validator.
    #[error("{0} is not an active validator")]
    NotAValidator(Address),

    /// Address is not a validator candidate.
    #[error("{0} is not a validator candidate")]
    NotACandidate(Address),

    /// Address is already registered as a candidate.
    #[error("{0} is already a validator candidate")]
    AlreadyCandidate(Address),

    /// Another validator already uses this address, name, network address or key.
    #[error("Validator {0} duplicates the identity of an existing validator")]
    DuplicateValidator(Address),

    /// The validator already requested removal this epoch.
    #[error("Validator {0} is already pending removal")]
    ValidatorAlreadyRemoved(Address),

    /// Committee size would leave the allowed range.
    #[error("Validator count limit exceeded: {0}")]
    LimitExceeded(String),

    /// Candidate stake below the committee admission threshold.
    #[error("Candidate stake {stake} is below the joining threshold {minimum}")]
    MinJoiningStakeNotReached { stake: u64, minimum: u64 },

    /// Commission above the maximum rate.
    #[error("Commission rate {0} exceeds the maximum")]
    CommissionRateTooHigh(u64),

    /// Gas price quote at or above the maximum.
    #[error("Gas price {0} exceeds the maximum")]
    GasPriceTooHigh(u64),

    /// A validator cannot report itself.
    #[error("Validator {0} cannot report itself")]
    CannotReportOneself(Address),

    /// No such report exists to undo.
    #[error("No report from {reporter} against {reportee}")]
    ReportRecordNotFound { reporter: Address, reportee: Address },

    /// Reward distribution needs at least one active validator.
    #[error("Active validator set is empty")]
    EmptyValidatorSet,

    // -----------------------------------------------------------------
    // Epoch advance
    // -----------------------------------------------------------------
    /// Only the reserved system address may advance the epoch.
    #[error("Caller {0} is not the system address")]
    NotSystemAddress(Address),

    /// Epoch advance must move exactly one epoch forward.
    #[error("Advanced to epoch {actual}, expected {expected}")]
    AdvancedToWrongEpoch { expected: u64, actual: u64 },

    // -----------------------------------------------------------------
    // General
    // -----------------------------------------------------------------
    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid state transition.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for StakesetError {
    fn from(e: serde_json::Error) -> Self {
        StakesetError::Serialization(e.to_string())
    }
}
