// crates/stakeset-system/src/lib.rs
//
// stakeset-system: the validator committee and the system state that drives
// it from one epoch to the next.
//
// Validators move through candidate -> pending-active -> active -> inactive.
// At each boundary rewards are distributed (with tallying-rule slashing),
// pools settle, the committee is reshaped, and voting power and the
// reference gas price are recomputed. A failed advance rolls back and
// enters safe mode.

pub mod capability;
pub mod params;
pub mod reference_price;
pub mod system_state;
pub mod validator;
pub mod validator_set;
pub mod versioned;
pub mod voting_power;

pub use capability::{CapScope, OperationCap, VerifiedCap};
pub use params::{
    AdvanceEpochParams, SystemParameters, MAX_COMMISSION_RATE, MAX_VALIDATOR_GAS_PRICE,
    SYSTEM_STATE_VERSION,
};
pub use reference_price::derive_reference_gas_price;
pub use system_state::{storage_fund_reward_share, EpochOutcome, SystemState};
pub use validator::{Validator, ValidatorMetadata};
pub use validator_set::{DepartureReason, EpochChanges, ValidatorSet};
pub use versioned::VersionedValidator;
pub use voting_power::{
    derive_voting_powers, voting_power_cap, MAX_VOTING_POWER, QUORUM_THRESHOLD, TOTAL_VOTING_POWER,
};
