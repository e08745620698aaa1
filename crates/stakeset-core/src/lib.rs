// crates/stakeset-core/src/lib.rs
//
// stakeset-core: identifiers, hashing, and the error type shared by every
// crate in the stakeset workspace.
//
// This is the leaf crate that all other crates in the workspace depend on.
// It defines the 32-byte identifiers used for validator addresses, staking
// pools and operation capabilities, and the single protocol-wide error enum.

pub mod crypto;
pub mod error;
pub mod identity;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use stakeset_core::Address;`

// Identity types
pub use identity::{Address, CapId, PoolId, SYSTEM_ADDRESS};

// Error type
pub use error::StakesetError;
