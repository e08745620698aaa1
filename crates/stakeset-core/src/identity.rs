// crates/stakeset-core/src/identity.rs
//
// 32-byte identifiers used across the committee.
//
// Addresses identify validators and callers. Pool ids identify staking pools
// and outlive the validator that created them (inactive pools are retained
// forever). Capability ids identify the operation capability currently
// registered on a validator; rotating the capability changes the id.
//
// All three serialize as 0x-prefixed lowercase hex so they can be used as
// JSON map keys and written by hand in TOML scenarios.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::hash_parts;
use crate::error::StakesetError;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Raw bytes of the identifier.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// First four bytes as hex, for log lines and tables.
            pub fn short(&self) -> String {
                format!("0x{}", hex::encode(&self.0[..4]))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = StakesetError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let digits = s.strip_prefix("0x").unwrap_or(s);
                if digits.len() > 64 {
                    return Err(StakesetError::Serialization(format!(
                        "{} is longer than 32 bytes",
                        s
                    )));
                }
                // Short forms are left-padded, so "0x2" parses as ...0002.
                let padded = format!("{:0>64}", digits);
                let bytes = hex::decode(&padded)
                    .map_err(|e| StakesetError::Serialization(format!("{}: {}", s, e)))?;
                let mut out = [0u8; 32];
                out.copy_from_slice(&bytes);
                Ok(Self(out))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

define_id!(
    /// Account address of a validator operator, delegator, or the system.
    Address
);

define_id!(
    /// Identity of a staking pool.
    PoolId
);

define_id!(
    /// Identity of an operation capability.
    CapId
);

/// Reserved identity allowed to advance the epoch.
pub const SYSTEM_ADDRESS: Address = Address([0u8; 32]);

impl Address {
    /// Build an address whose last eight bytes hold `n` (big-endian).
    ///
    /// Handy for genesis fixtures and tests.
    pub fn from_low_u64(n: u64) -> Self {
        let mut out = [0u8; 32];
        out[24..].copy_from_slice(&n.to_be_bytes());
        Self(out)
    }
}

impl PoolId {
    /// Deterministic pool id for the pool created by `owner`.
    ///
    /// Every participant replaying the same history derives the same id.
    pub fn derive(owner: &Address) -> Self {
        Self(hash_parts(&[b"staking-pool", owner.as_bytes()]))
    }
}

impl CapId {
    /// Deterministic capability id for `owner` at the given rotation.
    pub fn derive(owner: &Address, rotation: u64) -> Self {
        Self(hash_parts(&[
            b"operation-cap",
            owner.as_bytes(),
            &rotation.to_be_bytes(),
        ]))
    }
}
