// crates/stakeset-system/src/capability.rs
//
// Operation capabilities.
//
// Every operator-facing call presents an `OperationCap`. The validator set
// resolves the validator named by the cap's authorizer and checks the cap id
// against the id currently registered on that validator; only then does it
// hand out a `VerifiedCap`, which the mutating code path consumes. Rotating a
// cap registers a new id, so every older cap stops verifying.
//
// Neither type can be constructed outside this crate.

use serde::Serialize;

use stakeset_core::{Address, CapId};

/// Authority to operate one validator.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct OperationCap {
    id: CapId,
    authorizer: Address,
}

impl OperationCap {
    pub(crate) fn issue(authorizer: Address, rotation: u64) -> Self {
        Self {
            id: CapId::derive(&authorizer, rotation),
            authorizer,
        }
    }

    pub fn id(&self) -> CapId {
        self.id
    }

    /// Validator this cap claims authority over.
    pub fn authorizer(&self) -> Address {
        self.authorizer
    }
}

/// Proof that a cap matched the registered id of `validator_address`.
#[derive(Debug, PartialEq, Eq)]
pub struct VerifiedCap {
    validator_address: Address,
}

impl VerifiedCap {
    pub(crate) fn new(validator_address: Address) -> Self {
        Self { validator_address }
    }

    pub fn validator_address(&self) -> Address {
        self.validator_address
    }
}

/// Which validators a cap may act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapScope {
    /// Active validators only.
    Active,
    /// Candidates only.
    Candidate,
    /// Active, pending-active or candidate.
    Any,
}
