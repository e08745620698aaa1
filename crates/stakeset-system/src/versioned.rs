// crates/stakeset-system/src/versioned.rs
//
// Versioned storage for long-lived validator records.
//
// Candidates and deactivated validators can sit in storage across protocol
// upgrades, so they are stored tagged with their layout version. Loading one
// runs every migration from its version to the latest before handing it out.

use serde::{Deserialize, Serialize};

use crate::validator::Validator;

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionedValidator {
    V1(Validator),
}

impl VersionedValidator {
    pub const LATEST_VERSION: u64 = 1;

    /// Wrap a validator in the latest layout.
    pub fn new(validator: Validator) -> Self {
        VersionedValidator::V1(validator)
    }

    pub fn version(&self) -> u64 {
        match self {
            VersionedValidator::V1(_) => 1,
        }
    }

    /// Migrate in place if needed, then borrow the validator.
    pub fn load_validator_maybe_upgrade(&mut self) -> &mut Validator {
        self.upgrade_to_latest();
        match self {
            VersionedValidator::V1(validator) => validator,
        }
    }

    /// Read-only view. Older layouts are read as they are stored.
    pub fn validator(&self) -> &Validator {
        match self {
            VersionedValidator::V1(validator) => validator,
        }
    }

    /// Migrate and unwrap.
    pub fn into_validator(mut self) -> Validator {
        self.upgrade_to_latest();
        match self {
            VersionedValidator::V1(validator) => validator,
        }
    }

    fn upgrade_to_latest(&mut self) {
        // One arm per version transition; V1 is current.
        match self {
            VersionedValidator::V1(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidatorMetadata;
    use stakeset_core::Address;

    #[test]
    fn test_load_returns_same_validator() {
        let metadata = ValidatorMetadata::new(Address::from_low_u64(1), "v1", "/dns/v1", "01");
        let (validator, _cap) = Validator::new(metadata, 10, 0).unwrap();
        let address = validator.address();
        let mut versioned = VersionedValidator::new(validator);
        assert_eq!(versioned.version(), VersionedValidator::LATEST_VERSION);
        assert_eq!(versioned.load_validator_maybe_upgrade().address(), address);
        assert_eq!(versioned.into_validator().address(), address);
    }

    #[test]
    fn test_round_trips_through_json() {
        let metadata = ValidatorMetadata::new(Address::from_low_u64(2), "v2", "/dns/v2", "02");
        let (validator, _cap) = Validator::new(metadata, 10, 0).unwrap();
        let versioned = VersionedValidator::new(validator);
        let json = serde_json::to_string(&versioned).unwrap();
        let back: VersionedValidator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, versioned);
    }
}
