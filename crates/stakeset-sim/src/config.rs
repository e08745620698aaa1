// crates/stakeset-sim/src/config.rs
//
// Scenario configuration for the simulator.
// Loaded from a TOML file or populated with a small default committee.
//
// Amounts written in tokens are converted to nanos when the scenario is
// built. Scheduled actions name the epoch during which they are submitted;
// they take effect at the following boundary like any other request.

use serde::{Deserialize, Serialize};
use std::fs;

use stakeset_system::SystemParameters;

/// A full simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Number of epochs to advance.
    #[serde(default = "default_epochs")]
    pub epochs: u64,

    /// Protocol parameters. Missing fields take protocol defaults.
    #[serde(default)]
    pub parameters: SystemParameters,

    /// Initial storage fund, in tokens.
    #[serde(default)]
    pub storage_fund_tokens: u64,

    #[serde(default)]
    pub subsidy: SubsidyConfig,

    /// Charges and rates applied at every boundary.
    #[serde(default)]
    pub flows: EpochFlows,

    /// Genesis committee, in address order starting at 0x1.
    #[serde(default = "default_validators")]
    pub validators: Vec<ValidatorSpec>,

    #[serde(default)]
    pub delegations: Vec<DelegationSpec>,

    #[serde(default)]
    pub reports: Vec<ReportSpec>,

    #[serde(default)]
    pub removals: Vec<RemovalSpec>,

    #[serde(default)]
    pub gas_price_changes: Vec<GasPriceSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsidyConfig {
    #[serde(default)]
    pub balance_tokens: u64,
    #[serde(default)]
    pub distribution_tokens: u64,
    #[serde(default = "default_period_length")]
    pub period_length: u64,
    /// Basis points.
    #[serde(default)]
    pub decrease_rate: u64,
}

/// Per-epoch inflows and rates, in nanos and basis points.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpochFlows {
    #[serde(default)]
    pub storage_charge: u64,
    #[serde(default)]
    pub computation_charge: u64,
    #[serde(default)]
    pub storage_rebate: u64,
    #[serde(default)]
    pub non_refundable_storage_fee: u64,
    #[serde(default)]
    pub storage_fund_reinvest_rate: u64,
    #[serde(default)]
    pub reward_slashing_rate: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorSpec {
    pub name: String,
    pub stake_tokens: u64,
    #[serde(default)]
    pub commission_rate: u64,
    #[serde(default = "default_gas_price")]
    pub gas_price: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationSpec {
    pub epoch: u64,
    pub validator: String,
    pub amount_tokens: u64,
    /// Withdraw the position during this epoch.
    #[serde(default)]
    pub withdraw_epoch: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSpec {
    pub epoch: u64,
    pub reporter: String,
    pub reportee: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovalSpec {
    pub epoch: u64,
    pub validator: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasPriceSpec {
    pub epoch: u64,
    pub validator: String,
    pub gas_price: u64,
}

fn default_epochs() -> u64 {
    5
}

fn default_period_length() -> u64 {
    10
}

fn default_gas_price() -> u64 {
    1_000
}

fn default_validators() -> Vec<ValidatorSpec> {
    (1..=4)
        .map(|i| ValidatorSpec {
            name: format!("validator-{}", i),
            stake_tokens: 40_000_000,
            commission_rate: 200,
            gas_price: default_gas_price(),
        })
        .collect()
}

impl Default for SubsidyConfig {
    fn default() -> Self {
        Self {
            balance_tokens: 0,
            distribution_tokens: 0,
            period_length: default_period_length(),
            decrease_rate: 0,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            parameters: SystemParameters::default(),
            storage_fund_tokens: 0,
            subsidy: SubsidyConfig::default(),
            flows: EpochFlows::default(),
            validators: default_validators(),
            delegations: Vec::new(),
            reports: Vec::new(),
            removals: Vec::new(),
            gas_price_changes: Vec::new(),
        }
    }
}

impl SimConfig {
    /// Load a scenario from a TOML file at the given path.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: SimConfig = toml::from_str(contents)?;
        config.parameters.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = SimConfig::parse("").unwrap();
        assert_eq!(config.epochs, 5);
        assert_eq!(config.validators.len(), 4);
        assert_eq!(config.parameters, SystemParameters::default());
    }

    #[test]
    fn test_partial_parameters_keep_other_defaults() {
        let config = SimConfig::parse(
            r#"
            epochs = 3

            [parameters]
            min_validator_count = 1

            [[validators]]
            name = "alpha"
            stake_tokens = 100

            [[reports]]
            epoch = 1
            reporter = "alpha"
            reportee = "beta"
            "#,
        )
        .unwrap();
        assert_eq!(config.epochs, 3);
        assert_eq!(config.parameters.min_validator_count, 1);
        assert_eq!(config.parameters.max_validator_count, 150);
        assert_eq!(config.validators[0].gas_price, 1_000);
        assert_eq!(config.reports[0].reportee, "beta");
    }

    #[test]
    fn test_inconsistent_thresholds_rejected() {
        let result = SimConfig::parse(
            r#"
            [parameters]
            validator_low_stake_threshold = 10
            validator_very_low_stake_threshold = 20
            "#,
        );
        assert!(result.is_err());
    }
}
