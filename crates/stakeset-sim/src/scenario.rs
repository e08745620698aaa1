// crates/stakeset-sim/src/scenario.rs
//
// Builds a genesis committee from a `SimConfig` and drives it through epoch
// boundaries, submitting the scheduled delegator and operator requests along
// the way. Rejected requests are logged and skipped so one bad entry does not
// end the run.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::SimConfig;
use crate::output::{format_tokens, RateRow, ValidatorRow};
use stakeset_core::crypto::hash_parts;
use stakeset_core::{Address, PoolId, StakesetError, SYSTEM_ADDRESS};
use stakeset_economics::{Balance, StakePosition, StakeSubsidy, NANOS_PER_TOKEN};
use stakeset_system::{
    AdvanceEpochParams, OperationCap, SystemState, Validator, ValidatorMetadata, ValidatorSet,
};

/// Registered operator of one genesis validator.
struct Operator {
    address: Address,
    pool_id: PoolId,
    cap: OperationCap,
}

/// State of the committee after one boundary.
#[derive(Debug, Clone, Serialize)]
pub struct EpochReport {
    pub epoch: u64,
    pub safe_mode: bool,
    pub error: Option<String>,
    pub reference_gas_price: u64,
    pub total_stake: String,
    pub storage_fund: String,
    pub refunded_storage_rebate: u64,
    pub validators: Vec<ValidatorRow>,
}

pub struct Scenario {
    config: SimConfig,
    state: SystemState,
    operators: BTreeMap<String, Operator>,
    /// Open delegations, indexed like `config.delegations`.
    positions: Vec<Option<StakePosition>>,
}

impl Scenario {
    /// Build the genesis state described by `config`.
    pub fn build(config: SimConfig) -> Result<Self, StakesetError> {
        let mut validators = Vec::new();
        let mut operators = BTreeMap::new();
        for (i, spec) in config.validators.iter().enumerate() {
            let address = Address::from_low_u64(i as u64 + 1);
            let metadata = ValidatorMetadata::new(
                address,
                spec.name.clone(),
                format!("/dns/{}.stakeset/tcp/8080", spec.name),
                hex_key(address),
            );
            let (mut validator, cap) = Validator::new(metadata, spec.gas_price, spec.commission_rate)?;
            let stake = tokens(spec.stake_tokens)?;
            // Genesis stake is held by the operator outside the simulation.
            let _position = validator.request_add_stake_at_genesis(Balance::new(stake))?;
            operators.insert(
                spec.name.clone(),
                Operator {
                    address,
                    pool_id: validator.pool_id(),
                    cap,
                },
            );
            validators.push(validator);
        }

        let set = ValidatorSet::new(validators, 0)?;
        let subsidy = StakeSubsidy::new(
            Balance::new(tokens(config.subsidy.balance_tokens)?),
            tokens(config.subsidy.distribution_tokens)?,
            config.subsidy.period_length,
            config.subsidy.decrease_rate,
        )?;
        let state = SystemState::new(
            set,
            Balance::new(tokens(config.storage_fund_tokens)?),
            subsidy,
            config.parameters.clone(),
            1,
            0,
        )?;
        tracing::info!(
            validators = operators.len(),
            total_stake = state.total_stake(),
            "genesis built"
        );

        let positions = config.delegations.iter().map(|_| None).collect();
        Ok(Self {
            config,
            state,
            operators,
            positions,
        })
    }

    pub fn state(&self) -> &SystemState {
        &self.state
    }

    /// Advance through every configured epoch.
    pub fn run(&mut self) -> Result<Vec<EpochReport>, StakesetError> {
        (1..=self.config.epochs)
            .map(|epoch| self.step(epoch))
            .collect()
    }

    /// Submit the requests scheduled during `new_epoch - 1`, then cross into `new_epoch`.
    pub fn step(&mut self, new_epoch: u64) -> Result<EpochReport, StakesetError> {
        self.submit_requests(new_epoch - 1);

        let flows = &self.config.flows;
        let params = AdvanceEpochParams {
            new_epoch,
            next_protocol_version: self.state.protocol_version(),
            storage_charge: flows.storage_charge,
            computation_charge: flows.computation_charge,
            storage_rebate: flows.storage_rebate,
            non_refundable_storage_fee: flows.non_refundable_storage_fee,
            storage_fund_reinvest_rate: flows.storage_fund_reinvest_rate,
            reward_slashing_rate: flows.reward_slashing_rate,
            epoch_start_timestamp_ms: new_epoch * self.config.parameters.epoch_duration_ms,
        };
        let outcome = self.state.advance_epoch_or_safe_mode(SYSTEM_ADDRESS, &params)?;
        Ok(self.report(
            outcome.safe_mode,
            outcome.error.map(|e| e.to_string()),
            outcome.refunded_storage_rebate.value(),
        ))
    }

    /// Exchange-rate history of a genesis validator's pool.
    pub fn rates(&self, name: &str) -> Result<Vec<RateRow>, StakesetError> {
        let operator = lookup(&self.operators, name)?;
        Ok(self
            .state
            .pool_exchange_rates(&operator.pool_id)?
            .iter()
            .map(|(epoch, rate)| RateRow::new(epoch, rate))
            .collect())
    }

    fn report(&self, safe_mode: bool, error: Option<String>, refunded: u64) -> EpochReport {
        let validators = self.state.validators();
        EpochReport {
            epoch: self.state.epoch(),
            safe_mode,
            error,
            reference_gas_price: self.state.reference_gas_price(),
            total_stake: format_tokens(self.state.total_stake()),
            storage_fund: format_tokens(self.state.storage_fund().total_balance()),
            refunded_storage_rebate: refunded,
            validators: validators
                .active_validators()
                .iter()
                .map(|v| {
                    ValidatorRow::new(
                        v,
                        validators.at_risk_epochs(&v.address()),
                        self.state.report_records().report_count(&v.address()),
                    )
                })
                .collect(),
        }
    }

    fn submit_requests(&mut self, epoch: u64) {
        for (i, spec) in self.config.delegations.iter().enumerate() {
            if spec.epoch == epoch {
                let result = lookup(&self.operators, &spec.validator).and_then(|op| {
                    let stake = tokens(spec.amount_tokens)?;
                    self.state.request_add_stake(op.address, Balance::new(stake))
                });
                match result {
                    Ok(position) => self.positions[i] = Some(position),
                    Err(e) => log_rejected("stake", &spec.validator, &e),
                }
            }
            if spec.withdraw_epoch == Some(epoch) {
                if let Some(position) = self.positions[i].take() {
                    match self.state.request_withdraw_stake(position) {
                        Ok(out) => tracing::info!(
                            validator = %spec.validator,
                            amount = out.value(),
                            "stake withdrawn"
                        ),
                        Err(e) => log_rejected("withdraw", &spec.validator, &e),
                    }
                }
            }
        }

        for spec in self.config.reports.iter().filter(|s| s.epoch == epoch) {
            let result = lookup(&self.operators, &spec.reporter).and_then(|reporter| {
                let reportee = lookup(&self.operators, &spec.reportee)?.address;
                self.state.report_validator(&reporter.cap, reportee)
            });
            if let Err(e) = result {
                log_rejected("report", &spec.reporter, &e);
            }
        }

        for spec in self.config.removals.iter().filter(|s| s.epoch == epoch) {
            let result = lookup(&self.operators, &spec.validator)
                .and_then(|op| self.state.request_remove_validator(&op.cap));
            if let Err(e) = result {
                log_rejected("remove", &spec.validator, &e);
            }
        }

        for spec in self.config.gas_price_changes.iter().filter(|s| s.epoch == epoch) {
            let result = lookup(&self.operators, &spec.validator)
                .and_then(|op| self.state.request_set_gas_price(&op.cap, spec.gas_price));
            if let Err(e) = result {
                log_rejected("set gas price", &spec.validator, &e);
            }
        }
    }
}

fn lookup<'a>(operators: &'a BTreeMap<String, Operator>, name: &str) -> Result<&'a Operator, StakesetError> {
    operators
        .get(name)
        .ok_or_else(|| StakesetError::NotFound(format!("validator {}", name)))
}

fn tokens(amount: u64) -> Result<u64, StakesetError> {
    amount
        .checked_mul(NANOS_PER_TOKEN)
        .ok_or(StakesetError::ArithmeticOverflow("token amount"))
}

fn hex_key(address: Address) -> String {
    hex::encode(hash_parts(&[b"protocol-key", address.as_bytes()]))
}

fn log_rejected(request: &str, validator: &str, error: &StakesetError) {
    tracing::warn!(request, validator, error = %error, "request rejected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DelegationSpec, EpochFlows, RemovalSpec, ReportSpec, ValidatorSpec};
    use stakeset_system::SystemParameters;

    fn config() -> SimConfig {
        SimConfig {
            epochs: 3,
            parameters: SystemParameters {
                min_validator_count: 1,
                min_validator_joining_stake: 100 * NANOS_PER_TOKEN,
                validator_low_stake_threshold: 50 * NANOS_PER_TOKEN,
                validator_very_low_stake_threshold: 10 * NANOS_PER_TOKEN,
                ..SystemParameters::default()
            },
            flows: EpochFlows {
                computation_charge: 4_000_000,
                ..EpochFlows::default()
            },
            validators: ["a", "b", "c", "d"]
                .iter()
                .map(|name| ValidatorSpec {
                    name: name.to_string(),
                    stake_tokens: 100,
                    commission_rate: 0,
                    gas_price: 1_000,
                })
                .collect(),
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_run_reports_every_epoch() {
        let mut scenario = Scenario::build(config()).unwrap();
        let reports = scenario.run().unwrap();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[2].epoch, 3);
        assert!(reports.iter().all(|r| !r.safe_mode));
        assert_eq!(reports[0].validators.len(), 4);
        assert_eq!(reports[0].reference_gas_price, 1_000);
    }

    #[test]
    fn test_scheduled_removal_and_delegation() {
        let mut config = config();
        config.removals.push(RemovalSpec {
            epoch: 0,
            validator: "d".to_string(),
        });
        config.delegations.push(DelegationSpec {
            epoch: 0,
            validator: "a".to_string(),
            amount_tokens: 10,
            withdraw_epoch: Some(2),
        });
        let mut scenario = Scenario::build(config).unwrap();

        let first = scenario.step(1).unwrap();
        assert_eq!(first.validators.len(), 3);
        assert!(scenario.positions[0].is_some());
        scenario.step(2).unwrap();
        let third = scenario.step(3).unwrap();
        assert!(scenario.positions[0].is_none());
        assert_eq!(third.validators.len(), 3);
    }

    #[test]
    fn test_unknown_names_are_skipped() {
        let mut config = config();
        config.reports.push(ReportSpec {
            epoch: 0,
            reporter: "a".to_string(),
            reportee: "nobody".to_string(),
        });
        let mut scenario = Scenario::build(config).unwrap();
        assert!(!scenario.step(1).unwrap().safe_mode);
        assert!(scenario.state().report_records().is_empty());
    }

    #[test]
    fn test_rates_history_per_epoch() {
        let mut scenario = Scenario::build(config()).unwrap();
        scenario.run().unwrap();
        let rates = scenario.rates("a").unwrap();
        // Activation at genesis plus one snapshot per boundary.
        assert_eq!(rates.len(), 4);
        assert_eq!(rates[0].value, 100 * NANOS_PER_TOKEN);
        assert_eq!(rates[1].value, 100 * NANOS_PER_TOKEN + 1_000_000);
        assert!(scenario.rates("nobody").is_err());
    }
}
