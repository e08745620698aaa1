// crates/stakeset-sim/src/output.rs
//
// Output formatting utilities for the simulator.
// Supports table and JSON output modes.

use serde::Serialize;
use tabled::{Table, Tabled};

use stakeset_economics::{ExchangeRate, NANOS_PER_TOKEN};
use stakeset_system::{SystemParameters, Validator};

/// Output format for simulator commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed table output (default).
    Table,
    /// JSON output for machine consumption.
    Json,
}

impl OutputFormat {
    pub fn from_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Table
        }
    }
}

/// Format a slice of Tabled items as a table string.
pub fn format_table<T: Tabled>(data: &[T]) -> String {
    Table::new(data).to_string()
}

/// Format a serializable value as a pretty-printed JSON string.
pub fn format_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|e| format!("JSON serialization error: {}", e))
}

/// Nanos rendered as whole tokens with nine decimals.
pub fn format_tokens(nanos: u64) -> String {
    format!("{}.{:09}", nanos / NANOS_PER_TOKEN, nanos % NANOS_PER_TOKEN)
}

/// One line of the committee table.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct ValidatorRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Address")]
    pub address: String,
    #[tabled(rename = "Stake")]
    pub stake: String,
    #[tabled(rename = "VP")]
    pub voting_power: u64,
    #[tabled(rename = "Commission (bps)")]
    pub commission_rate: u64,
    #[tabled(rename = "Gas price")]
    pub gas_price: u64,
    #[tabled(rename = "Pool value")]
    pub pool_value: u64,
    #[tabled(rename = "Pool tokens")]
    pub pool_tokens: u64,
    #[tabled(rename = "At risk")]
    pub at_risk_epochs: u64,
    #[tabled(rename = "Reports")]
    pub reports: usize,
}

impl ValidatorRow {
    pub fn new(validator: &Validator, at_risk_epochs: u64, reports: usize) -> Self {
        let rate = validator.latest_exchange_rate();
        Self {
            name: validator.name().to_string(),
            address: validator.address().short(),
            stake: format_tokens(validator.stake_amount()),
            voting_power: validator.voting_power(),
            commission_rate: validator.commission_rate(),
            gas_price: validator.gas_price(),
            pool_value: rate.value,
            pool_tokens: rate.pool_tokens,
            at_risk_epochs,
            reports,
        }
    }
}

/// One recorded exchange-rate snapshot.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct RateRow {
    #[tabled(rename = "Epoch")]
    pub epoch: u64,
    #[tabled(rename = "Value")]
    pub value: u64,
    #[tabled(rename = "Pool tokens")]
    pub pool_tokens: u64,
    #[tabled(rename = "Value per token")]
    pub value_per_token: String,
}

impl RateRow {
    pub fn new(epoch: u64, rate: ExchangeRate) -> Self {
        let value_per_token = if rate.pool_tokens == 0 {
            "-".to_string()
        } else {
            format!("{:.9}", rate.value as f64 / rate.pool_tokens as f64)
        };
        Self {
            epoch,
            value: rate.value,
            pool_tokens: rate.pool_tokens,
            value_per_token,
        }
    }
}

/// One parameter and its effective value.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct ParamRow {
    #[tabled(rename = "Parameter")]
    pub name: &'static str,
    #[tabled(rename = "Value")]
    pub value: String,
}

pub fn param_rows(params: &SystemParameters) -> Vec<ParamRow> {
    let row = |name, value: String| ParamRow { name, value };
    vec![
        row("epoch_duration_ms", params.epoch_duration_ms.to_string()),
        row("stake_subsidy_start_epoch", params.stake_subsidy_start_epoch.to_string()),
        row("max_validator_count", params.max_validator_count.to_string()),
        row("min_validator_count", params.min_validator_count.to_string()),
        row(
            "min_validator_joining_stake",
            format_tokens(params.min_validator_joining_stake),
        ),
        row(
            "validator_low_stake_threshold",
            format_tokens(params.validator_low_stake_threshold),
        ),
        row(
            "validator_very_low_stake_threshold",
            format_tokens(params.validator_very_low_stake_threshold),
        ),
        row(
            "validator_low_stake_grace_period",
            params.validator_low_stake_grace_period.to_string(),
        ),
    ]
}
