// crates/stakeset-economics/src/slashing.rs
//
// Tallying-rule reports and the slashed-set computation.
//
// During an epoch, active validators report peers they consider
// underperforming. At the boundary, a validator whose combined reporter
// voting power reaches the quorum threshold is slashed: a fraction of its
// rewards (the slashing rate, in basis points) is withheld and redistributed
// to the unslashed validators.
//
// Records are keyed reportee -> set of reporters. Sets make reporting
// idempotent: a second report from the same reporter changes nothing.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use stakeset_core::{Address, StakesetError};

/// Peer reports filed during the current epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecords {
    records: BTreeMap<Address, BTreeSet<Address>>,
}

impl ReportRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `reporter` reports `reportee`. Repeating it is a no-op.
    ///
    /// # Errors
    /// Returns `StakesetError::CannotReportOneself` for self-reports.
    pub fn report(&mut self, reporter: Address, reportee: Address) -> Result<(), StakesetError> {
        if reporter == reportee {
            return Err(StakesetError::CannotReportOneself(reporter));
        }
        self.records.entry(reportee).or_default().insert(reporter);
        Ok(())
    }

    /// Withdraw a report filed earlier.
    ///
    /// # Errors
    /// Returns `StakesetError::ReportRecordNotFound` if no such report exists.
    pub fn undo_report(&mut self, reporter: Address, reportee: Address) -> Result<(), StakesetError> {
        let not_found = StakesetError::ReportRecordNotFound { reporter, reportee };
        let reporters = self.records.get_mut(&reportee).ok_or(not_found.clone())?;
        if !reporters.remove(&reporter) {
            return Err(not_found);
        }
        if reporters.is_empty() {
            self.records.remove(&reportee);
        }
        Ok(())
    }

    /// Drop every record mentioning `leaving`, as reportee or reporter.
    pub fn clear_leaving(&mut self, leaving: &Address) {
        self.records.remove(leaving);
        self.records.retain(|_, reporters| {
            reporters.remove(leaving);
            !reporters.is_empty()
        });
    }

    /// Who reported `reportee`, if anyone.
    pub fn reporters_of(&self, reportee: &Address) -> Option<&BTreeSet<Address>> {
        self.records.get(reportee)
    }

    /// Number of reporters against `reportee`.
    pub fn report_count(&self, reportee: &Address) -> usize {
        self.records.get(reportee).map_or(0, BTreeSet::len)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &BTreeSet<Address>)> {
        self.records.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Validators whose reporters' combined voting power reaches `quorum_threshold`.
///
/// `voting_power_of` resolves an active validator's voting power.
///
/// # Errors
/// Returns `StakesetError::NotAValidator` if a reporter or reportee is not in
/// the active set. Departures clear their records, so this indicates corrupted
/// state.
pub fn compute_slashed_validators<F>(
    records: &ReportRecords,
    quorum_threshold: u64,
    voting_power_of: F,
) -> Result<BTreeSet<Address>, StakesetError>
where
    F: Fn(&Address) -> Option<u64>,
{
    let mut slashed = BTreeSet::new();
    for (reportee, reporters) in records.iter() {
        if voting_power_of(reportee).is_none() {
            return Err(StakesetError::NotAValidator(*reportee));
        }
        let mut reporter_power = 0u64;
        for reporter in reporters {
            let power = voting_power_of(reporter).ok_or(StakesetError::NotAValidator(*reporter))?;
            reporter_power = reporter_power.saturating_add(power);
        }
        if reporter_power >= quorum_threshold {
            slashed.insert(*reportee);
        }
    }
    Ok(slashed)
}
