// crates/stakeset-economics/src/rewards.rs
//
// Reward share computation for one epoch.
//
// Two reward tracks are split across the committee:
//   1. Staking reward: stake-weighted, floor(vp * total / total_vp).
//   2. Storage-fund reward: equal split, floor(total / n). This is rent paid
//      by all transactions rather than a yield on stake.
// Validators in the slashed set lose `slashing_rate` bps of each track; the
// withheld amounts are redistributed to the unslashed validators, by voting
// power for the staking track and equally for the storage track.
//
// Every division floors. The sum of the returned shares never exceeds the
// inputs; the remainder stays with the caller and is routed to the storage
// fund, so nothing is lost.
//
// Committee members are addressed by their index in the active list.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::token::{apply_bps, mul_div};
use stakeset_core::StakesetError;

/// Per-validator reward amounts, indexed like the active committee.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardShares {
    /// Staking-reward share per validator (in nanos).
    pub staking: Vec<u64>,
    /// Storage-fund-reward share per validator (in nanos).
    pub storage: Vec<u64>,
}

impl RewardShares {
    pub fn total_staking(&self) -> u64 {
        self.staking.iter().sum()
    }

    pub fn total_storage(&self) -> u64 {
        self.storage.iter().sum()
    }
}

/// Amounts withheld from slashed validators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardAdjustments {
    pub total_staking: u64,
    pub total_storage: u64,
    /// Withheld staking reward per slashed validator index.
    pub individual_staking: BTreeMap<usize, u64>,
    /// Withheld storage reward per slashed validator index.
    pub individual_storage: BTreeMap<usize, u64>,
}

/// Shares before any slashing.
///
/// # Errors
/// Returns `StakesetError::EmptyValidatorSet` for an empty committee.
pub fn compute_unadjusted_shares(
    voting_powers: &[u64],
    total_voting_power: u64,
    total_staking_reward: u64,
    total_storage_reward: u64,
) -> Result<RewardShares, StakesetError> {
    if voting_powers.is_empty() {
        return Err(StakesetError::EmptyValidatorSet);
    }
    let count = voting_powers.len() as u64;
    let staking = voting_powers
        .iter()
        .map(|&vp| mul_div(vp, total_staking_reward, total_voting_power, "staking reward share"))
        .collect::<Result<Vec<_>, _>>()?;
    let storage = vec![total_storage_reward / count; voting_powers.len()];
    Ok(RewardShares { staking, storage })
}

/// Withheld amounts for each slashed validator, per track.
pub fn compute_adjustments(
    slashed: &BTreeSet<usize>,
    unadjusted: &RewardShares,
    slashing_rate_bps: u64,
) -> RewardAdjustments {
    let mut adjustments = RewardAdjustments::default();
    for &index in slashed {
        let staking = apply_bps(unadjusted.staking[index], slashing_rate_bps);
        let storage = apply_bps(unadjusted.storage[index], slashing_rate_bps);
        adjustments.total_staking += staking;
        adjustments.total_storage += storage;
        adjustments.individual_staking.insert(index, staking);
        adjustments.individual_storage.insert(index, storage);
    }
    adjustments
}

/// Apply `adjustments`: slashed validators lose theirs, unslashed validators
/// share the totals.
pub fn compute_adjusted_shares(
    voting_powers: &[u64],
    unadjusted: &RewardShares,
    adjustments: &RewardAdjustments,
) -> Result<RewardShares, StakesetError> {
    let unslashed_power: u64 = voting_powers
        .iter()
        .enumerate()
        .filter(|(i, _)| !adjustments.individual_staking.contains_key(i))
        .map(|(_, &vp)| vp)
        .sum();
    let unslashed_count = (voting_powers.len() - adjustments.individual_staking.len()) as u64;

    let mut adjusted = RewardShares {
        staking: Vec::with_capacity(voting_powers.len()),
        storage: Vec::with_capacity(voting_powers.len()),
    };
    for (index, &vp) in voting_powers.iter().enumerate() {
        let staking = unadjusted.staking[index];
        let storage = unadjusted.storage[index];
        let (staking, storage) = match adjustments.individual_staking.get(&index) {
            Some(&withheld) => {
                let storage_withheld = adjustments
                    .individual_storage
                    .get(&index)
                    .copied()
                    .unwrap_or(0);
                (staking - withheld, storage - storage_withheld)
            }
            None => {
                // All validators slashed: nothing to redistribute to.
                let staking_bonus = if unslashed_power > 0 {
                    mul_div(adjustments.total_staking, vp, unslashed_power, "staking adjustment")?
                } else {
                    0
                };
                let storage_bonus = if unslashed_count > 0 {
                    adjustments.total_storage / unslashed_count
                } else {
                    0
                };
                (
                    staking
                        .checked_add(staking_bonus)
                        .ok_or(StakesetError::ArithmeticOverflow("adjusted staking reward"))?,
                    storage
                        .checked_add(storage_bonus)
                        .ok_or(StakesetError::ArithmeticOverflow("adjusted storage reward"))?,
                )
            }
        };
        adjusted.staking.push(staking);
        adjusted.storage.push(storage);
    }
    Ok(adjusted)
}

/// Full pipeline: unadjusted shares, slashing adjustments, redistribution.
pub fn compute_reward_shares(
    voting_powers: &[u64],
    total_voting_power: u64,
    slashed: &BTreeSet<usize>,
    slashing_rate_bps: u64,
    total_staking_reward: u64,
    total_storage_reward: u64,
) -> Result<RewardShares, StakesetError> {
    let unadjusted = compute_unadjusted_shares(
        voting_powers,
        total_voting_power,
        total_staking_reward,
        total_storage_reward,
    )?;
    let adjustments = compute_adjustments(slashed, &unadjusted, slashing_rate_bps);
    compute_adjusted_shares(voting_powers, &unadjusted, &adjustments)
}

/// Split a staking reward into (commission, staker share).
pub fn split_commission(staking_reward: u64, commission_rate_bps: u64) -> (u64, u64) {
    let commission = apply_bps(staking_reward, commission_rate_bps);
    (commission, staking_reward - commission)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOTAL_VP: u64 = 10_000;

    #[test]
    fn test_unadjusted_staking_is_stake_weighted() {
        let shares = compute_unadjusted_shares(&[5_000, 3_000, 2_000], TOTAL_VP, 1_000, 0).unwrap();
        assert_eq!(shares.staking, vec![500, 300, 200]);
    }

    #[test]
    fn test_unadjusted_storage_is_equal_split() {
        let shares = compute_unadjusted_shares(&[8_000, 1_000, 1_000], TOTAL_VP, 0, 1_000).unwrap();
        assert_eq!(shares.storage, vec![333, 333, 333]);
    }

    #[test]
    fn test_empty_committee_rejected() {
        assert_eq!(
            compute_unadjusted_shares(&[], TOTAL_VP, 10, 10),
            Err(StakesetError::EmptyValidatorSet)
        );
    }

    #[test]
    fn test_slashed_rewards_redistributed() {
        let vp = [5_000, 3_000, 2_000];
        let slashed: BTreeSet<usize> = [2].into_iter().collect();
        let shares = compute_reward_shares(&vp, TOTAL_VP, &slashed, 5_000, 1_000, 300).unwrap();

        // Validator 2 loses half of 200 staking and 100 storage.
        assert_eq!(shares.staking[2], 100);
        assert_eq!(shares.storage[2], 50);
        // 100 withheld staking split 5:3 among the rest.
        assert_eq!(shares.staking[0], 500 + 62);
        assert_eq!(shares.staking[1], 300 + 37);
        // 50 withheld storage split equally.
        assert_eq!(shares.storage[0], 125);
        assert_eq!(shares.storage[1], 125);
    }

    #[test]
    fn test_everyone_slashed_leaves_remainder_undistributed() {
        let vp = [5_000, 5_000];
        let slashed: BTreeSet<usize> = [0, 1].into_iter().collect();
        let shares = compute_reward_shares(&vp, TOTAL_VP, &slashed, 10_000, 1_000, 1_000).unwrap();
        assert_eq!(shares.staking, vec![0, 0]);
        assert_eq!(shares.storage, vec![0, 0]);
    }

    #[test]
    fn test_shares_never_exceed_inputs() {
        let committees: [&[u64]; 4] = [
            &[10_000],
            &[3_334, 3_333, 3_333],
            &[1_000; 10],
            &[4_001, 2_999, 1_500, 1_000, 500],
        ];
        for vp in committees {
            for rate in [0u64, 1, 3_333, 10_000] {
                for slashed_index in 0..vp.len() {
                    let slashed: BTreeSet<usize> = [slashed_index].into_iter().collect();
                    let staking_total = 1_000_000_007;
                    let storage_total = 999_999_937;
                    let shares = compute_reward_shares(
                        vp,
                        TOTAL_VP,
                        &slashed,
                        rate,
                        staking_total,
                        storage_total,
                    )
                    .unwrap();
                    assert!(shares.total_staking() <= staking_total);
                    assert!(shares.total_storage() <= storage_total);
                }
            }
        }
    }

    #[test]
    fn test_split_commission() {
        assert_eq!(split_commission(1_000, 1_000), (100, 900));
        assert_eq!(split_commission(999, 0), (0, 999));
        assert_eq!(split_commission(7, 2_000), (1, 6));
    }
}
