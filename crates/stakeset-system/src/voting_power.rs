// crates/stakeset-system/src/voting_power.rs
//
// Stake-proportional voting power, normalized to a fixed budget.
//
// Each validator first gets floor(stake * TOTAL / total_stake), capped at the
// per-validator maximum. The remainder left by flooring and capping is then
// handed out in stake-descending order, each validator taking an even share
// of what is left without exceeding the cap. The result is deterministic:
// ties in stake keep their committee order.

use stakeset_core::StakesetError;

/// Voting power is normalized so the committee always sums to this.
pub const TOTAL_VOTING_POWER: u64 = 10_000;

/// Per-validator cap, when the committee is large enough to respect it.
pub const MAX_VOTING_POWER: u64 = 1_000;

/// Voting power needed for a quorum decision (just over 2/3).
pub const QUORUM_THRESHOLD: u64 = 6_667;

/// Per-validator cap for a committee of `count`.
///
/// Small committees cannot all stay under `MAX_VOTING_POWER`, so the cap is
/// raised to `ceil(TOTAL / count)`.
pub fn voting_power_cap(count: usize) -> u64 {
    if count == 0 {
        return TOTAL_VOTING_POWER;
    }
    let even_share = TOTAL_VOTING_POWER.div_ceil(count as u64);
    TOTAL_VOTING_POWER.min(MAX_VOTING_POWER.max(even_share))
}

/// Voting power for each stake, in the same order.
///
/// # Errors
/// Returns `StakesetError::InvalidState` if the normalized powers fail to sum
/// to `TOTAL_VOTING_POWER` or exceed the cap.
pub fn derive_voting_powers(stakes: &[u64]) -> Result<Vec<u64>, StakesetError> {
    if stakes.is_empty() {
        return Ok(Vec::new());
    }
    let cap = voting_power_cap(stakes.len());
    let total_stake: u128 = stakes.iter().map(|&s| s as u128).sum();

    let mut powers: Vec<u64> = stakes
        .iter()
        .map(|&stake| {
            if total_stake == 0 {
                0
            } else {
                let share = (stake as u128) * (TOTAL_VOTING_POWER as u128) / total_stake;
                (share as u64).min(cap)
            }
        })
        .collect();

    let mut order: Vec<usize> = (0..stakes.len()).collect();
    // Stable sort keeps committee order among equal stakes.
    order.sort_by(|&a, &b| stakes[b].cmp(&stakes[a]));

    let mut remaining = TOTAL_VOTING_POWER - powers.iter().sum::<u64>();
    for (position, &index) in order.iter().enumerate() {
        let left = (order.len() - position) as u64;
        let target = cap.min(powers[index] + remaining.div_ceil(left));
        let extra = remaining.min(target - powers[index]);
        powers[index] += extra;
        remaining -= extra;
    }

    if remaining != 0 || powers.iter().any(|&p| p > cap) {
        return Err(StakesetError::InvalidState(format!(
            "voting power normalization left {} undistributed",
            remaining
        )));
    }
    Ok(powers)
}
