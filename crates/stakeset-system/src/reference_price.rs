// crates/stakeset-system/src/reference_price.rs
//
// Reference gas price derivation.
//
// Each validator's quote is a vote weighted by its voting power. Quotes are
// taken from the highest down until the accumulated weight reaches
// TOTAL - QUORUM; the quote at that point is the reference price. At least a
// third of the committee by weight quoted at or above it, so a small minority
// posting extreme prices cannot move it.

use std::collections::BinaryHeap;

use crate::voting_power::{QUORUM_THRESHOLD, TOTAL_VOTING_POWER};

/// Reference price from `(gas_price, voting_power)` quotes.
///
/// Returns 0 for an empty committee.
pub fn derive_reference_gas_price(quotes: impl IntoIterator<Item = (u64, u64)>) -> u64 {
    let mut heap: BinaryHeap<(u64, u64)> = quotes.into_iter().collect();
    let threshold = TOTAL_VOTING_POWER - QUORUM_THRESHOLD;

    let mut accumulated = 0u64;
    let mut price = 0u64;
    while accumulated < threshold {
        let Some((quote, power)) = heap.pop() else {
            break;
        };
        price = quote;
        accumulated += power;
    }
    price
}
