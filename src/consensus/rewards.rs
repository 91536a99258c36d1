//! Block subsidy schedule.
//!
//! The reward starts at 50 and integer-halves every 210,000 blocks, which
//! bounds total issuance below `MAX_SUPPLY`. A block's reward depends only
//! on its height.

use crate::constants::{HALVING_INTERVAL, INITIAL_SUBSIDY, MAX_SUPPLY};

/// Mining reward for a block at the given height.
pub fn block_reward(height: i64) -> u64 {
    let halvings = height.max(0) / HALVING_INTERVAL;
    if halvings >= 64 {
        return 0;
    }
    INITIAL_SUBSIDY >> halvings
}

/// Total subsidy issued for all heights `0..=height`.
///
/// Simulation helper used to check the supply bound; not on any hot path.
pub fn issued_through(height: i64) -> u64 {
    let mut total = 0u64;
    let mut era = 0i64;
    loop {
        let reward = block_reward(era * HALVING_INTERVAL);
        if reward == 0 {
            return total;
        }
        let era_start = era * HALVING_INTERVAL;
        if height < era_start {
            return total;
        }
        let blocks_in_era = (height - era_start + 1).min(HALVING_INTERVAL) as u64;
        total += reward * blocks_in_era;
        era += 1;
    }
}

/// Number of heights that mint a non-zero reward.
pub fn minable_heights() -> i64 {
    let mut eras = 0i64;
    while block_reward(eras * HALVING_INTERVAL) > 0 {
        eras += 1;
    }
    eras * HALVING_INTERVAL
}

/// True when the schedule's total issuance stays within the supply cap.
pub fn supply_within_cap() -> bool {
    issued_through(minable_heights()) <= MAX_SUPPLY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_reward() {
        assert_eq!(block_reward(0), 50);
        assert_eq!(block_reward(1), 50);
        assert_eq!(block_reward(HALVING_INTERVAL - 1), 50);
    }

    #[test]
    fn test_halvings() {
        assert_eq!(block_reward(HALVING_INTERVAL), 25);
        assert_eq!(block_reward(2 * HALVING_INTERVAL), 12);
        assert_eq!(block_reward(3 * HALVING_INTERVAL), 6);
        assert_eq!(block_reward(4 * HALVING_INTERVAL), 3);
        assert_eq!(block_reward(5 * HALVING_INTERVAL), 1);
    }

    #[test]
    fn test_reward_reaches_zero() {
        assert_eq!(block_reward(6 * HALVING_INTERVAL), 0);
        assert_eq!(block_reward(7 * HALVING_INTERVAL), 0);
        assert_eq!(block_reward(i64::MAX), 0);
    }

    #[test]
    fn test_reward_monotone_nonincreasing() {
        let mut previous = block_reward(0);
        for era in 1..8 {
            let reward = block_reward(era * HALVING_INTERVAL);
            assert!(reward <= previous);
            previous = reward;
        }
    }

    #[test]
    fn test_supply_never_exceeds_cap() {
        assert!(supply_within_cap());
        // 210_000 * (50 + 25 + 12 + 6 + 3 + 1)
        assert_eq!(issued_through(minable_heights()), 20_370_000);
    }

    #[test]
    fn test_issued_through_partial_era() {
        assert_eq!(issued_through(0), 50);
        assert_eq!(issued_through(9), 500);
        assert_eq!(
            issued_through(HALVING_INTERVAL),
            50 * HALVING_INTERVAL as u64 + 25
        );
    }
}
