//! The adaptive PoW difficulty controller.
//!
//! A pure function of the current difficulty, the epoch's submission
//! count, the active node count and the epoch number. Small deviations
//! from the expected node count nudge difficulty by one step, large
//! deviations scale proportionally, and the step is capped to prevent
//! oscillation. During the first decade, difficulty also rises by one
//! every year's worth of blocks to track hardware improvement.

use kestrel_types::ProtocolConfig;

const MAX_ADJUST_STEP: i64 = 2;
const MAX_ADJUST_THRESHOLD: i64 = 99;
const MAX_INCREASE_DIFFICULTY_YEARS: u64 = 10;
const SECONDS_PER_YEAR: u64 = 365 * 24 * 3600;

/// Compute the next-epoch difficulty.
///
/// `submissions` is the number of PoW submissions collected this epoch,
/// `active_nodes` the number of nodes currently serving the network, and
/// `epoch` the current epoch number (used for the annual bump).
pub fn next_difficulty(
    cfg: &ProtocolConfig,
    current: u8,
    submissions: i64,
    active_nodes: i64,
    epoch: u64,
) -> u8 {
    let mut adjustment: i64 = 0;
    if active_nodes > 0 && active_nodes != submissions {
        let diff = submissions.saturating_sub(active_nodes);

        // Threshold scaled to the network size, so the adjustment still
        // works on small networks.
        let mut threshold = active_nodes
            .saturating_mul(cfg.pow_change_percent_to_adj_diff)
            .checked_div(100)
            .unwrap_or(0);
        if threshold > MAX_ADJUST_THRESHOLD {
            threshold = MAX_ADJUST_THRESHOLD;
        }

        if diff.abs() < threshold {
            if diff > 0 && submissions > cfg.num_network_node {
                adjustment = 1;
            } else if diff < 0 && submissions < cfg.num_network_node {
                adjustment = -1;
            }
        } else {
            adjustment = diff.checked_div(threshold).unwrap_or(0);
        }
    }

    adjustment = adjustment.clamp(-MAX_ADJUST_STEP, MAX_ADJUST_STEP);

    let floor = cfg.pow_difficulty as i64;
    let mut next = (current as i64 + adjustment).max(floor).min(u8::MAX as i64) as u8;

    // Annual bump during the first decade.
    let seconds_per_block = cfg.pow_window_in_seconds / cfg.num_final_block_per_pow.max(1)
        + cfg.tx_distribute_time_in_ms / 1000;
    if seconds_per_block > 0 {
        let mut blocks_per_year = SECONDS_PER_YEAR / seconds_per_block;
        blocks_per_year =
            (blocks_per_year / cfg.num_final_block_per_pow.max(1)) * cfg.num_final_block_per_pow;
        if blocks_per_year > 0
            && epoch / blocks_per_year <= MAX_INCREASE_DIFFICULTY_YEARS
            && epoch % blocks_per_year == 0
        {
            next = next.saturating_add(1);
        }
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProtocolConfig {
        ProtocolConfig {
            pow_window_in_seconds: 300,
            num_final_block_per_pow: 50,
            tx_distribute_time_in_ms: 10_000,
            num_network_node: 100,
            pow_change_percent_to_adj_diff: 50,
            pow_difficulty: 3,
            ..ProtocolConfig::default()
        }
    }

    #[test]
    fn test_tiny_network_no_change() {
        // Submissions exactly match active nodes: no adjustment.
        assert_eq!(next_difficulty(&config(), 5, 10, 10, 1), 5);
    }

    #[test]
    fn test_small_surplus_steps_up_by_one() {
        // active=100, submissions=110: threshold 50, |diff|=10 < 50,
        // diff > 0 and submissions > NUM_NETWORK_NODE.
        assert_eq!(next_difficulty(&config(), 5, 110, 100, 1), 6);
    }

    #[test]
    fn test_small_deficit_steps_down_by_one() {
        assert_eq!(next_difficulty(&config(), 6, 90, 100, 1), 5);
    }

    #[test]
    fn test_large_deviation_scales_and_clamps() {
        // diff = 200, threshold = 50 -> raw adjustment 4, clamped to +2.
        assert_eq!(next_difficulty(&config(), 5, 300, 100, 1), 7);
        // diff = -75, threshold = 50 -> raw adjustment -1 (integer
        // division), applied as-is.
        assert_eq!(next_difficulty(&config(), 6, 25, 100, 1), 5);
    }

    #[test]
    fn test_floor_at_minimum_difficulty() {
        // Adjustment would push below POW_DIFFICULTY; clamped to floor.
        assert_eq!(next_difficulty(&config(), 3, 10, 100, 1), 3);
    }

    #[test]
    fn test_annual_bump() {
        // 31536000 / (300/50 + 10000/1000) = 1971000, already a multiple
        // of 50.
        let cfg = config();
        assert_eq!(next_difficulty(&cfg, 5, 10, 10, 1_971_000), 6);
        assert_eq!(next_difficulty(&cfg, 5, 10, 10, 1_971_001), 5);
        // Beyond ten years, no bump.
        assert_eq!(next_difficulty(&cfg, 5, 10, 10, 1_971_000 * 11), 5);
    }

    #[test]
    fn test_step_bound_invariant() {
        let cfg = config();
        for submissions in [0i64, 1, 50, 99, 100, 101, 150, 500, 10_000] {
            for active in [0i64, 1, 10, 100, 1_000] {
                let next = next_difficulty(&cfg, 10, submissions, active, 7);
                let delta = (next as i64 - 10).abs();
                assert!(delta <= 2, "delta {delta} for s={submissions} n={active}");
                assert!(next >= cfg.pow_difficulty);
            }
        }
    }

    #[test]
    fn test_zero_active_nodes_no_adjustment() {
        assert_eq!(next_difficulty(&config(), 9, 500, 0, 1), 9);
    }
}
