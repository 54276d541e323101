//! Difficulty retargeting.
//!
//! The target is recomputed at the start of every window of `work_diff_window_size` main chain
//! blocks from an exponentially weighted average of the last `work_diff_windows` window
//! durations, most recent window weighted heaviest. Only the selected parent lineage is used,
//! so the result is a function of the main parent chain alone.

use crate::chain_params::ChainParams;
use dagchain_dag::{BlockIndex, NodeId};
use dagchain_primitives::pow::{big_to_compact, compact_to_big};
use num_bigint::BigUint;
use num_traits::Zero;

/// Returns the bits a block whose main parent is `main_parent` must carry.
pub fn calc_next_required_difficulty(
    index: &BlockIndex,
    main_parent: Option<NodeId>,
    params: &ChainParams,
) -> u32 {
    let Some(main_parent) = main_parent else {
        return params.pow_limit_bits;
    };

    let parent = index.node(main_parent);
    let window_size = params.work_diff_window_size.max(1);

    if params.no_retargeting || (parent.layer() + 1) % window_size != 0 {
        return parent.bits();
    }

    let pow_limit = compact_to_big(params.pow_limit_bits);
    let old_target = compact_to_big(parent.bits());
    let target_timespan = params.target_timespan().max(1);
    let windows = params.work_diff_windows;
    let nodes_to_traverse = window_size * windows;

    let mut weighted_sum = BigUint::zero();
    let mut weights = BigUint::zero();
    let mut window_period = 0;
    let mut old_node = parent;
    let mut recent_time = u64::from(parent.timestamp());

    for i in 0..=nodes_to_traverse {
        if i % window_size == 0 && i != 0 {
            let older_time = u64::from(old_node.timestamp());
            let time_difference = if old_node.is_genesis() {
                target_timespan
            } else {
                recent_time.saturating_sub(older_time)
            };

            let shift = ((windows - window_period) * params.work_diff_alpha) as usize;
            let window_adjusted = (BigUint::from(time_difference) << 32usize) / target_timespan;
            weighted_sum += window_adjusted << shift;
            weights += BigUint::from(1u8) << shift;

            window_period += 1;
            recent_time = older_time;
        }

        if i == nodes_to_traverse {
            break;
        }

        if let Some(selected_parent) = old_node.selected_parent() {
            old_node = index.node(selected_parent);
        }
    }

    let factor = BigUint::from(params.retarget_adjustment_factor.max(1));
    let min_target = &old_target / &factor;
    let max_target = &old_target * &factor;

    let mut next_target = if weights.is_zero() {
        old_target.clone()
    } else {
        (&old_target * (weighted_sum / weights)) >> 32usize
    };

    if next_target.is_zero() {
        next_target = pow_limit.clone();
    } else if next_target > max_target {
        next_target = max_target;
    } else if next_target < min_target {
        next_target = min_target;
    }

    if next_target > pow_limit {
        next_target = pow_limit;
    }

    let next_bits = big_to_compact(&next_target);
    tracing::debug!(
        "Difficulty retarget at layer {}, old bits: {:08x}, new bits: {next_bits:08x}",
        parent.layer() + 1,
        parent.bits(),
    );

    next_bits
}

/// Returns the easiest target a block `duration` seconds after a block with `bits` could
/// legitimately reach, assuming the target grew by the maximum factor at every retarget.
pub fn calc_easiest_difficulty(bits: u32, duration: u64, params: &ChainParams) -> u32 {
    let pow_limit = compact_to_big(params.pow_limit_bits);
    let factor = params.retarget_adjustment_factor.max(1);
    let max_retarget_timespan = (params.target_timespan() * factor).max(1);

    let mut target = compact_to_big(bits);
    let mut remaining = duration;
    while remaining > 0 && target < pow_limit {
        target *= factor;
        remaining = remaining.saturating_sub(max_retarget_timespan);
    }

    if target > pow_limit {
        target = pow_limit;
    }

    big_to_compact(&target)
}
