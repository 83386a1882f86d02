use crate::{
    beacon_block::Fork, pools::BlsPublicKey, schemas::ValidatorPerformanceMetrics,
};
use alloy_primitives::U256;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

// GASPER participation flag bits of the participation bitfield.
pub const TIMELY_SOURCE_FLAG: u8 = 1;
pub const TIMELY_TARGET_FLAG: u8 = 1 << 1;
pub const TIMELY_HEAD_FLAG: u8 = 1 << 2;

/// A beacon state snapshot as served by the debug state endpoint, reduced to
/// the fields the differ reads.
///
/// A snapshot is only meaningful next to its immediate predecessor; the
/// scheduler enforces that pairing before calling [`pool_performance`].
#[derive(Debug, Clone, Deserialize)]
pub struct BeaconState {
    pub version: Fork,
    pub data: BeaconStateData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BeaconStateData {
    #[serde(with = "crate::serde::as_str")]
    pub slot: u64,
    pub validators: Vec<Validator>,
    #[serde(with = "crate::serde::seq_of_str")]
    pub balances: Vec<u64>,
    // Absent before Altair, where attestations were accounted differently.
    #[serde(with = "crate::serde::seq_of_str", default)]
    pub previous_epoch_participation: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Validator {
    pub pubkey: BlsPublicKey,
    #[serde(with = "crate::serde::as_str")]
    pub effective_balance: u64,
    pub slashed: bool,
    #[serde(with = "crate::serde::as_str")]
    pub activation_epoch: u64,
    #[serde(with = "crate::serde::as_str")]
    pub exit_epoch: u64,
}

impl BeaconState {
    pub fn epoch(&self, slots_in_epoch: u64) -> u64 {
        self.data.slot / slots_in_epoch
    }

    /// Pubkey-to-index map for this snapshot. Rebuilt per state rather than
    /// cached: the registry grows and a stale map would miss new entrants.
    pub fn key_to_index(&self) -> HashMap<BlsPublicKey, u64> {
        self.data
            .validators
            .iter()
            .enumerate()
            .map(|(index, validator)| (validator.pubkey, index as u64))
            .collect()
    }
}

/// Resolves pool keys against a snapshot's index map, dropping unknown keys.
pub fn indexes_from_keys(
    keys: &[BlsPublicKey],
    key_to_index: &HashMap<BlsPublicKey, u64>,
) -> Vec<u64> {
    keys.iter().filter_map(|key| key_to_index.get(key).copied()).collect()
}

/// Diffs two consecutive snapshots for one pool.
///
/// `state` must be the snapshot immediately following `prev_state`; the
/// participation bitfield of `state` reports the votes cast during the
/// previous epoch, and balance deltas are net of `withdrawals` so that a
/// withdrawal is not booked as a loss.
#[allow(clippy::too_many_arguments)]
pub fn pool_performance(
    pool_name: &str,
    keys: &[BlsPublicKey],
    state: &BeaconState,
    prev_state: &BeaconState,
    key_to_index: &HashMap<BlsPublicKey, u64>,
    mev_wei: U256,
    withdrawals: &HashMap<u64, u64>,
    slots_in_epoch: u64,
) -> ValidatorPerformanceMetrics {
    let epoch = state.epoch(slots_in_epoch);
    let attested_epoch = epoch.saturating_sub(1);

    let mut metrics = ValidatorPerformanceMetrics {
        epoch,
        pool_name: pool_name.to_string(),
        mev_rewards_wei: mev_wei,
        ..Default::default()
    };

    for key in keys {
        let Some(&index) = key_to_index.get(key) else {
            warn!(pool = pool_name, pubkey = %key, "validator key not found in the registry");
            continue;
        };
        metrics.n_of_validating_keys += 1;

        let Some(validator) = state.data.validators.get(index as usize) else {
            continue;
        };
        let active = validator.activation_epoch <= attested_epoch
            && attested_epoch < validator.exit_epoch;
        if active {
            if let Some(flags) = state.data.previous_epoch_participation.get(index as usize) {
                metrics.n_of_total_votes += 1;
                if flags & TIMELY_HEAD_FLAG == 0 {
                    metrics.n_of_incorrect_head += 1;
                }
                if flags & TIMELY_SOURCE_FLAG == 0 {
                    metrics.n_of_incorrect_source += 1;
                }
                if flags & TIMELY_TARGET_FLAG == 0 {
                    metrics.n_of_incorrect_target += 1;
                }
            }
        }

        let Some(&balance) = state.data.balances.get(index as usize) else {
            continue;
        };
        // Validators that joined after the previous snapshot have no delta.
        let Some(&prev_balance) = prev_state.data.balances.get(index as usize) else {
            continue;
        };
        let withdrawn = withdrawals.get(&index).copied().unwrap_or_default();
        let delta = balance as i64 - prev_balance as i64 - withdrawn as i64;
        if delta >= 0 {
            metrics.earned_balance_gwei += delta as u64;
        } else {
            metrics.lost_balance_gwei += delta.unsigned_abs();
            metrics.n_of_vals_with_less_balance += 1;
        }
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    fn test_key(fill: u8) -> BlsPublicKey {
        BlsPublicKey::from([fill; 48])
    }

    fn test_validator(fill: u8, activation_epoch: u64, exit_epoch: u64) -> Validator {
        Validator {
            pubkey: test_key(fill),
            effective_balance: 32_000_000_000,
            slashed: false,
            activation_epoch,
            exit_epoch,
        }
    }

    fn state_at(slot: u64, balances: Vec<u64>, participation: Vec<u8>) -> BeaconState {
        BeaconState {
            version: Fork::Capella,
            data: BeaconStateData {
                slot,
                validators: vec![
                    test_validator(1, 0, u64::MAX),
                    test_validator(2, 0, u64::MAX),
                    test_validator(3, 0, 2), // exited before the diffed epoch
                ],
                balances,
                previous_epoch_participation: participation,
            },
        }
    }

    #[test]
    fn counts_votes_and_balance_deltas() {
        let slots_in_epoch = 32;
        // Snapshots for epochs 9 and 10.
        let prev = state_at(319, vec![32_000_000_000, 32_000_000_000, 31_000_000_000], vec![7, 7, 7]);
        let state = state_at(
            351,
            vec![32_000_011_000, 31_999_999_500, 31_000_000_000],
            // validator 1 voted fully, validator 2 missed head and target
            vec![0b111, 0b001, 0],
        );

        let keys = vec![test_key(1), test_key(2), test_key(3), test_key(9)];
        let key_to_index = state.key_to_index();
        let withdrawals = HashMap::from([(0u64, 10_000u64)]);

        let metrics = pool_performance(
            "pool1",
            &keys,
            &state,
            &prev,
            &key_to_index,
            U256::from(7),
            &withdrawals,
            slots_in_epoch,
        );

        // Key 9 is unknown, key 3 exited at epoch 2 so it no longer votes.
        assert_eq!(metrics.epoch, 10);
        assert_eq!(metrics.n_of_validating_keys, 3);
        assert_eq!(metrics.n_of_total_votes, 2);
        assert_eq!(metrics.n_of_incorrect_head, 1);
        assert_eq!(metrics.n_of_incorrect_target, 1);
        assert_eq!(metrics.n_of_incorrect_source, 0);
        // Validator 0: +11000 − 10000 withdrawn = +1000. Validator 1: −500.
        assert_eq!(metrics.earned_balance_gwei, 1_000);
        assert_eq!(metrics.lost_balance_gwei, 500);
        assert_eq!(metrics.n_of_vals_with_less_balance, 1);
        assert_eq!(metrics.mev_rewards_wei, U256::from(7));
    }

    #[test]
    fn incorrect_counts_never_exceed_total_votes() {
        let prev = state_at(319, vec![0, 0, 0], vec![0, 0, 0]);
        let state = state_at(351, vec![0, 0, 0], vec![0, 0, 0]);
        let keys = vec![test_key(1), test_key(2), test_key(3)];
        let key_to_index = state.key_to_index();

        let metrics = pool_performance(
            "pool1",
            &keys,
            &state,
            &prev,
            &key_to_index,
            U256::ZERO,
            &HashMap::new(),
            32,
        );

        assert!(metrics.n_of_incorrect_head <= metrics.n_of_total_votes);
        assert!(metrics.n_of_incorrect_source <= metrics.n_of_total_votes);
        assert!(metrics.n_of_incorrect_target <= metrics.n_of_total_votes);
        // Every active validator with all-zero flags is incorrect everywhere.
        assert_eq!(metrics.n_of_total_votes, 2);
        assert_eq!(metrics.n_of_incorrect_head, 2);
    }

    #[test]
    fn earned_minus_lost_matches_the_net_delta() {
        let prev = state_at(319, vec![100, 200, 300], vec![7, 7, 7]);
        let state = state_at(351, vec![150, 170, 300], vec![7, 7, 7]);
        let keys = vec![test_key(1), test_key(2), test_key(3)];
        let key_to_index = state.key_to_index();
        let withdrawals = HashMap::from([(0u64, 20u64)]);

        let metrics = pool_performance(
            "pool1",
            &keys,
            &state,
            &prev,
            &key_to_index,
            U256::ZERO,
            &withdrawals,
            32,
        );

        // Deltas: +30, −30, 0 → earned 30, lost 30.
        assert_eq!(metrics.earned_balance_gwei, 30);
        assert_eq!(metrics.lost_balance_gwei, 30);
        let net: i64 = (150 - 100 - 20) + (170 - 200) + (300 - 300);
        assert_eq!(metrics.earned_balance_gwei as i64 - metrics.lost_balance_gwei as i64, net);
    }

    #[test]
    fn new_entrants_are_skipped_in_the_delta() {
        let mut prev = state_at(319, vec![100, 100], vec![7, 7]);
        prev.data.validators.pop();
        let state = state_at(351, vec![100, 100, 32_000_000_000], vec![7, 7, 7]);
        let keys = vec![test_key(1), test_key(2), test_key(3)];
        let key_to_index = state.key_to_index();

        let metrics = pool_performance(
            "pool1",
            &keys,
            &state,
            &prev,
            &key_to_index,
            U256::ZERO,
            &HashMap::new(),
            32,
        );

        // The third validator has no previous balance; nothing accrues.
        assert_eq!(metrics.earned_balance_gwei, 0);
        assert_eq!(metrics.lost_balance_gwei, 0);
        assert_eq!(metrics.n_of_validating_keys, 3);
    }
}
