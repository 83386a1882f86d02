use alloy_primitives::U256;

/// One pool's metrics for one epoch; persisted keyed by `(epoch, pool)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorPerformanceMetrics {
    pub epoch: u64,
    pub pool_name: String,
    /// Wall-clock seconds of the epoch's first slot.
    pub epoch_timestamp: i64,
    pub n_of_total_votes: u64,
    pub n_of_incorrect_source: u64,
    pub n_of_incorrect_target: u64,
    pub n_of_incorrect_head: u64,
    pub n_of_validating_keys: u64,
    pub n_of_vals_with_less_balance: u64,
    pub earned_balance_gwei: u64,
    pub lost_balance_gwei: u64,
    pub mev_rewards_wei: U256,
    /// Computed by the block-data extractor; carried here but not yet
    /// persisted as a column.
    pub proposer_tips_wei: i128,
    pub n_scheduled_blocks: u64,
    pub n_proposed_blocks: u64,
}

/// Registry-wide counts derived from one beacon state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub epoch: u64,
    pub n_of_active_validators: u64,
    pub n_of_exited_validators: u64,
    pub n_of_slashed_validators: u64,
}
