use crate::{beacon_state::BeaconState, schemas::NetworkStats};

/// Registry-wide validator counts at `epoch`, derived from its snapshot.
///
/// A validator counts as exited once its exit epoch has passed; otherwise it
/// counts as active from its activation epoch on. Slashing is tracked
/// independently of the lifecycle.
pub fn network_stats(epoch: u64, state: &BeaconState) -> NetworkStats {
    let mut stats = NetworkStats { epoch, ..Default::default() };
    for validator in &state.data.validators {
        if validator.slashed {
            stats.n_of_slashed_validators += 1;
        }
        if validator.exit_epoch <= epoch {
            stats.n_of_exited_validators += 1;
        } else if validator.activation_epoch <= epoch {
            stats.n_of_active_validators += 1;
        }
    }
    stats
}
