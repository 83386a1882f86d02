use crate::{
    consensus::{ConsensusClient, ProposerDuty},
    error::Error,
    network::NetworkParameters,
};
use std::collections::HashMap;
use tracing::warn;

/// Scheduled versus observed proposals for one epoch, keyed by validator
/// index. A missed or orphaned block counts as a non-proposal.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProposalMetrics {
    scheduled_by_index: HashMap<u64, u64>,
    proposed_by_index: HashMap<u64, u64>,
}

impl ProposalMetrics {
    pub fn from_observations(duties: &[ProposerDuty], proposed: &[u64]) -> Self {
        let mut metrics = Self::default();
        for duty in duties {
            *metrics.scheduled_by_index.entry(duty.validator_index).or_default() += 1;
        }
        for index in proposed {
            *metrics.proposed_by_index.entry(*index).or_default() += 1;
        }
        metrics
    }

    /// `(scheduled, proposed)` summed over a pool's validator indexes.
    pub fn pool_counts(&self, indexes: &[u64]) -> (u64, u64) {
        let scheduled = indexes
            .iter()
            .filter_map(|index| self.scheduled_by_index.get(index))
            .sum();
        let proposed = indexes
            .iter()
            .filter_map(|index| self.proposed_by_index.get(index))
            .sum();
        (scheduled, proposed)
    }
}

pub struct ProposalDuties {
    consensus: ConsensusClient,
    params: NetworkParameters,
}

impl ProposalDuties {
    pub fn new(consensus: ConsensusClient, params: NetworkParameters) -> Self {
        Self { consensus, params }
    }

    /// Who is scheduled to propose each slot of `epoch`.
    pub async fn get_proposal_duties(&self, epoch: u64) -> Result<Vec<ProposerDuty>, Error> {
        self.consensus.proposer_duties(epoch).await
    }

    /// Proposer indexes of the blocks actually observed during `epoch`.
    pub async fn get_proposed_blocks(&self, epoch: u64) -> Result<Vec<u64>, Error> {
        let mut proposed = Vec::new();
        let first_slot = self.params.first_slot(epoch);
        for slot in first_slot..first_slot + self.params.slots_in_epoch {
            match self.consensus.signed_beacon_block(slot).await? {
                Some(block) => proposed.push(block.proposer_index()),
                None => warn!(slot, "no block proposed at slot"),
            }
        }
        Ok(proposed)
    }
}
