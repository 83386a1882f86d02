use crate::{
    beacon_state::{indexes_from_keys, pool_performance, BeaconState},
    block_data::BlockData,
    config::Config,
    consensus::ConsensusClient,
    db::Database,
    duties::{ProposalDuties, ProposalMetrics},
    error::Error,
    execution::ExecutionClient,
    network::NetworkParameters,
    network_stats::network_stats,
    pools::Pools,
    relay_rewards::RelayRewards,
};
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
// Stay behind the head so participation accounting is final across reorgs.
const HEAD_EPOCH_LAG: u64 = 2;

/// Drives the per-epoch pipeline: head detection, backfill planning, state
/// diffing, and persistence.
pub struct Service {
    params: NetworkParameters,
    consensus: ConsensusClient,
    pools: Pools,
    db: Option<Database>,
    block_data: BlockData,
    duties: ProposalDuties,
    relay_rewards: RelayRewards,
    backfill_epochs: u64,
    epoch_debug: Option<u64>,
    prev_epoch: Option<u64>,
    prev_state: Option<BeaconState>,
}

impl Service {
    pub async fn new(config: Config) -> Result<Self, Error> {
        let epoch_debug = config
            .epoch_debug
            .as_deref()
            .map(|raw| {
                raw.parse::<u64>()
                    .map_err(|_| Error::Config(format!("could not parse epoch-debug `{raw}`")))
            })
            .transpose()?;

        let pools = Pools::load(&config.pool_names, config.validators_file.as_deref())?;
        for (pool, keys) in &pools.keys_per_pool {
            info!(%pool, keys = keys.len(), "monitoring pool");
        }

        let consensus = ConsensusClient::new(
            Url::parse(&config.eth2_address)?,
            config.credentials.as_deref(),
            config.state_timeout,
        )?;
        let execution = ExecutionClient::new(Url::parse(&config.eth1_address)?)?;

        let db = match config.database_path.as_deref() {
            Some(path) if !path.is_empty() => {
                let db = Database::new(path)?;
                db.create_tables()?;
                Some(db)
            }
            _ => {
                warn!("no database path provided, persistence is disabled");
                None
            }
        };

        let genesis = consensus.genesis().await?;
        let spec = consensus.spec().await?;
        let params = NetworkParameters {
            genesis_seconds: genesis.genesis_time,
            slots_in_epoch: spec.slots_per_epoch,
            seconds_per_slot: spec.seconds_per_slot,
        };
        info!(
            network = %config.network,
            genesis = params.genesis_seconds,
            slots_in_epoch = params.slots_in_epoch,
            seconds_per_slot = params.seconds_per_slot,
            "network parameters discovered"
        );

        let relay_rewards =
            RelayRewards::new(params, pools.key_to_pool.clone(), config.relay_servers.clone())?;
        let block_data = BlockData::new(consensus.clone(), execution, params);
        let duties = ProposalDuties::new(consensus.clone(), params);

        Ok(Self {
            params,
            consensus,
            pools,
            db,
            block_data,
            duties,
            relay_rewards,
            backfill_epochs: config.backfill_epochs,
            epoch_debug,
            prev_epoch: None,
            prev_state: None,
        })
    }

    pub async fn run(&mut self) -> Result<(), Error> {
        loop {
            let sync = match self.consensus.node_syncing().await {
                Ok(sync) => sync,
                Err(err) => {
                    error!(%err, "could not get node sync status");
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
            };
            if sync.is_syncing {
                error!("node is not in sync");
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }

            let mut current_epoch =
                (sync.head_slot / self.params.slots_in_epoch).saturating_sub(HEAD_EPOCH_LAG);
            if let Some(epoch) = self.epoch_debug {
                warn!(epoch, "debug mode, computing metrics for a single epoch");
                current_epoch = epoch;
            }

            if self.prev_epoch.is_some_and(|prev| prev >= current_epoch) {
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }

            let missing_epochs = match &self.db {
                Some(db) => match db.get_missing_epochs(current_epoch, self.backfill_epochs) {
                    Ok(epochs) => epochs,
                    Err(err) => {
                        error!(%err, "could not plan the backfill");
                        tokio::time::sleep(POLL_INTERVAL).await;
                        continue;
                    }
                },
                None => Vec::new(),
            };
            if !missing_epochs.is_empty() {
                info!(?missing_epochs, "backfilling epochs");
            }

            for epoch in missing_epochs.into_iter().chain([current_epoch]) {
                // A carried snapshot is only usable against its immediate
                // successor; anything else forces a fresh fetch.
                if let Some(prev) = &self.prev_state {
                    if prev.epoch(self.params.slots_in_epoch) + 1 != epoch {
                        self.prev_state = None;
                    }
                }
                let prev_state = self.prev_state.take();
                match self.process_epoch(epoch, prev_state).await {
                    Ok(state) => {
                        self.prev_state = Some(state);
                        self.prev_epoch = Some(epoch);
                    }
                    Err(err) => {
                        error!(epoch, %err, "error processing epoch");
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                }
            }

            if self.epoch_debug.is_some() {
                info!("debug run complete, exiting");
                return Ok(());
            }
        }
    }

    /// Processes one epoch end to end and returns its snapshot for the next
    /// tick's diff.
    async fn process_epoch(
        &self,
        epoch: u64,
        prev_state: Option<BeaconState>,
    ) -> Result<BeaconState, Error> {
        let duties = self.duties.get_proposal_duties(epoch).await?;
        let proposed = self.duties.get_proposed_blocks(epoch).await?;
        let proposal_metrics = ProposalMetrics::from_observations(&duties, &proposed);

        let state = self.consensus.beacon_state(self.params.last_slot(epoch)).await?;
        let prev_state = match prev_state {
            Some(state) => state,
            None => {
                let prev_epoch = epoch
                    .checked_sub(1)
                    .ok_or_else(|| Error::Config("cannot diff the genesis epoch".to_string()))?;
                self.consensus.beacon_state(self.params.last_slot(prev_epoch)).await?
            }
        };

        let key_to_index = state.key_to_index();
        let relay_rewards = self.relay_rewards.get_relay_rewards(epoch).await?;
        let withdrawals = self.block_data.epoch_withdrawals(epoch).await?;

        let stats = network_stats(epoch, &state);
        info!(
            epoch,
            active = stats.n_of_active_validators,
            exited = stats.n_of_exited_validators,
            slashed = stats.n_of_slashed_validators,
            "network stats"
        );

        for (pool, keys) in &self.pools.keys_per_pool {
            let indexes = indexes_from_keys(keys, &key_to_index);
            let mev_wei = relay_rewards.per_pool.get(pool).copied().unwrap_or_default();
            let mut metrics = pool_performance(
                pool,
                keys,
                &state,
                &prev_state,
                &key_to_index,
                mev_wei,
                &withdrawals,
                self.params.slots_in_epoch,
            );
            metrics.epoch_timestamp = self.params.epoch_timestamp(epoch);
            let (scheduled, proposed) = proposal_metrics.pool_counts(&indexes);
            metrics.n_scheduled_blocks = scheduled;
            metrics.n_proposed_blocks = proposed;

            info!(
                epoch,
                %pool,
                votes = metrics.n_of_total_votes,
                incorrect_head = metrics.n_of_incorrect_head,
                incorrect_source = metrics.n_of_incorrect_source,
                incorrect_target = metrics.n_of_incorrect_target,
                earned_gwei = metrics.earned_balance_gwei,
                lost_gwei = metrics.lost_balance_gwei,
                mev_wei = %metrics.mev_rewards_wei,
                scheduled,
                proposed,
                "pool epoch summary"
            );

            if let Some(db) = &self.db {
                db.store_validator_performance(&metrics)?;
                db.store_proposal_duties(epoch, pool, scheduled, proposed)?;
            }
        }

        Ok(state)
    }
}
