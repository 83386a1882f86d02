use crate::{error::Error, schemas::ValidatorPerformanceMetrics};
use rusqlite::{params, Connection};
use std::{
    collections::HashSet,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::warn;

const CREATE_POOLS_METRICS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS t_pools_metrics_summary (
     f_timestamp BIGINT NOT NULL,
     f_epoch BIGINT,
     f_pool TEXT,
     f_epoch_timestamp BIGINT NOT NULL,

     f_n_total_votes BIGINT,
     f_n_incorrect_source BIGINT,
     f_n_incorrect_target BIGINT,
     f_n_incorrect_head BIGINT,
     f_n_validating_keys BIGINT,
     f_n_validators_with_less_balance BIGINT,
     f_epoch_earned_balance_gwei BIGINT,
     f_epoch_lost_balance_gwei BIGINT,
     f_mev_rewards_wei BIGINT,

     f_n_scheduled_blocks BIGINT,
     f_n_proposed_blocks BIGINT,

     PRIMARY KEY (f_epoch, f_pool)
);
";

const CREATE_PROPOSAL_DUTIES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS t_proposal_duties (
     f_epoch BIGINT,
     f_pool TEXT,
     f_n_scheduled_blocks BIGINT,
     f_n_proposed_blocks BIGINT,
     PRIMARY KEY (f_epoch, f_pool)
);
";

const CREATE_ETH_PRICE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS t_eth_price (
     f_timestamp BIGINT NOT NULL PRIMARY KEY,
     f_eth_price_usd FLOAT
);
";

const INSERT_VALIDATOR_PERFORMANCE: &str = "
INSERT INTO t_pools_metrics_summary(
    f_timestamp,
    f_epoch,
    f_pool,
    f_epoch_timestamp,
    f_n_total_votes,
    f_n_incorrect_source,
    f_n_incorrect_target,
    f_n_incorrect_head,
    f_n_validating_keys,
    f_n_validators_with_less_balance,
    f_epoch_earned_balance_gwei,
    f_epoch_lost_balance_gwei,
    f_mev_rewards_wei,
    f_n_scheduled_blocks,
    f_n_proposed_blocks)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
ON CONFLICT (f_epoch, f_pool)
DO UPDATE SET
    f_timestamp=EXCLUDED.f_timestamp,
    f_epoch_timestamp=EXCLUDED.f_epoch_timestamp,
    f_n_total_votes=EXCLUDED.f_n_total_votes,
    f_n_incorrect_source=EXCLUDED.f_n_incorrect_source,
    f_n_incorrect_target=EXCLUDED.f_n_incorrect_target,
    f_n_incorrect_head=EXCLUDED.f_n_incorrect_head,
    f_n_validating_keys=EXCLUDED.f_n_validating_keys,
    f_n_validators_with_less_balance=EXCLUDED.f_n_validators_with_less_balance,
    f_epoch_earned_balance_gwei=EXCLUDED.f_epoch_earned_balance_gwei,
    f_epoch_lost_balance_gwei=EXCLUDED.f_epoch_lost_balance_gwei,
    f_mev_rewards_wei=EXCLUDED.f_mev_rewards_wei,
    f_n_scheduled_blocks=EXCLUDED.f_n_scheduled_blocks,
    f_n_proposed_blocks=EXCLUDED.f_n_proposed_blocks
";

const INSERT_PROPOSAL_DUTIES: &str = "
INSERT INTO t_proposal_duties(
    f_epoch,
    f_pool,
    f_n_scheduled_blocks,
    f_n_proposed_blocks)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT (f_epoch, f_pool)
DO UPDATE SET
    f_n_scheduled_blocks=EXCLUDED.f_n_scheduled_blocks,
    f_n_proposed_blocks=EXCLUDED.f_n_proposed_blocks
";

const INSERT_ETH_PRICE: &str = "
INSERT INTO t_eth_price(
    f_timestamp,
    f_eth_price_usd)
VALUES (?1, ?2)
ON CONFLICT (f_timestamp)
DO UPDATE SET
    f_eth_price_usd=EXCLUDED.f_eth_price_usd
";

/// File-backed metrics store. Every write is an upsert on the row's primary
/// key, so reprocessing an epoch overwrites instead of duplicating.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new(path: &str) -> Result<Self, Error> {
        Ok(Self { conn: Connection::open(path)? })
    }

    pub fn create_tables(&self) -> Result<(), Error> {
        self.conn.execute_batch(CREATE_POOLS_METRICS_TABLE)?;
        self.conn.execute_batch(CREATE_PROPOSAL_DUTIES_TABLE)?;
        self.conn.execute_batch(CREATE_ETH_PRICE_TABLE)?;
        Ok(())
    }

    pub fn store_validator_performance(
        &self,
        metrics: &ValidatorPerformanceMetrics,
    ) -> Result<(), Error> {
        let mev_rewards_wei = i64::try_from(metrics.mev_rewards_wei).unwrap_or_else(|_| {
            warn!(
                epoch = metrics.epoch,
                pool = %metrics.pool_name,
                "mev rewards exceed the column range, clamping"
            );
            i64::MAX
        });
        self.conn.execute(
            INSERT_VALIDATOR_PERFORMANCE,
            params![
                unix_now(),
                metrics.epoch as i64,
                metrics.pool_name,
                metrics.epoch_timestamp,
                metrics.n_of_total_votes as i64,
                metrics.n_of_incorrect_source as i64,
                metrics.n_of_incorrect_target as i64,
                metrics.n_of_incorrect_head as i64,
                metrics.n_of_validating_keys as i64,
                metrics.n_of_vals_with_less_balance as i64,
                metrics.earned_balance_gwei as i64,
                metrics.lost_balance_gwei as i64,
                mev_rewards_wei,
                metrics.n_scheduled_blocks as i64,
                metrics.n_proposed_blocks as i64,
            ],
        )?;
        Ok(())
    }

    pub fn store_proposal_duties(
        &self,
        epoch: u64,
        pool_name: &str,
        scheduled_blocks: u64,
        proposed_blocks: u64,
    ) -> Result<(), Error> {
        self.conn.execute(
            INSERT_PROPOSAL_DUTIES,
            params![epoch as i64, pool_name, scheduled_blocks as i64, proposed_blocks as i64],
        )?;
        Ok(())
    }

    pub fn store_eth_price(&self, eth_price_usd: f64) -> Result<(), Error> {
        self.conn.execute(INSERT_ETH_PRICE, params![unix_now(), eth_price_usd])?;
        Ok(())
    }

    /// Ascending epochs in `[current − backfill + 1, current]` without a
    /// summary row. A zero window yields nothing.
    pub fn get_missing_epochs(&self, current_epoch: u64, backfill_epochs: u64) -> Result<Vec<u64>, Error> {
        let start = (current_epoch + 1).saturating_sub(backfill_epochs);
        if start > current_epoch {
            return Ok(Vec::new());
        }

        let mut statement = self.conn.prepare(
            "SELECT f_epoch FROM t_pools_metrics_summary WHERE f_epoch BETWEEN ?1 AND ?2",
        )?;
        let rows = statement.query_map(params![start as i64, current_epoch as i64], |row| {
            row.get::<_, i64>(0)
        })?;
        let mut existing = HashSet::new();
        for row in rows {
            existing.insert(row? as u64);
        }

        Ok((start..=current_epoch).filter(|epoch| !existing.contains(epoch)).collect())
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}
