mod beacon_block;
mod beacon_state;
mod block_data;
mod config;
mod consensus;
mod db;
mod duties;
mod error;
mod execution;
mod network;
mod network_stats;
mod pools;
mod relay_rewards;
mod retry;
mod schemas;
pub(crate) mod serde;
mod service;

pub use beacon_block::{Fork, SignedBeaconBlock, Withdrawal};
pub use beacon_state::{indexes_from_keys, pool_performance, BeaconState, BeaconStateData, Validator};
pub use block_data::{BlockData, EpochBlockData};
pub use config::Config;
pub use consensus::{ConsensusClient, GenesisDetails, ProposerDuty, SpecParameters, SyncStatus};
pub use db::Database;
pub use duties::{ProposalDuties, ProposalMetrics};
pub use error::Error;
pub use execution::{ExecutionClient, ExecutionHeader, TransactionReceipt};
pub use network::{Network, NetworkParameters};
pub use network_stats::network_stats;
pub use pools::{BlsPublicKey, Pools};
pub use relay_rewards::{BidTrace, EpochRelayRewards, RelayRewards, RELAY_SERVERS};
pub use retry::RetryPolicy;
pub use schemas::{NetworkStats, ValidatorPerformanceMetrics};
pub use service::Service;
