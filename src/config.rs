use crate::{network::Network, relay_rewards::RELAY_SERVERS};
use std::time::Duration;

/// Runtime configuration, assembled by the binary from command-line flags.
#[derive(Debug, Clone)]
pub struct Config {
    /// Key files, one pool per file; the file stem becomes the pool label.
    pub pool_names: Vec<String>,
    /// Alternative to `pool_names`: a single `pool,0xpubkey` CSV.
    pub validators_file: Option<String>,
    /// Path of the metrics database; persistence is disabled when unset.
    pub database_path: Option<String>,
    pub eth1_address: String,
    pub eth2_address: String,
    /// Process a single epoch and exit; parsed at service startup.
    pub epoch_debug: Option<String>,
    pub network: Network,
    /// `user:password` sent as HTTP Basic to the consensus node.
    pub credentials: Option<String>,
    pub backfill_epochs: u64,
    pub state_timeout: Duration,
    /// MEV relays polled for delivered payloads. Defaults to the production
    /// seed list; tests rebind it.
    pub relay_servers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_names: Vec::new(),
            validators_file: None,
            database_path: None,
            eth1_address: String::new(),
            eth2_address: String::new(),
            epoch_debug: None,
            network: Network::default(),
            credentials: None,
            backfill_epochs: 0,
            state_timeout: Duration::from_secs(60),
            relay_servers: RELAY_SERVERS.iter().map(|relay| relay.to_string()).collect(),
        }
    }
}
