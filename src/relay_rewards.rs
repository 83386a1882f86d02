use crate::{
    error::Error,
    network::NetworkParameters,
    retry::{retry, RetryPolicy},
};
use alloy_primitives::U256;
use reqwest::StatusCode;
use serde::Deserialize;
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{mpsc, Semaphore},
    task::JoinSet,
};
use tracing::warn;

/// Production seed list of MEV relays reporting delivered payloads.
pub const RELAY_SERVERS: [&str; 9] = [
    "https://relay-analytics.ultrasound.money",
    "https://titanrelay.xyz",
    "https://bloxroute.max-profit.blxrbdn.com",
    "https://bloxroute.regulated.blxrbdn.com",
    "https://boost-relay.flashbots.net",
    "https://aestus.live",
    "https://agnostic-relay.net",
    "https://relay.ethgas.com",
    "https://relay.btcs.com",
];

const RELAY_TIMEOUT: Duration = Duration::from_secs(60);

/// One delivered-payload record of the relay data API.
#[derive(Debug, Clone, Deserialize)]
pub struct BidTrace {
    pub proposer_pubkey: String,
    /// Wei, as a decimal string.
    pub value: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EpochRelayRewards {
    pub per_pool: HashMap<String, U256>,
    /// Slots for which at least one relay reported a delivered payload.
    pub slots_with_rewards: BTreeSet<u64>,
}

/// Aggregates delivered-payload values per pool over every `(slot, relay)`
/// pair of an epoch.
///
/// Workers run in parallel across relays but serially per relay (one permit
/// each), and every result flows through a single consumer that owns the
/// output. If several relays report the same slot, each report is summed;
/// in practice only one relay delivers per slot.
#[derive(Clone)]
pub struct RelayRewards {
    http: reqwest::Client,
    params: NetworkParameters,
    key_to_pool: Arc<HashMap<String, String>>,
    relays: Arc<Vec<String>>,
    retry: RetryPolicy,
}

impl RelayRewards {
    pub fn new(
        params: NetworkParameters,
        key_to_pool: HashMap<String, String>,
        relays: Vec<String>,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(RELAY_TIMEOUT).build()?,
            params,
            key_to_pool: Arc::new(key_to_pool),
            relays: Arc::new(relays),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Rewards delivered during `epoch`, keyed by pool. Fails as a whole,
    /// with no partial result, if any `(slot, relay)` item fails.
    pub async fn get_relay_rewards(&self, epoch: u64) -> Result<EpochRelayRewards, Error> {
        let semaphores: Vec<(String, Arc<Semaphore>)> = self
            .relays
            .iter()
            .map(|relay| (relay.clone(), Arc::new(Semaphore::new(1))))
            .collect();

        let (results, mut sink) = mpsc::unbounded_channel::<(u64, String, U256)>();
        let consumer = tokio::spawn(async move {
            let mut rewards = EpochRelayRewards::default();
            while let Some((slot, pool, value)) = sink.recv().await {
                *rewards.per_pool.entry(pool).or_default() += value;
                rewards.slots_with_rewards.insert(slot);
            }
            rewards
        });

        let mut workers = JoinSet::new();
        let first_slot = self.params.first_slot(epoch);
        for slot in first_slot..first_slot + self.params.slots_in_epoch {
            for (relay, semaphore) in &semaphores {
                let this = self.clone();
                let relay = relay.clone();
                let semaphore = semaphore.clone();
                let results = results.clone();
                workers.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("relay semaphore is never closed");
                    for payload in this.fetch_bid_traces(&relay, slot).await? {
                        let Some(pool) = this.key_to_pool.get(&payload.proposer_pubkey) else {
                            continue;
                        };
                        let value = U256::from_str_radix(&payload.value, 10)
                            .map_err(|_| Error::MalformedRelayValue(payload.value.clone()))?;
                        let _ = results.send((slot, pool.clone(), value));
                    }
                    Ok::<(), Error>(())
                });
            }
        }
        drop(results);

        while let Some(joined) = workers.join_next().await {
            let result = joined.map_err(Error::from).and_then(|inner| inner);
            if let Err(err) = result {
                workers.abort_all();
                consumer.abort();
                return Err(err);
            }
        }
        consumer.await.map_err(Error::from)
    }

    async fn fetch_bid_traces(&self, relay: &str, slot: u64) -> Result<Vec<BidTrace>, Error> {
        let body = retry(&self.retry, move || self.fetch_delivered(relay, slot)).await?;
        serde_json::from_slice(&body).map_err(Error::from)
    }

    async fn fetch_delivered(&self, relay: &str, slot: u64) -> Result<Vec<u8>, Error> {
        let url =
            format!("{relay}/relay/v1/data/bidtraces/proposer_payload_delivered?slot={slot}");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            warn!(relay, slot, %status, "relay returned a failure status");
            return Err(Error::Api { endpoint: relay.to_string(), status });
        }
        Ok(response.bytes().await?.to_vec())
    }
}
