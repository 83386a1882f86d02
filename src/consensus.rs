use crate::{
    beacon_block::SignedBeaconBlock, beacon_state::BeaconState, error::Error, pools::BlsPublicKey,
};
use reqwest::{RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use url::Url;

const CONSENSUS_TIMEOUT: Duration = Duration::from_secs(60);
const SYNCING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
pub struct GenesisDetails {
    #[serde(with = "crate::serde::as_str")]
    pub genesis_time: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpecParameters {
    #[serde(rename = "SLOTS_PER_EPOCH", with = "crate::serde::as_str")]
    pub slots_per_epoch: u64,
    #[serde(rename = "SECONDS_PER_SLOT", with = "crate::serde::as_str")]
    pub seconds_per_slot: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncStatus {
    #[serde(with = "crate::serde::as_str")]
    pub head_slot: u64,
    pub is_syncing: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposerDuty {
    pub pubkey: BlsPublicKey,
    #[serde(with = "crate::serde::as_str")]
    pub validator_index: u64,
    #[serde(with = "crate::serde::as_str")]
    pub slot: u64,
}

#[derive(Debug, Deserialize)]
struct Value<T> {
    data: T,
}

#[derive(Clone)]
struct Credentials {
    user: String,
    password: String,
}

/// Typed client for the beacon node HTTP API.
///
/// The state endpoint requires the node to expose the debug namespace, and
/// historical states require an archival node.
#[derive(Clone)]
pub struct ConsensusClient {
    http: reqwest::Client,
    endpoint: Url,
    credentials: Option<Credentials>,
    state_timeout: Duration,
}

impl ConsensusClient {
    pub fn new(
        endpoint: Url,
        credentials: Option<&str>,
        state_timeout: Duration,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder().timeout(CONSENSUS_TIMEOUT).build()?;
        let credentials = credentials.map(|raw| {
            let (user, password) = raw.split_once(':').unwrap_or((raw, ""));
            Credentials { user: user.to_string(), password: password.to_string() }
        });
        Ok(Self { http, endpoint, credentials, state_timeout })
    }

    pub async fn genesis(&self) -> Result<GenesisDetails, Error> {
        let path = "/eth/v1/beacon/genesis";
        let value: Value<GenesisDetails> = self.fetch(self.get(path)?, path).await?;
        Ok(value.data)
    }

    pub async fn spec(&self) -> Result<SpecParameters, Error> {
        let path = "/eth/v1/config/spec";
        let value: Value<SpecParameters> = self.fetch(self.get(path)?, path).await?;
        Ok(value.data)
    }

    pub async fn node_syncing(&self) -> Result<SyncStatus, Error> {
        let path = "/eth/v1/node/syncing";
        let request = self.get(path)?.timeout(SYNCING_TIMEOUT);
        let value: Value<SyncStatus> = self.fetch(request, path).await?;
        Ok(value.data)
    }

    pub async fn proposer_duties(&self, epoch: u64) -> Result<Vec<ProposerDuty>, Error> {
        let path = format!("/eth/v1/validator/duties/proposer/{epoch}");
        let value: Value<Vec<ProposerDuty>> = self.fetch(self.get(&path)?, &path).await?;
        Ok(value.data)
    }

    /// The signed block at `slot`, or `None` when the slot was skipped or the
    /// block orphaned.
    pub async fn signed_beacon_block(&self, slot: u64) -> Result<Option<SignedBeaconBlock>, Error> {
        let path = format!("/eth/v2/beacon/blocks/{slot}");
        let response = self.get(&path)?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Api { endpoint: path, status: response.status() });
        }
        Ok(Some(response.json().await?))
    }

    pub async fn beacon_state(&self, slot: u64) -> Result<BeaconState, Error> {
        let path = format!("/eth/v2/debug/beacon/states/{slot}");
        let request = self.get(&path)?.timeout(self.state_timeout);
        self.fetch(request, &path).await
    }

    fn get(&self, path: &str) -> Result<RequestBuilder, Error> {
        let url = self.endpoint.join(path)?;
        let mut request = self.http.get(url);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.user, Some(&credentials.password));
        }
        Ok(request)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        endpoint: &str,
    ) -> Result<T, Error> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::Api { endpoint: endpoint.to_string(), status: response.status() });
        }
        Ok(response.json().await?)
    }
}
