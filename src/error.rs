use crate::beacon_block::Fork;
use alloy_primitives::B256;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("`{endpoint}` returned status {status}")]
    Api { endpoint: String, status: StatusCode },
    #[error("{fork} payload has no {field}")]
    UnsupportedFork { fork: Fork, field: &'static str },
    #[error("unknown transaction type {0}")]
    UnknownTransactionType(u8),
    #[error("could not decode transaction: {0}")]
    TransactionDecode(String),
    #[error("transaction hash mismatch: decoded {tx}, receipt {receipt}")]
    TransactionHashMismatch { tx: B256, receipt: B256 },
    #[error("could not parse relay value `{0}`")]
    MalformedRelayValue(String),
    #[error("execution rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("execution rpc response has no result")]
    MissingRpcResult,
    #[error("could not decode response body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Database(#[from] rusqlite::Error),
    #[error("could not parse url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid validator key `{key}`: {reason}")]
    InvalidValidatorKey { key: String, reason: String },
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("unknown network `{0}`")]
    UnknownNetwork(String),
    #[error("{0}")]
    Config(String),
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Whether a failed operation is worth retrying: network-level failures
    /// and server-side (5xx) statuses are, anything else is not.
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}
