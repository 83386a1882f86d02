use crate::error::Error;
use alloy_primitives::{Bytes, U256};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fork {
    Phase0,
    Altair,
    Bellatrix,
    Capella,
    Deneb,
    Electra,
    Fulu,
}

impl fmt::Display for Fork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phase0 => write!(f, "phase0"),
            Self::Altair => write!(f, "altair"),
            Self::Bellatrix => write!(f, "bellatrix"),
            Self::Capella => write!(f, "capella"),
            Self::Deneb => write!(f, "deneb"),
            Self::Electra => write!(f, "electra"),
            Self::Fulu => write!(f, "fulu"),
        }
    }
}

/// A signed beacon block as served by `/eth/v2/beacon/blocks/{slot}`,
/// decoded from the fork-versioned envelope.
///
/// Field presence varies per fork; every access goes through the accessors
/// below so that callers never match on the variant themselves. New forks are
/// added by extending this union.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "version", content = "data", rename_all = "lowercase")]
pub enum SignedBeaconBlock {
    Altair(SignedBlock<AltairBody>),
    Bellatrix(SignedBlock<BellatrixBody>),
    Capella(SignedBlock<CapellaBody>),
    Deneb(SignedBlock<CapellaBody>),
    Electra(SignedBlock<CapellaBody>),
    Fulu(SignedBlock<CapellaBody>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignedBlock<B> {
    pub message: BlockMessage<B>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockMessage<B> {
    #[serde(with = "crate::serde::as_str")]
    pub slot: u64,
    #[serde(with = "crate::serde::as_str")]
    pub proposer_index: u64,
    pub body: B,
}

/// Pre-merge body: no execution payload at all.
#[derive(Debug, Clone, Deserialize)]
pub struct AltairBody {}

#[derive(Debug, Clone, Deserialize)]
pub struct BellatrixBody {
    pub execution_payload: BellatrixPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapellaBody {
    pub execution_payload: CapellaPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BellatrixPayload {
    #[serde(with = "crate::serde::as_str")]
    pub block_number: u64,
    #[serde(with = "crate::serde::as_str")]
    pub gas_used: u64,
    #[serde(with = "crate::serde::as_str")]
    pub base_fee_per_gas: U256,
    pub transactions: Vec<Bytes>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapellaPayload {
    #[serde(with = "crate::serde::as_str")]
    pub block_number: u64,
    #[serde(with = "crate::serde::as_str")]
    pub gas_used: u64,
    #[serde(with = "crate::serde::as_str")]
    pub base_fee_per_gas: U256,
    pub transactions: Vec<Bytes>,
    pub withdrawals: Vec<Withdrawal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Withdrawal {
    #[serde(with = "crate::serde::as_str")]
    pub validator_index: u64,
    /// Gwei credited to the withdrawal address.
    #[serde(with = "crate::serde::as_str")]
    pub amount: u64,
}

enum PayloadRef<'a> {
    Bellatrix(&'a BellatrixPayload),
    Capella(&'a CapellaPayload),
}

impl SignedBeaconBlock {
    pub fn fork(&self) -> Fork {
        match self {
            Self::Altair(_) => Fork::Altair,
            Self::Bellatrix(_) => Fork::Bellatrix,
            Self::Capella(_) => Fork::Capella,
            Self::Deneb(_) => Fork::Deneb,
            Self::Electra(_) => Fork::Electra,
            Self::Fulu(_) => Fork::Fulu,
        }
    }

    pub fn slot(&self) -> u64 {
        match self {
            Self::Altair(block) => block.message.slot,
            Self::Bellatrix(block) => block.message.slot,
            Self::Capella(block) => block.message.slot,
            Self::Deneb(block) => block.message.slot,
            Self::Electra(block) => block.message.slot,
            Self::Fulu(block) => block.message.slot,
        }
    }

    pub fn proposer_index(&self) -> u64 {
        match self {
            Self::Altair(block) => block.message.proposer_index,
            Self::Bellatrix(block) => block.message.proposer_index,
            Self::Capella(block) => block.message.proposer_index,
            Self::Deneb(block) => block.message.proposer_index,
            Self::Electra(block) => block.message.proposer_index,
            Self::Fulu(block) => block.message.proposer_index,
        }
    }

    pub fn block_number(&self) -> Result<u64, Error> {
        match self.execution_payload() {
            Some(PayloadRef::Bellatrix(payload)) => Ok(payload.block_number),
            Some(PayloadRef::Capella(payload)) => Ok(payload.block_number),
            None => Err(self.unsupported("block number")),
        }
    }

    pub fn gas_used(&self) -> Result<u64, Error> {
        match self.execution_payload() {
            Some(PayloadRef::Bellatrix(payload)) => Ok(payload.gas_used),
            Some(PayloadRef::Capella(payload)) => Ok(payload.gas_used),
            None => Err(self.unsupported("gas used")),
        }
    }

    /// Base fee per gas as big-endian 32 bytes, whatever the variant's native
    /// ordering.
    pub fn base_fee_per_gas(&self) -> Result<[u8; 32], Error> {
        match self.execution_payload() {
            Some(PayloadRef::Bellatrix(payload)) => Ok(payload.base_fee_per_gas.to_be_bytes::<32>()),
            Some(PayloadRef::Capella(payload)) => Ok(payload.base_fee_per_gas.to_be_bytes::<32>()),
            None => Err(self.unsupported("base fee per gas")),
        }
    }

    /// Raw (EIP-2718 encoded) transactions of the execution payload.
    pub fn transactions(&self) -> Result<&[Bytes], Error> {
        match self.execution_payload() {
            Some(PayloadRef::Bellatrix(payload)) => Ok(&payload.transactions),
            Some(PayloadRef::Capella(payload)) => Ok(&payload.transactions),
            None => Err(self.unsupported("transactions")),
        }
    }

    /// Withdrawals of the execution payload; pre-Capella forks carry none.
    pub fn withdrawals(&self) -> Result<&[Withdrawal], Error> {
        match self.execution_payload() {
            Some(PayloadRef::Capella(payload)) => Ok(&payload.withdrawals),
            _ => Err(self.unsupported("withdrawals")),
        }
    }

    fn execution_payload(&self) -> Option<PayloadRef<'_>> {
        match self {
            Self::Altair(_) => None,
            Self::Bellatrix(block) => {
                Some(PayloadRef::Bellatrix(&block.message.body.execution_payload))
            }
            Self::Capella(block) | Self::Deneb(block) | Self::Electra(block) | Self::Fulu(block) => {
                Some(PayloadRef::Capella(&block.message.body.execution_payload))
            }
        }
    }

    fn unsupported(&self, field: &'static str) -> Error {
        Error::UnsupportedFork { fork: self.fork(), field }
    }
}
