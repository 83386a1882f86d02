use crate::{
    beacon_block::SignedBeaconBlock,
    consensus::ConsensusClient,
    error::Error,
    execution::ExecutionClient,
    network::NetworkParameters,
    retry::{retry, RetryPolicy},
};
use alloy_consensus::TxEnvelope;
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::U256;
use std::collections::HashMap;
use tracing::{info, warn};

/// Execution-layer data extracted from one epoch's blocks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EpochBlockData {
    /// Gwei withdrawn per validator index, summed over the epoch's slots.
    pub withdrawals: HashMap<u64, u64>,
    /// Wei earned per proposer index: priority fees minus the base-fee burn.
    pub proposer_tips: HashMap<u64, i128>,
}

pub struct BlockData {
    consensus: ConsensusClient,
    execution: ExecutionClient,
    params: NetworkParameters,
    retry: RetryPolicy,
}

impl BlockData {
    pub fn new(
        consensus: ConsensusClient,
        execution: ExecutionClient,
        params: NetworkParameters,
    ) -> Self {
        Self { consensus, execution, params, retry: RetryPolicy::default() }
    }

    /// Withdrawals credited during `epoch`, keyed by validator index. Absent
    /// blocks are a routine outcome of skipped or orphaned slots.
    pub async fn epoch_withdrawals(&self, epoch: u64) -> Result<HashMap<u64, u64>, Error> {
        let mut withdrawals = HashMap::new();
        let first_slot = self.params.first_slot(epoch);
        for slot in first_slot..first_slot + self.params.slots_in_epoch {
            let Some(block) = self.consensus.signed_beacon_block(slot).await? else {
                warn!(slot, "block not found, skipping slot");
                continue;
            };
            accumulate_withdrawals(&block, &mut withdrawals);
        }
        Ok(withdrawals)
    }

    /// Withdrawals and proposer tips for `epoch`. The tip computation walks
    /// every transaction receipt and is considerably more expensive than
    /// [`Self::epoch_withdrawals`].
    pub async fn epoch_block_data(&self, epoch: u64) -> Result<EpochBlockData, Error> {
        info!(epoch, "fetching block data");
        let mut data = EpochBlockData::default();
        let first_slot = self.params.first_slot(epoch);
        for slot in first_slot..first_slot + self.params.slots_in_epoch {
            let Some(block) = self.consensus.signed_beacon_block(slot).await? else {
                warn!(slot, "block not found, skipping slot");
                continue;
            };
            accumulate_withdrawals(&block, &mut data.withdrawals);
            let tip = self.proposer_tip(&block).await?;
            *data.proposer_tips.entry(block.proposer_index()).or_default() += tip;
        }
        Ok(data)
    }

    /// The proposer's net reward for one block: the sum of per-transaction
    /// tip fees minus the burnt base fee. May be negative.
    pub async fn proposer_tip(&self, block: &SignedBeaconBlock) -> Result<i128, Error> {
        let block_number = block.block_number()?;
        let header =
            retry(&self.retry, move || self.execution.header_by_number(block_number)).await?;
        let base_fee = U256::from_be_bytes(block.base_fee_per_gas()?);

        let mut tips = U256::ZERO;
        for raw in block.transactions()? {
            let mut buf: &[u8] = raw.as_ref();
            let tx = TxEnvelope::decode_2718(&mut buf)
                .map_err(|err| Error::TransactionDecode(err.to_string()))?;
            let hash = *tx.tx_hash();
            let receipt =
                retry(&self.retry, move || self.execution.transaction_receipt(hash)).await?;
            if hash != receipt.transaction_hash {
                return Err(Error::TransactionHashMismatch {
                    tx: hash,
                    receipt: receipt.transaction_hash,
                });
            }

            let gas_used = U256::from(receipt.gas_used);
            let tip_fee = match &tx {
                TxEnvelope::Legacy(signed) => U256::from(signed.tx().gas_price) * gas_used,
                TxEnvelope::Eip2930(signed) => U256::from(signed.tx().gas_price) * gas_used,
                TxEnvelope::Eip1559(signed) => {
                    let tx = signed.tx();
                    effective_gas_price(
                        tx.max_fee_per_gas,
                        tx.max_priority_fee_per_gas,
                        header.base_fee_per_gas,
                    ) * gas_used
                }
                TxEnvelope::Eip4844(signed) => {
                    let tx = signed.tx().tx();
                    effective_gas_price(
                        tx.max_fee_per_gas,
                        tx.max_priority_fee_per_gas,
                        header.base_fee_per_gas,
                    ) * gas_used
                }
                TxEnvelope::Eip7702(signed) => {
                    let tx = signed.tx();
                    effective_gas_price(
                        tx.max_fee_per_gas,
                        tx.max_priority_fee_per_gas,
                        header.base_fee_per_gas,
                    ) * gas_used
                }
                _ => {
                    return Err(Error::UnknownTransactionType(
                        raw.first().copied().unwrap_or_default(),
                    ))
                }
            };
            tips += tip_fee;
        }

        let burnt = U256::from(block.gas_used()?) * base_fee;
        Ok(signed_difference(tips, burnt))
    }
}

/// Adds a block's withdrawals into `withdrawals`. Pre-Capella payloads carry
/// none, which is absence of data rather than an error here.
pub(crate) fn accumulate_withdrawals(
    block: &SignedBeaconBlock,
    withdrawals: &mut HashMap<u64, u64>,
) {
    let Ok(list) = block.withdrawals() else {
        return;
    };
    for withdrawal in list {
        *withdrawals.entry(withdrawal.validator_index).or_default() += withdrawal.amount;
    }
}

/// What the sender effectively pays per gas: the fee cap when it exceeds
/// tip-cap-plus-base-fee, otherwise tip-cap-plus-base-fee.
fn effective_gas_price(fee_cap: u128, tip_cap: u128, base_fee: U256) -> U256 {
    let tip = U256::from(tip_cap) + base_fee;
    let cap = U256::from(fee_cap);
    if cap > tip {
        cap
    } else {
        tip
    }
}

fn signed_difference(left: U256, right: U256) -> i128 {
    if left >= right {
        i128::try_from(left - right).unwrap_or(i128::MAX)
    } else {
        -i128::try_from(right - left).unwrap_or(i128::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{consensus::ConsensusClient, execution::ExecutionClient};
    use alloy_consensus::{SignableTransaction, TxEip1559, TxLegacy};
    use alloy_eips::eip2718::Encodable2718;
    use alloy_primitives::{Address, Signature, TxKind, B256, U256};
    use axum::{extract::State, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::{collections::HashMap, sync::Arc, time::Duration};
    use url::Url;

    struct FakeExecution {
        header: Value,
        receipts: HashMap<String, Value>,
    }

    async fn handle_rpc(State(state): State<Arc<FakeExecution>>, Json(body): Json<Value>) -> Json<Value> {
        let result = match body["method"].as_str() {
            Some("eth_getBlockByNumber") => state.header.clone(),
            Some("eth_getTransactionReceipt") => {
                let hash = body["params"][0].as_str().unwrap_or_default();
                state.receipts.get(hash).cloned().unwrap_or(Value::Null)
            }
            _ => Value::Null,
        };
        Json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
    }

    async fn serve(state: FakeExecution) -> Url {
        let app = Router::new().route("/", post(handle_rpc)).with_state(Arc::new(state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    fn signature() -> Signature {
        Signature::new(U256::from(1), U256::from(1), false)
    }

    fn legacy_tx(gas_price: u128) -> TxEnvelope {
        let tx = TxLegacy {
            chain_id: Some(1),
            nonce: 0,
            gas_price,
            gas_limit: 21_000,
            to: TxKind::Call(Address::ZERO),
            value: U256::ZERO,
            input: Default::default(),
        };
        tx.into_signed(signature()).into()
    }

    fn eip1559_tx(nonce: u64, fee_cap: u128, tip_cap: u128) -> TxEnvelope {
        let tx = TxEip1559 {
            chain_id: 1,
            nonce,
            gas_limit: 21_000,
            max_fee_per_gas: fee_cap,
            max_priority_fee_per_gas: tip_cap,
            to: TxKind::Call(Address::ZERO),
            ..Default::default()
        };
        tx.into_signed(signature()).into()
    }

    fn block_with_transactions(transactions: &[&TxEnvelope]) -> SignedBeaconBlock {
        let raw: Vec<String> = transactions
            .iter()
            .map(|tx| alloy_primitives::hex::encode_prefixed(tx.encoded_2718()))
            .collect();
        serde_json::from_value(json!({
            "version": "capella",
            "data": {
                "message": {
                    "slot": "100",
                    "proposer_index": "7",
                    "body": {
                        "execution_payload": {
                            "block_number": "100",
                            "gas_used": "400",
                            "base_fee_per_gas": "10",
                            "transactions": raw,
                            "withdrawals": [],
                        }
                    }
                },
                "signature": "0x",
            }
        }))
        .unwrap()
    }

    fn receipt_json(hash: B256, gas_used: u64) -> Value {
        json!({ "transactionHash": hash, "gasUsed": format!("0x{gas_used:x}") })
    }

    fn block_data(execution_url: Url) -> BlockData {
        let params = NetworkParameters {
            genesis_seconds: 0,
            slots_in_epoch: 32,
            seconds_per_slot: 12,
        };
        let consensus = ConsensusClient::new(
            Url::parse("http://127.0.0.1:1/").unwrap(),
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        let execution = ExecutionClient::new(execution_url).unwrap();
        BlockData::new(consensus, execution, params)
    }

    #[tokio::test]
    async fn computes_the_proposer_tip() {
        // Legacy at 50 wei/gas for 100 gas, one EIP-1559 whose fee cap 40
        // exceeds tip-plus-base 15 (40 * 200), one whose cap 12 does not
        // (15 * 100).
        let txs = [legacy_tx(50), eip1559_tx(1, 40, 5), eip1559_tx(2, 12, 5)];
        let gas = [100u64, 200, 100];

        let receipts = txs
            .iter()
            .zip(gas)
            .map(|(tx, gas_used)| {
                (tx.tx_hash().to_string(), receipt_json(*tx.tx_hash(), gas_used))
            })
            .collect();
        let header = json!({ "number": "0x64", "gasUsed": "0x190", "baseFeePerGas": "0xa" });
        let url = serve(FakeExecution { header, receipts }).await;

        let block = block_with_transactions(&[&txs[0], &txs[1], &txs[2]]);
        let tip = block_data(url).proposer_tip(&block).await.unwrap();

        // 5000 + 8000 + 1500 − 400 * 10 burnt.
        assert_eq!(tip, 10500);
    }

    #[tokio::test]
    async fn rejects_receipts_for_a_different_transaction() {
        let tx = legacy_tx(50);
        let receipts = HashMap::from([(
            tx.tx_hash().to_string(),
            receipt_json(B256::ZERO, 100),
        )]);
        let header = json!({ "number": "0x64", "gasUsed": "0x190", "baseFeePerGas": "0xa" });
        let url = serve(FakeExecution { header, receipts }).await;

        let block = block_with_transactions(&[&tx]);
        let result = block_data(url).proposer_tip(&block).await;
        assert!(matches!(result, Err(Error::TransactionHashMismatch { .. })));
    }

    #[tokio::test]
    async fn a_heavy_burn_turns_the_tip_negative() {
        let tx = legacy_tx(1);
        let receipts = HashMap::from([(
            tx.tx_hash().to_string(),
            receipt_json(*tx.tx_hash(), 100),
        )]);
        let header = json!({ "number": "0x64", "gasUsed": "0x190", "baseFeePerGas": "0xa" });
        let url = serve(FakeExecution { header, receipts }).await;

        let block = block_with_transactions(&[&tx]);
        let tip = block_data(url).proposer_tip(&block).await.unwrap();
        // 100 wei of fees against a 4000 wei burn.
        assert_eq!(tip, -3900);
    }

    #[test]
    fn withdrawals_accumulate_per_validator() {
        let block: SignedBeaconBlock = serde_json::from_value(json!({
            "version": "capella",
            "data": {
                "message": {
                    "slot": "100",
                    "proposer_index": "7",
                    "body": {
                        "execution_payload": {
                            "block_number": "100",
                            "gas_used": "0",
                            "base_fee_per_gas": "10",
                            "transactions": [],
                            "withdrawals": [
                                { "validator_index": "416734", "amount": "45764133" },
                                { "validator_index": "416729", "amount": "1701196" },
                                { "validator_index": "416734", "amount": "7" },
                            ],
                        }
                    }
                },
                "signature": "0x",
            }
        }))
        .unwrap();

        let mut withdrawals = HashMap::new();
        accumulate_withdrawals(&block, &mut withdrawals);
        assert_eq!(withdrawals, HashMap::from([(416734, 45764140), (416729, 1701196)]));
    }

    #[test]
    fn pre_capella_blocks_contribute_no_withdrawals() {
        let block: SignedBeaconBlock = serde_json::from_value(json!({
            "version": "bellatrix",
            "data": {
                "message": {
                    "slot": "100",
                    "proposer_index": "7",
                    "body": {
                        "execution_payload": {
                            "block_number": "100",
                            "gas_used": "0",
                            "base_fee_per_gas": "10",
                            "transactions": [],
                        }
                    }
                },
                "signature": "0x",
            }
        }))
        .unwrap();

        let mut withdrawals = HashMap::new();
        accumulate_withdrawals(&block, &mut withdrawals);
        assert!(withdrawals.is_empty());
    }

    #[test]
    fn effective_gas_price_takes_the_larger_side() {
        assert_eq!(effective_gas_price(40, 5, U256::from(10)), U256::from(40));
        assert_eq!(effective_gas_price(12, 5, U256::from(10)), U256::from(15));
        assert_eq!(effective_gas_price(15, 5, U256::from(10)), U256::from(15));
    }
}
