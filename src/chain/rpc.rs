//! JSON-RPC Chain Provider
//!
//! Talks to an Ethereum node over HTTP JSON-RPC. Submission uses
//! `eth_sendTransaction` from a node-managed account (Anvil/Geth dev nodes),
//! so no key material passes through this process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::gas::GasDetails;
use super::{ChainProvider, FeeData, ProviderError, Receipt};
use crate::config::RpcConfig;
use crate::core_types::{Amount, TxHash};
use crate::engine::TransactionPayload;
use crate::money::{parse_hex_quantity, to_hex_quantity};

/// JSON-RPC request structure
#[derive(Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: &'static str,
    method: &'static str,
    params: T,
    id: u64,
}

/// JSON-RPC response structure
#[derive(Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct EthBlockHeader {
    #[serde(default)]
    base_fee_per_gas: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct EthReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    gas_used: String,
    #[serde(default)]
    status: Option<String>,
}

pub struct JsonRpcProvider {
    config: RpcConfig,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcProvider {
    pub fn new(config: RpcConfig) -> Result<Self, ProviderError> {
        info!(url = %config.url, "Initializing JSON-RPC provider");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| {
                ProviderError::RpcConnection(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            config,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn rpc_call<T, R>(&self, method: &'static str, params: T) -> Result<Option<R>, ProviderError>
    where
        T: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let response = self
            .client
            .post(&self.config.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(method, e))?;

        let rpc_response: JsonRpcResponse<R> = response.json().await.map_err(|e| {
            if e.is_decode() {
                ProviderError::InvalidResponse(format!("Failed to parse {} response: {}", method, e))
            } else {
                transport_error(method, e)
            }
        })?;

        if let Some(error) = rpc_response.error {
            return Err(ProviderError::Rejected(format!(
                "{} error {}: {}",
                method, error.code, error.message
            )));
        }

        Ok(rpc_response.result)
    }

    async fn rpc_quantity(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<Option<Amount>, ProviderError> {
        let raw: Option<String> = self.rpc_call(method, params).await?;
        raw.map(|s| parse_hex_quantity(&s))
            .transpose()
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

/// Build the `eth_sendTransaction` object
fn transaction_object(from: &str, payload: &TransactionPayload) -> Value {
    let mut tx = Map::new();
    tx.insert("from".into(), json!(from));
    tx.insert("to".into(), json!(payload.to));
    tx.insert("data".into(), json!(payload.data));
    tx.insert("value".into(), json!(to_hex_quantity(&payload.value)));
    tx.insert("chainId".into(), json!(format!("0x{:x}", payload.chain_id)));
    tx.insert(
        "type".into(),
        json!(format!("0x{:x}", payload.gas.gas_type().evm_type())),
    );
    if let Some(limit) = &payload.gas_limit {
        tx.insert("gas".into(), json!(to_hex_quantity(limit)));
    }
    match &payload.gas {
        GasDetails::Legacy { gas_price, .. } => {
            tx.insert("gasPrice".into(), json!(to_hex_quantity(gas_price)));
        }
        GasDetails::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
            ..
        } => {
            tx.insert("maxFeePerGas".into(), json!(to_hex_quantity(max_fee_per_gas)));
            tx.insert(
                "maxPriorityFeePerGas".into(),
                json!(to_hex_quantity(max_priority_fee_per_gas)),
            );
        }
    }
    Value::Object(tx)
}

/// maxFeePerGas = 2 * baseFee + priorityFee
fn derive_max_fee(base_fee: &Amount, priority_fee: &Amount) -> Amount {
    base_fee * 2u32 + priority_fee
}

fn parse_receipt(raw: EthReceipt) -> Result<Option<Receipt>, ProviderError> {
    // Pending receipts on some nodes carry a null block number
    let Some(block_number) = raw.block_number else {
        return Ok(None);
    };
    let block_number = u64::from_str_radix(block_number.trim_start_matches("0x"), 16)
        .map_err(|e| ProviderError::InvalidResponse(format!("Invalid block number: {}", e)))?;
    let gas_used = parse_hex_quantity(&raw.gas_used)
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    let success = raw.status.as_deref().map(|s| s == "0x1").unwrap_or(true);

    Ok(Some(Receipt {
        tx_hash: TxHash::new(raw.transaction_hash),
        block_number,
        gas_used,
        success,
    }))
}

#[async_trait]
impl ChainProvider for JsonRpcProvider {
    fn name(&self) -> &'static str {
        "json-rpc"
    }

    async fn fee_data(&self) -> Result<FeeData, ProviderError> {
        let gas_price = self.rpc_quantity("eth_gasPrice", json!([])).await?;

        let block: Option<EthBlockHeader> = self
            .rpc_call("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let base_fee = block
            .and_then(|b| b.base_fee_per_gas)
            .map(|s| parse_hex_quantity(&s))
            .transpose()
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        // Pre-London nodes have neither a base fee nor this method
        let (max_fee_per_gas, max_priority_fee_per_gas) = match base_fee {
            Some(base) => {
                let priority = match self
                    .rpc_quantity("eth_maxPriorityFeePerGas", json!([]))
                    .await
                {
                    Ok(p) => p,
                    Err(e) if !e.is_transient() => {
                        debug!(error = %e, "eth_maxPriorityFeePerGas unsupported");
                        None
                    }
                    Err(e) => return Err(e),
                };
                let priority = priority.unwrap_or_else(super::gas::default_priority_fee);
                (Some(derive_max_fee(&base, &priority)), Some(priority))
            }
            None => (None, None),
        };

        Ok(FeeData {
            gas_price,
            max_fee_per_gas,
            max_priority_fee_per_gas,
        })
    }

    async fn send_transaction(
        &self,
        payload: &TransactionPayload,
    ) -> Result<TxHash, ProviderError> {
        let from = self.config.from_address.as_deref().ok_or_else(|| {
            ProviderError::Rejected("No sender account configured (rpc.from_address)".to_string())
        })?;

        let tx = transaction_object(from, payload);
        let hash: Option<String> = self.rpc_call("eth_sendTransaction", json!([tx])).await?;
        let hash = hash.ok_or_else(|| {
            ProviderError::InvalidResponse("No hash in eth_sendTransaction response".to_string())
        })?;

        info!(tx_hash = %hash, "Transaction submitted");
        Ok(TxHash::new(hash))
    }

    async fn wait_for_confirmation(
        &self,
        tx_hash: &TxHash,
        timeout: Duration,
    ) -> Result<Receipt, ProviderError> {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        let poll = async {
            loop {
                let raw: Option<EthReceipt> = match self
                    .rpc_call("eth_getTransactionReceipt", json!([tx_hash.as_str()]))
                    .await
                {
                    Ok(r) => r,
                    Err(e) if e.is_transient() => {
                        warn!(tx_hash = %tx_hash, error = %e, "Receipt poll failed (will retry)");
                        None
                    }
                    Err(e) => return Err(e),
                };

                if let Some(raw) = raw
                    && let Some(receipt) = parse_receipt(raw)?
                {
                    return Ok(receipt);
                }

                tokio::time::sleep(poll_interval).await;
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                tx_hash: tx_hash.clone(),
                waited: timeout,
            }),
        }
    }
}

/// Only a failed connect proves the node never saw the request
fn transport_error(method: &'static str, e: reqwest::Error) -> ProviderError {
    if e.is_connect() {
        ProviderError::RpcConnection(format!("{} connect failed: {}", method, e))
    } else {
        ProviderError::ResponseLost(format!("{} request failed: {}", method, e))
    }
}
