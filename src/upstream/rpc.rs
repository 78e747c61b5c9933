// bitcoind JSON-RPC client

use super::Upstream;
use crate::core::{Block, Hash256, Transaction};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// bitcoind error code for unknown transactions and blocks
const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;

#[derive(Debug, Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
    #[serde(default)]
    id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl Response {
    fn into_result<T: DeserializeOwned>(self, method: &str) -> Result<T> {
        if let Some(err) = self.error {
            return Err(Error::Upstream(format!(
                "{} failed: {} (code {})",
                method, err.message, err.code
            )));
        }
        Ok(serde_json::from_value(self.result.unwrap_or(Value::Null))?)
    }
}

#[derive(Debug, Deserialize)]
struct BlockchainInfo {
    chain: String,
}

#[derive(Debug, Deserialize)]
struct VerboseTransaction {
    #[serde(default)]
    blockhash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HeaderInfo {
    height: u32,
}

#[derive(Debug, Deserialize)]
struct FeeEstimate {
    #[serde(default)]
    feerate: Option<f64>,
}

/// Client for a bitcoind-compatible node over HTTP JSON-RPC.
pub struct BitcoindClient {
    client: Client,
    url: String,
    user: Option<String>,
    password: Option<String>,
    next_id: AtomicU64,
}

impl BitcoindClient {
    /// Create a new instance of [`BitcoindClient`].
    pub fn new(
        url: &str,
        user: Option<String>,
        password: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            user,
            password,
            next_id: AtomicU64::new(0),
        })
    }

    fn request<'a>(&self, method: &'a str, params: Value) -> Request<'a> {
        Request {
            jsonrpc: "1.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        }
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, body: &B) -> Result<R> {
        let mut builder = self.client.post(&self.url).json(body);
        if let Some(user) = &self.user {
            builder = builder.basic_auth(user, self.password.as_ref());
        }

        let response = builder.send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(Error::Upstream("rpc credentials rejected".to_string()))
            }
            // bitcoind reports call errors as 404/500 with a JSON body
            _ => Ok(response.json().await?),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let request = self.request(method, params);
        log::trace!("rpc {} {}", method, request.params);
        let response: Response = self.post(&request).await?;
        response.into_result(method)
    }

    /// One HTTP round trip for many calls; results come back by request id
    async fn batch(&self, method: &str, params: Vec<Value>) -> Result<Vec<Response>> {
        if params.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<Request> = params
            .into_iter()
            .map(|params| self.request(method, params))
            .collect();
        let responses: Vec<Response> = self.post(&requests).await?;
        Ok(order_responses(&requests, responses))
    }
}

/// Arrange batch responses in request order, dropping unmatched ones
fn order_responses(requests: &[Request], responses: Vec<Response>) -> Vec<Response> {
    let mut by_id: HashMap<u64, Response> = responses
        .into_iter()
        .filter_map(|response| response.id.map(|id| (id, response)))
        .collect();
    requests
        .iter()
        .filter_map(|request| by_id.remove(&request.id))
        .collect()
}

#[async_trait]
impl Upstream for BitcoindClient {
    async fn chain_name(&self) -> Result<String> {
        let info: BlockchainInfo = self.call("getblockchaininfo", json!([])).await?;
        Ok(info.chain)
    }

    async fn tip_height(&self) -> Result<u32> {
        self.call("getblockcount", json!([])).await
    }

    async fn block_hash(&self, height: u32) -> Result<Hash256> {
        let hash: String = self.call("getblockhash", json!([height])).await?;
        Hash256::from_hex(&hash)
    }

    async fn block(&self, hash: &Hash256) -> Result<Block> {
        let raw: String = self.call("getblock", json!([hash.to_hex(), 0])).await?;
        Block::from_hex(&raw)
    }

    async fn transaction_height(&self, txid: &Hash256) -> Result<Option<u32>> {
        let tx: VerboseTransaction = self
            .call("getrawtransaction", json!([txid.to_hex(), true]))
            .await?;
        let Some(block_hash) = tx.blockhash else {
            return Ok(None);
        };
        let header: HeaderInfo = self.call("getblockheader", json!([block_hash, true])).await?;
        Ok(Some(header.height))
    }

    async fn raw_mempool(&self) -> Result<Vec<Hash256>> {
        let txids: Vec<String> = self.call("getrawmempool", json!([])).await?;
        txids.iter().map(|txid| Hash256::from_hex(txid)).collect()
    }

    async fn raw_transaction(&self, txid: &Hash256) -> Result<String> {
        self.call("getrawtransaction", json!([txid.to_hex()])).await
    }

    async fn raw_transactions(&self, txids: &[Hash256]) -> Result<Vec<Transaction>> {
        let params = txids.iter().map(|txid| json!([txid.to_hex()])).collect();
        let mut transactions = Vec::with_capacity(txids.len());
        for response in self.batch("getrawtransaction", params).await? {
            if matches!(&response.error, Some(err) if err.code == RPC_INVALID_ADDRESS_OR_KEY) {
                continue;
            }
            let raw: String = response.into_result("getrawtransaction")?;
            transactions.push(Transaction::from_hex(&raw)?);
        }
        Ok(transactions)
    }

    async fn send_raw_transaction(&self, tx_hex: &str) -> Result<Hash256> {
        let txid: String = self.call("sendrawtransaction", json!([tx_hex])).await?;
        Hash256::from_hex(&txid)
    }

    async fn estimate_fee(&self, blocks: u32) -> Result<Option<f64>> {
        let estimate: FeeEstimate = self.call("estimatesmartfee", json!([blocks])).await?;
        Ok(estimate.feerate)
    }
}
