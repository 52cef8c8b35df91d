//! Electrum 协议客户端（TCP，按行分隔的 JSON-RPC）
//!
//! 每次请求独立建立连接；地址先转换为 script hash（锁定脚本 SHA-256 逆序）。

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
};

use super::{json_rpc::JsonRpcResponse, UtxoBalance, UtxoNetworkProvider};
use crate::{
    domain::UnspentOutput,
    error::{Result, SdkError},
    infrastructure::http::decode_json,
    service::address_service::UtxoAddressService,
};

#[derive(Debug, Clone, Deserialize)]
pub struct ElectrumUnspent {
    pub tx_hash: String,
    pub tx_pos: u32,
    pub value: u64,
    #[serde(default)]
    pub height: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElectrumBalance {
    pub confirmed: u64,
    pub unconfirmed: i64,
}

#[derive(Debug)]
pub struct ElectrumProvider {
    /// host:port
    endpoint: String,
    address_service: UtxoAddressService,
    timeout: Duration,
    next_id: AtomicU64,
}

impl ElectrumProvider {
    pub fn new(
        endpoint: impl Into<String>,
        address_service: UtxoAddressService,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            address_service,
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    /// Electrum script hash
    pub fn script_hash(&self, address: &str) -> Result<String> {
        let script = self.address_service.locking_script(address)?;
        let mut hash = Sha256::digest(&script).to_vec();
        hash.reverse();
        Ok(hex::encode(hash))
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

        let line = tokio::time::timeout(self.timeout, self.round_trip(payload.to_string()))
            .await
            .map_err(|_| SdkError::Timeout {
                endpoint: self.endpoint.clone(),
            })??;

        let response: JsonRpcResponse<T> = decode_json(method, &line)?;
        if let Some(err) = response.error {
            tracing::warn!(endpoint = %self.endpoint, method = %method, message = %err.message, "electrum_error");
            return Err(SdkError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        response
            .result
            .ok_or_else(|| SdkError::decoding(method, &line))
    }

    async fn round_trip(&self, mut request: String) -> Result<String> {
        let stream = TcpStream::connect(&self.endpoint)
            .await
            .map_err(|e| SdkError::transport(&self.endpoint, e))?;
        let (reader, mut writer) = stream.into_split();

        request.push('\n');
        writer
            .write_all(request.as_bytes())
            .await
            .map_err(|e| SdkError::transport(&self.endpoint, e))?;

        let mut line = String::new();
        let read = BufReader::new(reader)
            .read_line(&mut line)
            .await
            .map_err(|e| SdkError::transport(&self.endpoint, e))?;
        if read == 0 {
            return Err(SdkError::transport(&self.endpoint, "connection closed"));
        }
        Ok(line)
    }
}

#[async_trait]
impl UtxoNetworkProvider for ElectrumProvider {
    fn host(&self) -> &str {
        &self.endpoint
    }

    async fn unspent_outputs(&self, address: &str) -> Result<Vec<UnspentOutput>> {
        let script_hash = self.script_hash(address)?;
        let unspents: Vec<ElectrumUnspent> = self
            .request("blockchain.scripthash.listunspent", json!([script_hash]))
            .await?;

        Ok(unspents
            .into_iter()
            .map(|u| UnspentOutput {
                address: address.to_string(),
                amount: u.value,
                output_index: u.tx_pos,
                transaction_hash: u.tx_hash,
                assets: vec![],
            })
            .collect())
    }

    async fn balance(&self, address: &str) -> Result<UtxoBalance> {
        let script_hash = self.script_hash(address)?;
        let balance: ElectrumBalance = self
            .request("blockchain.scripthash.get_balance", json!([script_hash]))
            .await?;
        Ok(UtxoBalance {
            confirmed: balance.confirmed,
            unconfirmed: balance.unconfirmed,
        })
    }

    async fn send(&self, raw_hex: &str) -> Result<String> {
        self.request("blockchain.transaction.broadcast", json!([raw_hex]))
            .await
    }

    async fn estimate_fee_rate(&self, target_blocks: u32) -> Result<Option<f64>> {
        // 服务器无法估算时返回 -1
        let rate: f64 = self
            .request("blockchain.estimatefee", json!([target_blocks]))
            .await?;
        Ok((rate > 0.0).then_some(rate))
    }
}
