//! BlockBook 协议客户端
//!
//! 地址信息（余额/交易/代币）、UTXO 列表与广播。Tron 版 BlockBook 在 camelCase
//! 结构里混入了 `contract_type`/`contract_name` 两个 snake_case 字段，单独映射。

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::{json_rpc::JsonRpcClient, UtxoBalance, UtxoNetworkProvider};
use crate::{
    domain::UnspentOutput,
    error::{Result, SdkError},
    infrastructure::HttpClient,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DTO
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockBookAddressResponse {
    pub page: Option<u32>,
    pub total_pages: Option<u32>,
    pub items_on_page: Option<u32>,
    pub address: String,
    #[serde(default)]
    pub balance: String,
    pub unconfirmed_balance: Option<String>,
    pub unconfirmed_txs: Option<u32>,
    pub txs: Option<u32>,
    pub nonce: Option<String>,
    pub transactions: Option<Vec<BlockBookTransaction>>,
    pub tokens: Option<Vec<BlockBookToken>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockBookTransaction {
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<BlockBookVin>,
    #[serde(default)]
    pub vout: Vec<BlockBookVout>,
    pub block_height: Option<i64>,
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default)]
    pub block_time: i64,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub fees: String,
    pub token_transfers: Option<Vec<BlockBookTokenTransfer>>,
    pub ethereum_specific: Option<EthereumSpecific>,
    #[serde(rename = "tronTXReceipt")]
    pub tron_tx_receipt: Option<TronReceipt>,
    #[serde(rename = "contract_type")]
    pub contract_type: Option<i64>,
    #[serde(rename = "contract_name")]
    pub contract_name: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub vote_list: Option<HashMap<String, i64>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockBookVin {
    pub txid: Option<String>,
    pub vout: Option<u32>,
    #[serde(default)]
    pub n: u32,
    #[serde(default)]
    pub addresses: Vec<String>,
    pub is_address: Option<bool>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockBookVout {
    pub value: Option<String>,
    #[serde(default)]
    pub n: u32,
    #[serde(default)]
    pub addresses: Vec<String>,
    pub hex: Option<String>,
    pub spent: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockBookTokenTransfer {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub from: String,
    pub to: String,
    pub contract: Option<String>,
    /// 旧版本字段，等价于 contract
    pub token: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    #[serde(default)]
    pub decimals: u32,
    pub value: Option<String>,
}

impl BlockBookTokenTransfer {
    pub fn contract_address(&self) -> Option<&str> {
        self.contract.as_deref().or(self.token.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockBookToken {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub contract: Option<String>,
    pub transfers: Option<u32>,
    pub symbol: Option<String>,
    pub decimals: Option<u32>,
    pub balance: Option<String>,
}

impl BlockBookToken {
    /// Tron BlockBook 的合约地址可能出现在 id/name/contract 任一字段
    pub fn matches_contract(&self, contract_address: &str) -> bool {
        [&self.id, &self.name, &self.contract]
            .into_iter()
            .flatten()
            .any(|v| v.eq_ignore_ascii_case(contract_address))
    }
}

/// -1 待定，0 失败，1 成功
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "i64")]
pub enum ReceiptStatus {
    Pending,
    Failure,
    Ok,
}

impl From<i64> for ReceiptStatus {
    fn from(value: i64) -> Self {
        match value {
            1 => Self::Ok,
            0 => Self::Failure,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthereumSpecific {
    pub status: Option<ReceiptStatus>,
    pub nonce: Option<u64>,
    pub gas_limit: Option<u64>,
    pub gas_used: Option<u64>,
    pub gas_price: Option<String>,
    pub data: Option<String>,
    pub parsed_data: Option<ParsedData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedData {
    pub method_id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TronReceipt {
    pub status: Option<ReceiptStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockBookUtxo {
    pub txid: String,
    pub vout: u32,
    pub value: String,
    #[serde(default)]
    pub confirmations: u64,
    pub height: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SendTxResponse {
    Ok { result: String },
    Failed { error: SendTxError },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SendTxError {
    Message { message: String },
    Text(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 客户端
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 历史分页请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPageRequest {
    pub page: u32,
    pub page_size: u32,
    /// 仅查询某个代币合约的交易
    pub contract: Option<String>,
}

#[derive(Debug)]
pub struct BlockBookProvider {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
    rpc: JsonRpcClient,
}

impl BlockBookProvider {
    pub fn new(http: HttpClient, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mut rpc = JsonRpcClient::new(http.clone(), base_url.clone());
        if let Some(key) = &api_key {
            rpc = rpc.with_header("api-key", key.clone());
        }
        Self {
            http,
            base_url,
            api_key,
            rpc,
        }
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        self.api_key
            .as_deref()
            .map(|key| vec![("api-key", key)])
            .unwrap_or_default()
    }

    /// `/api/v2/address/{address}?details=txs`
    pub async fn address_info(
        &self,
        address: &str,
        request: &AddressPageRequest,
    ) -> Result<BlockBookAddressResponse> {
        let url = format!("{}/api/v2/address/{}", self.base_url, address);
        let mut query = vec![
            ("details", "txs".to_string()),
            ("page", request.page.to_string()),
            ("pageSize", request.page_size.to_string()),
        ];
        if let Some(contract) = &request.contract {
            query.push(("contract", contract.clone()));
        }

        self.http
            .get_json_with_headers(&url, &query, &self.headers(), "blockbook address")
            .await
    }

    /// `/api/v2/utxo/{address}`
    pub async fn utxos(&self, address: &str) -> Result<Vec<BlockBookUtxo>> {
        let url = format!("{}/api/v2/utxo/{}", self.base_url, address);
        self.http
            .get_json_with_headers(&url, &[], &self.headers(), "blockbook utxo")
            .await
    }
}

/// 解析单个 UTXO，金额不合法时丢弃
fn map_utxo(address: &str, utxo: BlockBookUtxo) -> Option<UnspentOutput> {
    match utxo.value.parse::<u64>() {
        Ok(amount) => Some(UnspentOutput {
            address: address.to_string(),
            amount,
            output_index: utxo.vout,
            transaction_hash: utxo.txid,
            assets: vec![],
        }),
        Err(_) => {
            tracing::warn!(address = %address, txid = %utxo.txid, value = %utxo.value, "utxo_dropped_invalid_value");
            None
        }
    }
}

#[async_trait]
impl UtxoNetworkProvider for BlockBookProvider {
    fn host(&self) -> &str {
        &self.base_url
    }

    async fn unspent_outputs(&self, address: &str) -> Result<Vec<UnspentOutput>> {
        let utxos = self.utxos(address).await?;
        Ok(utxos
            .into_iter()
            .filter_map(|u| map_utxo(address, u))
            .collect())
    }

    async fn balance(&self, address: &str) -> Result<UtxoBalance> {
        let url = format!("{}/api/v2/address/{}", self.base_url, address);
        let response: BlockBookAddressResponse = self
            .http
            .get_json_with_headers(
                &url,
                &[("details", "basic".to_string())],
                &self.headers(),
                "blockbook balance",
            )
            .await?;

        let confirmed = response
            .balance
            .parse::<u64>()
            .map_err(|_| SdkError::decoding("blockbook balance", &response.balance))?;
        let unconfirmed = match response.unconfirmed_balance.as_deref() {
            Some(value) => value
                .parse::<i64>()
                .map_err(|_| SdkError::decoding("blockbook unconfirmed balance", value))?,
            None => 0,
        };

        Ok(UtxoBalance {
            confirmed,
            unconfirmed,
        })
    }

    async fn send(&self, raw_hex: &str) -> Result<String> {
        let url = format!("{}/api/v2/sendtx/", self.base_url);
        let response: SendTxResponse = self
            .http
            .post_text(&url, raw_hex, &self.headers(), "blockbook sendtx")
            .await?;

        match response {
            SendTxResponse::Ok { result } => Ok(result),
            SendTxResponse::Failed { error } => {
                let message = match error {
                    SendTxError::Message { message } => message,
                    SendTxError::Text(text) => text,
                };
                Err(SdkError::Rpc { code: -1, message })
            }
        }
    }

    async fn estimate_fee_rate(&self, target_blocks: u32) -> Result<Option<f64>> {
        self.rpc.estimate_smart_fee(target_blocks).await
    }
}
