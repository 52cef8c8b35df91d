//! Etherscan 风格浏览器客户端
//!
//! 信封中 `status` 为字符串（"1" 成功），`result` 可能是错误描述也可能是交易数组，
//! 必须按形状区分。单条交易保留为原始 JSON，由映射器逐条解析。

use serde::Deserialize;
use serde_json::Value;

use crate::{error::Result, infrastructure::HttpClient};

#[derive(Debug, Clone, Deserialize)]
pub struct EtherscanResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    pub result: EtherscanResult,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EtherscanResult {
    Transactions(Vec<Value>),
    Message(String),
}

impl EtherscanResponse {
    pub fn is_success(&self) -> bool {
        self.status == "1"
    }
}

/// 单条交易（txlist 与 tokentx 共用，代币字段仅 tokentx 存在）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtherscanTransaction {
    pub block_number: String,
    pub time_stamp: String,
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: String,
    pub value: String,
    #[serde(default)]
    pub gas_price: String,
    #[serde(default)]
    pub gas_used: String,
    pub is_error: Option<String>,
    #[serde(rename = "txreceipt_status")]
    pub receipt_status: Option<String>,
    pub input: Option<String>,
    pub contract_address: Option<String>,
    pub method_id: Option<String>,
    pub function_name: Option<String>,
    pub confirmations: Option<String>,
    pub token_decimal: Option<String>,
    pub token_symbol: Option<String>,
    pub token_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherscanAction {
    /// 普通交易
    TxList,
    /// ERC-20 代币转账
    TokenTx,
}

impl EtherscanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TxList => "txlist",
            Self::TokenTx => "tokentx",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtherscanPageRequest {
    pub address: String,
    pub action: EtherscanAction,
    pub contract_address: Option<String>,
    pub page: u32,
    pub offset: u32,
}

#[derive(Debug)]
pub struct EtherscanProvider {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
}

impl EtherscanProvider {
    pub fn new(http: HttpClient, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// `module=account&action=txlist|tokentx`，按时间倒序
    pub async fn transactions(&self, request: &EtherscanPageRequest) -> Result<EtherscanResponse> {
        let url = format!("{}/api", self.base_url);
        let mut query = vec![
            ("module", "account".to_string()),
            ("action", request.action.as_str().to_string()),
            ("address", request.address.clone()),
            ("page", request.page.to_string()),
            ("offset", request.offset.to_string()),
            ("sort", "desc".to_string()),
        ];
        if let Some(contract) = &request.contract_address {
            query.push(("contractaddress", contract.clone()));
        }
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.clone()));
        }

        self.http.get_json(&url, &query, "etherscan transactions").await
    }
}
