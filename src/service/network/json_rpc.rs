//! 通用 JSON-RPC 节点客户端
//!
//! `{jsonrpc: "2.0", id, method, params}` 信封，UTXO 节点与 EVM 节点共用。

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{Result, SdkError},
    infrastructure::HttpClient,
};

/// bitcoind 系节点的默认估费方法
pub const DEFAULT_FEE_METHOD: &str = "estimatesmartfee";

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcResponse<T> {
    pub(crate) result: Option<T>,
    #[serde(default)]
    pub(crate) error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// `estimatesmartfee` 的返回，`feerate` 单位为 coin/kB
#[derive(Debug, Clone, Deserialize)]
pub struct SmartFeeResponse {
    pub feerate: Option<f64>,
    #[serde(default)]
    pub errors: Vec<String>,
    pub blocks: Option<u32>,
}

#[derive(Debug)]
pub struct JsonRpcClient {
    http: HttpClient,
    url: String,
    fee_method: String,
    headers: Vec<(String, String)>,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            fee_method: DEFAULT_FEE_METHOD.to_string(),
            headers: Vec::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// 部分链的估费方法名不同（例如 `estimatefee`）
    pub fn with_fee_method(mut self, method: impl Into<String>) -> Self {
        self.fee_method = method.into();
        self
    }

    /// 附加请求头（例如节点服务商的 api-key）
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// 发起一次调用，节点返回的 error 对象映射为 [`SdkError::Rpc`]
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        tracing::debug!(endpoint = %self.url, method = %method, id = request.id, "rpc_call");

        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let response: JsonRpcResponse<T> = self
            .http
            .post_json_with_headers(&self.url, &request, &headers, method)
            .await?;

        if let Some(err) = response.error {
            tracing::warn!(endpoint = %self.url, method = %method, code = err.code, message = %err.message, "rpc_error");
            return Err(SdkError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        response
            .result
            .ok_or_else(|| SdkError::decoding(method, "missing result"))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // UTXO 节点
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn send_raw_transaction(&self, raw_hex: &str) -> Result<String> {
        self.call("sendrawtransaction", json!([raw_hex])).await
    }

    /// 返回 coin/kB 费率，节点无法估算时为 None
    pub async fn estimate_smart_fee(&self, target_blocks: u32) -> Result<Option<f64>> {
        let response: SmartFeeResponse = self
            .call(&self.fee_method, json!([target_blocks]))
            .await?;
        if !response.errors.is_empty() {
            tracing::debug!(errors = ?response.errors, target_blocks, "estimatesmartfee_errors");
        }
        Ok(response.feerate.filter(|rate| *rate > 0.0))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // EVM 节点
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 只读合约调用
    pub async fn eth_call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>> {
        let params = json!([{ "to": to, "data": format!("0x{}", hex::encode(data)) }, "latest"]);
        let result: String = self.call("eth_call", params).await?;
        hex::decode(result.trim_start_matches("0x"))
            .map_err(|_| SdkError::decoding("eth_call", &result))
    }

    pub async fn eth_estimate_gas(
        &self,
        from: &str,
        to: &str,
        value: u128,
        data: &[u8],
    ) -> Result<u64> {
        let mut tx = json!({ "from": from, "to": to, "value": format!("0x{value:x}") });
        if !data.is_empty() {
            tx["data"] = json!(format!("0x{}", hex::encode(data)));
        }
        let result: String = self.call("eth_estimateGas", json!([tx])).await?;
        parse_hex_u64(&result)
    }

    pub async fn eth_gas_price(&self) -> Result<u128> {
        let result: String = self.call("eth_gasPrice", json!([])).await?;
        parse_hex_u128(&result)
    }

    pub async fn eth_max_priority_fee_per_gas(&self) -> Result<u128> {
        let result: String = self.call("eth_maxPriorityFeePerGas", json!([])).await?;
        parse_hex_u128(&result)
    }

    /// 最新区块的 baseFeePerGas
    pub async fn eth_base_fee(&self) -> Result<u128> {
        let block: Value = self
            .call("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let base_fee = block["baseFeePerGas"]
            .as_str()
            .ok_or_else(|| SdkError::decoding("baseFeePerGas", &block.to_string()))?;
        parse_hex_u128(base_fee)
    }

    pub async fn eth_get_balance(&self, address: &str) -> Result<u128> {
        let result: String = self
            .call("eth_getBalance", json!([address, "latest"]))
            .await?;
        parse_hex_u128(&result)
    }

    /// pending nonce
    pub async fn eth_get_transaction_count(&self, address: &str) -> Result<u64> {
        let result: String = self
            .call("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        parse_hex_u64(&result)
    }

    pub async fn eth_send_raw_transaction(&self, raw: &[u8]) -> Result<String> {
        self.call(
            "eth_sendRawTransaction",
            json!([format!("0x{}", hex::encode(raw))]),
        )
        .await
    }

    /// ERC-20 `balanceOf(address)`
    pub async fn erc20_balance(&self, contract: &str, owner: &str) -> Result<u128> {
        let owner_bytes = decode_evm_address(owner)?;
        let mut data = Vec::with_capacity(36);
        data.extend_from_slice(&[0x70, 0xa0, 0x82, 0x31]);
        data.extend_from_slice(&[0u8; 12]);
        data.extend_from_slice(&owner_bytes);

        let result = self.eth_call(contract, &data).await?;
        word_to_u128(&result).ok_or_else(|| SdkError::decoding("balanceOf", &hex::encode(&result)))
    }
}

pub fn parse_hex_u64(value: &str) -> Result<u64> {
    let clean = value.trim_start_matches("0x");
    if clean.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(clean, 16).map_err(|_| SdkError::decoding("hex quantity", value))
}

pub fn parse_hex_u128(value: &str) -> Result<u128> {
    let clean = value.trim_start_matches("0x");
    if clean.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(clean, 16).map_err(|_| SdkError::decoding("hex quantity", value))
}

/// 32 字节 ABI word 转 u128，高位非零时返回 None
pub fn word_to_u128(word: &[u8]) -> Option<u128> {
    if word.len() != 32 || word[..16].iter().any(|b| *b != 0) {
        return None;
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&word[16..]);
    Some(u128::from_be_bytes(buf))
}

pub fn decode_evm_address(address: &str) -> Result<[u8; 20]> {
    let bytes = hex::decode(address.trim_start_matches("0x"))
        .map_err(|_| SdkError::InvalidAddress(address.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| SdkError::InvalidAddress(address.to_string()))
}

#[cfg(test)]
mod tests {
    use axum::{routing::post, Json, Router};

    use super::*;
    use crate::config::NetworkConfig;

    async fn spawn_node() -> String {
        async fn handler(Json(req): Json<Value>) -> Json<Value> {
            let id = req["id"].clone();
            let result = match req["method"].as_str().unwrap_or_default() {
                "eth_gasPrice" => json!("0x3b9aca00"),
                "eth_getBlockByNumber" => json!({ "number": "0x10", "baseFeePerGas": "0x7" }),
                "estimatesmartfee" => json!({ "feerate": 0.00012, "blocks": 6 }),
                "sendrawtransaction" => json!("abcd"),
                _ => {
                    return Json(json!({
                        "jsonrpc": "2.0", "id": id,
                        "error": { "code": -32601, "message": "method not found" }
                    }))
                }
            };
            Json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/", post(handler)))
                .await
                .unwrap();
        });
        format!("http://{addr}/")
    }

    fn client(url: String) -> JsonRpcClient {
        let config = NetworkConfig {
            retry_delay_ms: 1,
            ..NetworkConfig::default()
        };
        JsonRpcClient::new(HttpClient::new(&config), url)
    }

    #[tokio::test]
    async fn test_evm_quantities() {
        let rpc = client(spawn_node().await);
        assert_eq!(rpc.eth_gas_price().await.unwrap(), 1_000_000_000);
        assert_eq!(rpc.eth_base_fee().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_utxo_methods() {
        let rpc = client(spawn_node().await);
        assert_eq!(rpc.estimate_smart_fee(6).await.unwrap(), Some(0.00012));
        assert_eq!(rpc.send_raw_transaction("00").await.unwrap(), "abcd");
    }

    #[tokio::test]
    async fn test_rpc_error_object() {
        let rpc = client(spawn_node().await);
        let err = rpc.eth_max_priority_fee_per_gas().await.unwrap_err();
        assert!(matches!(err, SdkError::Rpc { code: -32601, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex_u64("0x5208").unwrap(), 21_000);
        assert_eq!(parse_hex_u128("0x").unwrap(), 0);
        assert!(parse_hex_u128("0xzz").is_err());
    }

    #[test]
    fn test_word_to_u128() {
        let mut word = [0u8; 32];
        word[31] = 42;
        assert_eq!(word_to_u128(&word), Some(42));
        word[0] = 1;
        assert_eq!(word_to_u128(&word), None);
    }
}
