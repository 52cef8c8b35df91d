//! 集成测试共享工具：本地 JSON-RPC 节点、软件签名器与常用数据

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{extract::State, routing::post, Json, Router};
use ironchain_sdk::{
    domain::{Blockchain, Token},
    service::TransactionSigner,
    Result, SdkConfig, SdkError,
};
use k256::ecdsa::SigningKey;
use serde_json::{json, Value};

pub const USDT: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";
pub const OTHER: &str = "0x2222222222222222222222222222222222222222";

pub fn usdt() -> Token {
    Token {
        name: "Tether USD".into(),
        symbol: "USDT".into(),
        contract_address: USDT.into(),
        decimal_count: 6,
        id: None,
    }
}

/// 固定私钥的软件签名器，返回 r || s || recovery id
pub struct LocalSigner {
    key: SigningKey,
}

impl LocalSigner {
    pub fn new() -> Self {
        let key = SigningKey::from_slice(&[0x46; 32]).unwrap();
        Self { key }
    }

    /// 压缩公钥
    pub fn public_key(&self) -> Vec<u8> {
        self.key.verifying_key().to_sec1_bytes().to_vec()
    }
}

#[async_trait]
impl TransactionSigner for LocalSigner {
    async fn sign(&self, hashes: &[[u8; 32]], _public_key: &[u8]) -> Result<Vec<Vec<u8>>> {
        hashes
            .iter()
            .map(|hash| {
                let (signature, recovery_id) = self
                    .key
                    .sign_prehash_recoverable(hash)
                    .map_err(|e| SdkError::Signer(e.to_string()))?;
                let mut bytes = signature.to_bytes().to_vec();
                bytes.push(recovery_id.to_byte());
                Ok(bytes)
            })
            .collect()
    }
}

/// 本地 EVM 节点收到的请求记录
#[derive(Clone, Default)]
pub struct NodeLog {
    pub methods: Arc<Mutex<Vec<String>>>,
    pub raw_transactions: Arc<Mutex<Vec<String>>>,
}

#[derive(Clone)]
struct NodeState {
    log: NodeLog,
    oracle_fails: bool,
}

async fn node_handler(State(state): State<NodeState>, Json(req): Json<Value>) -> Json<Value> {
    let id = req["id"].clone();
    let method = req["method"].as_str().unwrap_or_default().to_string();
    state.log.methods.lock().unwrap().push(method.clone());

    let result = match method.as_str() {
        "eth_getBalance" => json!("0xde0b6b3a7640000"),
        "eth_getTransactionCount" => json!("0x7"),
        "eth_estimateGas" => json!("0x5208"),
        "eth_gasPrice" => json!("0x3b9aca00"),
        "eth_maxPriorityFeePerGas" => json!("0x3b9aca00"),
        "eth_getBlockByNumber" => json!({ "baseFeePerGas": "0x3b9aca00" }),
        "eth_sendRawTransaction" => {
            let raw = req["params"][0].as_str().unwrap_or_default().to_string();
            state.log.raw_transactions.lock().unwrap().push(raw);
            json!("0x00000000000000000000000000000000000000000000000000000000000000aa")
        }
        "eth_call" if state.oracle_fails => {
            return Json(json!({
                "jsonrpc": "2.0", "id": id,
                "error": { "code": -32000, "message": "execution reverted" }
            }))
        }
        // balanceOf 与 getL1Fee 都返回同一个 uint256
        "eth_call" => json!(format!("0x{:064x}", 2_500_000u64)),
        _ => {
            return Json(json!({
                "jsonrpc": "2.0", "id": id,
                "error": { "code": -32601, "message": "method not found" }
            }))
        }
    };
    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

/// 启动本地 EVM 节点，返回 URL 与请求记录
pub async fn spawn_evm_node(oracle_fails: bool) -> (String, NodeLog) {
    let log = NodeLog::default();
    let state = NodeState {
        log: log.clone(),
        oracle_fails,
    };
    let app = Router::new().route("/", post(node_handler)).with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), log)
}

/// 只配置一个节点 URL 的 SDK 配置
pub fn config_with_node(chain: Blockchain, url: &str) -> SdkConfig {
    let mut config = SdkConfig::default();
    config.network.retry_delay_ms = 1;
    config
        .providers
        .node_urls
        .insert(chain.id().to_string(), vec![url.to_string()]);
    config
}

pub fn blockbook_evm_tx(txid: &str, from: &str, to: &str, value: &str, transfers: Value) -> Value {
    json!({
        "txid": txid,
        "vin": [{"n": 0, "addresses": [from], "isAddress": true}],
        "vout": [{"n": 0, "value": value, "addresses": [to], "isAddress": true}],
        "blockHeight": 19_000_000,
        "confirmations": 12,
        "blockTime": 1_700_000_000,
        "value": value,
        "fees": "420000000000000",
        "tokenTransfers": transfers,
        "ethereumSpecific": {"status": 1, "nonce": 3, "gasLimit": 60000, "gasUsed": 21000, "data": "0x"}
    })
}

pub fn etherscan_tx(hash: &str, from: &str, to: &str, value: &str) -> Value {
    json!({
        "blockNumber": "19000000",
        "timeStamp": "1700000000",
        "hash": hash,
        "from": from,
        "to": to,
        "value": value,
        "gasPrice": "20000000000",
        "gasUsed": "21000",
        "isError": "0",
        "txreceipt_status": "1",
        "input": "0x",
        "contractAddress": "",
        "methodId": "0x",
        "functionName": "",
        "confirmations": "100"
    })
}
