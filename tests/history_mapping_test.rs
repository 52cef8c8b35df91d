//! 历史映射与分页集成测试

mod common;

use std::{
    collections::HashMap,
    str::FromStr,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use common::{blockbook_evm_tx, etherscan_tx, usdt, OTHER, USDT};
use ironchain_sdk::{
    config::NetworkConfig,
    domain::{AmountType, Blockchain, DestinationType, TransactionStatus},
    infrastructure::HttpClient,
    service::{
        history::{
            BlockBookEvmMapper, EtherscanHistorySource, EtherscanMapper, TransactionHistoryMapper,
            TransactionHistoryPager, TransactionHistoryService,
        },
        network::{
            blockbook::BlockBookAddressResponse, etherscan::EtherscanResponse, EtherscanProvider,
        },
    },
    ExplorerApiError, SdkError,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};

const WALLET: &str = "0x1111111111111111111111111111111111111111";

fn address_response(transactions: Vec<Value>) -> BlockBookAddressResponse {
    serde_json::from_value(json!({
        "page": 1,
        "totalPages": 1,
        "itemsOnPage": 20,
        "address": WALLET,
        "balance": "0",
        "transactions": transactions
    }))
    .unwrap()
}

fn zero_token_transfer() -> Value {
    json!([{
        "type": "ERC20",
        "from": OTHER,
        "to": WALLET,
        "contract": USDT,
        "decimals": 6,
        "value": "0"
    }])
}

#[test]
fn test_coin_transfer_kept_and_zero_token_spam_dropped() {
    let response = address_response(vec![
        blockbook_evm_tx("0xaa", OTHER, WALLET, "1000000", json!([])),
        blockbook_evm_tx("0xbb", OTHER, WALLET, "0", zero_token_transfer()),
    ]);
    let mut mapper = BlockBookEvmMapper::new(Blockchain::Ethereum(false));

    let records = mapper.map(&response, WALLET, &AmountType::Coin).unwrap();

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.hash, "0xaa");
    assert_eq!(record.status, TransactionStatus::Confirmed);
    assert!(!record.is_outgoing);
    match &record.destination {
        DestinationType::Single(destination) => {
            assert_eq!(destination.amount, Decimal::from_str("0.000000000001").unwrap());
        }
        other => panic!("unexpected destination: {other:?}"),
    }
}

#[test]
fn test_zero_token_legs_excluded_in_token_mode() {
    let response = address_response(vec![blockbook_evm_tx(
        "0xbb",
        OTHER,
        WALLET,
        "0",
        zero_token_transfer(),
    )]);
    let mut mapper = BlockBookEvmMapper::new(Blockchain::Ethereum(false));

    let records = mapper
        .map(&response, WALLET, &AmountType::Token(usdt()))
        .unwrap();
    assert!(records.is_empty());
}

#[test]
fn test_index_counter_resets_between_loads() {
    let response = address_response(vec![blockbook_evm_tx(
        "0xaa", OTHER, WALLET, "1000000", json!([]),
    )]);
    let mut mapper = BlockBookEvmMapper::new(Blockchain::Ethereum(false));

    let first = mapper.map(&response, WALLET, &AmountType::Coin).unwrap();
    let repeated = mapper.map(&response, WALLET, &AmountType::Coin).unwrap();
    assert_eq!(first[0].index, 0);
    assert_eq!(repeated[0].index, 1);

    mapper.reset();
    let reloaded = mapper.map(&response, WALLET, &AmountType::Coin).unwrap();
    assert_eq!(reloaded[0].index, 0);
}

#[test]
fn test_etherscan_envelope_errors() {
    let mut mapper = EtherscanMapper::new(Blockchain::Ethereum(false));

    let limited: EtherscanResponse = serde_json::from_value(json!({
        "status": "0",
        "message": "NOTOK",
        "result": "Max rate limit reached, please use API Key for higher rate limit"
    }))
    .unwrap();
    assert!(matches!(
        mapper.map(&limited, WALLET, &AmountType::Coin),
        Err(SdkError::Explorer(ExplorerApiError::RateLimited))
    ));

    let empty: EtherscanResponse = serde_json::from_value(json!({
        "status": "0",
        "message": "No transactions found",
        "result": []
    }))
    .unwrap();
    assert!(matches!(
        mapper.map(&empty, WALLET, &AmountType::Coin),
        Err(SdkError::Explorer(ExplorerApiError::EndOfHistory))
    ));

    let invalid: EtherscanResponse = serde_json::from_value(json!({
        "status": "0",
        "message": "NOTOK",
        "result": "Invalid API Key"
    }))
    .unwrap();
    assert!(matches!(
        mapper.map(&invalid, WALLET, &AmountType::Coin),
        Err(SdkError::Explorer(ExplorerApiError::Unknown(_)))
    ));
}

#[derive(Clone, Default)]
struct ExplorerCalls {
    pages: Arc<AtomicU32>,
}

async fn etherscan_api(
    State(calls): State<ExplorerCalls>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    calls.pages.fetch_add(1, Ordering::SeqCst);
    assert_eq!(query["action"], "txlist");
    match query["page"].as_str() {
        "1" => Json(json!({
            "status": "1",
            "message": "OK",
            "result": [
                etherscan_tx("0x01", OTHER, WALLET, "1000000000000000000"),
                etherscan_tx("0x02", WALLET, OTHER, "500000000000000000"),
                { "hash": "0x03", "broken": true }
            ]
        })),
        _ => Json(json!({ "status": "0", "message": "No transactions found", "result": [] })),
    }
}

async fn spawn_etherscan(calls: ExplorerCalls) -> String {
    let app = Router::new()
        .route("/api", get(etherscan_api))
        .with_state(calls);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_etherscan_pager_stops_at_end_of_history() {
    let calls = ExplorerCalls::default();
    let url = spawn_etherscan(calls.clone()).await;
    let config = NetworkConfig {
        retry_delay_ms: 1,
        ..NetworkConfig::default()
    };
    let provider = Arc::new(EtherscanProvider::new(HttpClient::new(&config), url, None));
    let source =
        EtherscanHistorySource::new(provider, EtherscanMapper::new(Blockchain::Ethereum(false)));
    let mut pager = TransactionHistoryPager::new(source, WALLET, AmountType::Coin);

    let first = pager.load_next_page().await.unwrap();
    assert_eq!(first.len(), 2);
    assert!(first[0].status == TransactionStatus::Confirmed && !first[0].is_outgoing);
    assert!(first[1].is_outgoing);
    assert!(pager.can_fetch_more());

    let second = pager.load_next_page().await.unwrap();
    assert!(second.is_empty());
    assert!(!pager.can_fetch_more());

    // 耗尽后不再请求
    assert!(pager.load_next_page().await.unwrap().is_empty());
    assert_eq!(calls.pages.load(Ordering::SeqCst), 2);

    pager.reset();
    assert!(pager.can_fetch_more());
    assert_eq!(pager.load_next_page().await.unwrap()[0].index, 0);
}
