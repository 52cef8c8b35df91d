//! 历史映射性能基准
//!
//! 场景:
//! 1. 大页 BlockBook 响应（币模式）
//! 2. 同一响应的代币模式（逐条过滤转账腿）
//! 3. Etherscan txlist 逐条解析

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ironchain_sdk::{
    domain::{AmountType, Blockchain, Token},
    service::{
        history::{BlockBookEvmMapper, EtherscanMapper, TransactionHistoryMapper},
        network::{blockbook::BlockBookAddressResponse, etherscan::EtherscanResponse},
    },
};
use serde_json::{json, Value};

const WALLET: &str = "0x1111111111111111111111111111111111111111";
const PEER: &str = "0x2222222222222222222222222222222222222222";
const USDT: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";
const PAGE_SIZES: &[usize] = &[20, 200, 1000];

fn usdt() -> Token {
    Token {
        name: "Tether USD".into(),
        symbol: "USDT".into(),
        contract_address: USDT.into(),
        decimal_count: 6,
        id: None,
    }
}

fn blockbook_tx(i: usize) -> Value {
    let (from, to) = if i % 2 == 0 { (WALLET, PEER) } else { (PEER, WALLET) };
    let token_value = if i % 9 == 0 { 0 } else { i * 1000 };
    let transfers = if i % 3 == 0 {
        json!([{ "type": "ERC20", "from": from, "to": to, "contract": USDT, "decimals": 6,
                 "value": token_value.to_string() }])
    } else {
        json!([])
    };
    let data = if i % 3 == 0 { "0xa9059cbb" } else { "0x" };
    json!({
        "txid": format!("0x{i:064x}"),
        "vin": [{ "n": 0, "addresses": [from], "isAddress": true }],
        "vout": [{ "n": 0, "value": (i * 1_000_000).to_string(), "addresses": [to], "isAddress": true }],
        "blockHeight": 19_000_000 + i,
        "confirmations": 12,
        "blockTime": 1_700_000_000 + i as i64,
        "value": (i * 1_000_000).to_string(),
        "fees": "420000000000000",
        "tokenTransfers": transfers,
        "ethereumSpecific": { "status": 1, "nonce": i, "gasLimit": 60000, "gasUsed": 21000,
                              "data": data }
    })
}

fn blockbook_page(size: usize) -> BlockBookAddressResponse {
    let transactions: Vec<Value> = (0..size).map(blockbook_tx).collect();
    serde_json::from_value(json!({
        "page": 1,
        "totalPages": 10,
        "itemsOnPage": size,
        "address": WALLET,
        "balance": "0",
        "transactions": transactions
    }))
    .expect("bench fixture")
}

fn etherscan_page(size: usize) -> EtherscanResponse {
    let result: Vec<Value> = (0..size)
        .map(|i| {
            let (from, to) = if i % 2 == 0 { (WALLET, PEER) } else { (PEER, WALLET) };
            json!({
                "blockNumber": (19_000_000 + i).to_string(),
                "timeStamp": (1_700_000_000 + i).to_string(),
                "hash": format!("0x{i:064x}"),
                "from": from,
                "to": to,
                "value": (i * 1_000_000).to_string(),
                "gasPrice": "20000000000",
                "gasUsed": "21000",
                "isError": "0",
                "txreceipt_status": "1",
                "input": "0x",
                "methodId": "0x",
                "functionName": "",
                "confirmations": "100"
            })
        })
        .collect();
    serde_json::from_value(json!({ "status": "1", "message": "OK", "result": result }))
        .expect("bench fixture")
}

fn bench_blockbook_coin(c: &mut Criterion) {
    let mut group = c.benchmark_group("blockbook_evm_coin");
    for &size in PAGE_SIZES {
        let response = blockbook_page(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &response, |b, response| {
            let mut mapper = BlockBookEvmMapper::new(Blockchain::Ethereum(false));
            b.iter(|| {
                mapper.reset();
                black_box(mapper.map(black_box(response), WALLET, &AmountType::Coin))
            });
        });
    }
    group.finish();
}

fn bench_blockbook_token(c: &mut Criterion) {
    let mut group = c.benchmark_group("blockbook_evm_token");
    let amount_type = AmountType::Token(usdt());
    for &size in PAGE_SIZES {
        let response = blockbook_page(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &response, |b, response| {
            let mut mapper = BlockBookEvmMapper::new(Blockchain::Ethereum(false));
            b.iter(|| {
                mapper.reset();
                black_box(mapper.map(black_box(response), WALLET, &amount_type))
            });
        });
    }
    group.finish();
}

fn bench_etherscan(c: &mut Criterion) {
    let mut group = c.benchmark_group("etherscan_txlist");
    for &size in PAGE_SIZES {
        let response = etherscan_page(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &response, |b, response| {
            let mut mapper = EtherscanMapper::new(Blockchain::Ethereum(false));
            b.iter(|| {
                mapper.reset();
                black_box(mapper.map(black_box(response), WALLET, &AmountType::Coin))
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_blockbook_coin,
    bench_blockbook_token,
    bench_etherscan
);
criterion_main!(benches);
