//! 网络提供者
//!
//! 各协议客户端返回链原生 DTO，UTXO 类提供者统一实现 [`UtxoNetworkProvider`]。

pub mod blockbook;
pub mod electrum;
pub mod etherscan;
pub mod json_rpc;
pub mod multi_utxo;
pub mod rosetta;

use async_trait::async_trait;

pub use blockbook::BlockBookProvider;
pub use electrum::ElectrumProvider;
pub use etherscan::EtherscanProvider;
pub use json_rpc::JsonRpcClient;
pub use multi_utxo::{MultiUtxoNetworkProvider, ProviderPoolPolicy};
pub use rosetta::RosettaProvider;

use crate::{domain::UnspentOutput, error::Result};

/// 单个地址的 UTXO 余额（最小单位）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UtxoBalance {
    pub confirmed: u64,
    /// 未确认变动，可能为负
    pub unconfirmed: i64,
}

#[async_trait]
pub trait UtxoNetworkProvider: Send + Sync {
    fn host(&self) -> &str;

    async fn unspent_outputs(&self, address: &str) -> Result<Vec<UnspentOutput>>;

    async fn balance(&self, address: &str) -> Result<UtxoBalance>;

    /// 广播原始交易（十六进制），返回交易哈希
    async fn send(&self, raw_hex: &str) -> Result<String>;

    /// 目标确认块数对应的费率（coin/kB），无法估算时为 None
    async fn estimate_fee_rate(&self, target_blocks: u32) -> Result<Option<f64>>;
}

/// Cardano 网络提供者：按地址集合获取 UTXO，提交已签名交易
#[async_trait]
pub trait CardanoNetworkProvider: Send + Sync {
    async fn unspent_outputs(&self, addresses: &[String]) -> Result<Vec<UnspentOutput>>;

    /// 提交 CBOR 交易字节，返回交易哈希
    async fn send(&self, transaction: &[u8]) -> Result<String>;
}
