//! 交易历史归一化
//!
//! 各浏览器响应经映射器转换为 [`TransactionRecord`]。单条记录的问题只会让该条被丢弃，
//! 整页失败（限流、历史结束、未知错误）以 [`ExplorerApiError`] 返回。
//!
//! [`ExplorerApiError`]: crate::error::ExplorerApiError

pub mod blockbook;
pub mod etherscan;
pub mod pager;
pub mod tron;

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

pub use blockbook::{BlockBookEvmMapper, BlockBookUtxoMapper};
pub use etherscan::EtherscanMapper;
pub use pager::{
    BlockBookHistorySource, EtherscanHistorySource, HistoryPage, HistoryRequest, HistorySource,
    TransactionHistoryPager, TransactionHistoryService,
};
pub use tron::BlockBookTronMapper;

use crate::{
    domain::{units_to_decimal, AmountType, TransactionRecord, TransactionType},
    error::Result,
};

/// 同一哈希的出现次数，映射器会话内有效
#[derive(Debug, Clone, Default)]
pub struct IndexCounter {
    counts: HashMap<String, usize>,
}

impl IndexCounter {
    /// 返回本次出现的序号（从 0 开始）
    pub fn next(&mut self, hash: &str) -> usize {
        let count = self.counts.entry(hash.to_string()).or_insert(0);
        let index = *count;
        *count += 1;
        index
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }
}

pub trait TransactionHistoryMapper: Send {
    type Response;

    fn map(
        &mut self,
        response: &Self::Response,
        wallet_address: &str,
        amount_type: &AmountType,
    ) -> Result<Vec<TransactionRecord>>;

    /// 响应中可推出的总页数
    fn total_pages(&self, _response: &Self::Response, _amount_type: &AmountType) -> Option<u32> {
        None
    }

    /// 完整重新加载前清空序号计数
    fn reset(&mut self);
}

/// 最小单位字符串 -> 十进制
pub(crate) fn parse_units(value: &str, decimals: u32) -> Option<Decimal> {
    let units = value.trim().parse::<u128>().ok()?;
    units_to_decimal(units, decimals).ok()
}

pub(crate) fn timestamp(seconds: i64) -> Option<DateTime<Utc>> {
    if seconds <= 0 {
        return None;
    }
    Utc.timestamp_opt(seconds, 0).single()
}

/// `transfer(address,uint256)` -> `transfer`
pub fn method_name(signature: &str) -> &str {
    signature
        .split_once('(')
        .map_or(signature, |(name, _)| name)
        .trim()
}

/// 方法 id 优先，其次去掉参数签名的方法名，最后为普通转账
pub fn classify(method_id: Option<&str>, function_name: Option<&str>) -> TransactionType {
    if let Some(id) = method_id.filter(|id| !id.is_empty() && *id != "0x") {
        return TransactionType::ContractMethodIdentifier(id.to_string());
    }
    match function_name.map(method_name).filter(|name| !name.is_empty()) {
        Some(name) => TransactionType::ContractMethodName(name.to_string()),
        None => TransactionType::Transfer,
    }
}

/// 调用数据的前 4 字节，`0x` + 8 位十六进制
pub(crate) fn method_id_from_data(data: &str) -> Option<String> {
    let clean = data.trim_start_matches("0x");
    (clean.len() >= 8).then(|| format!("0x{}", &clean[..8]))
}
