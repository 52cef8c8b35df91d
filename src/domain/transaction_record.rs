//! 统一交易历史记录
//! 各浏览器的交易 DTO 都归一化为 [`TransactionRecord`]

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amount::Fee;

/// 交易状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// 已广播，尚未上链
    Unconfirmed,
    Confirmed,
    /// 链上执行失败或 revert
    Failed,
}

impl TransactionStatus {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Unconfirmed => "交易待确认",
            Self::Confirmed => "交易已确认",
            Self::Failed => "交易失败",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}

/// 交易分类
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// 普通转账
    Transfer,
    /// 合约方法 id，例如 `0xa9059cbb`
    ContractMethodIdentifier(String),
    /// 人类可读的方法名，已去掉参数签名
    ContractMethodName(String),
    Staking {
        kind: StakingKind,
        validator: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakingKind {
    Stake,
    Unstake,
    Vote,
    Withdraw,
    ClaimRewards,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub address: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationAddress {
    User(String),
    Contract(String),
}

impl DestinationAddress {
    pub fn value(&self) -> &str {
        match self {
            Self::User(a) | Self::Contract(a) => a,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub address: DestinationAddress,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Single(Source),
    Multiple(Vec<Source>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationType {
    Single(Destination),
    Multiple(Vec<Destination>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: String,
    /// 同一哈希的第几条逻辑转账
    pub index: usize,
    pub source: SourceType,
    pub destination: DestinationType,
    pub fee: Fee,
    pub status: TransactionStatus,
    pub is_outgoing: bool,
    pub transaction_type: TransactionType,
    pub date: Option<DateTime<Utc>>,
    /// 疑似垃圾转账（零金额代币转账）
    #[serde(default)]
    pub is_spam: bool,
}
