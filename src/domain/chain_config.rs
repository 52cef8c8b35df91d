//! 多链配置模块
//!
//! 定义所有支持的区块链身份及其链族属性

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SdkError};

/// 链族，决定钱包使用哪一种链策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainFamily {
    /// UTXO 模型 (Bitcoin, Litecoin, Dogecoin ...)
    Utxo,
    /// 账户模型 EVM 链
    Evm,
    /// Optimistic Rollup EVM 链（需要叠加 L1 数据费）
    EvmOptimisticRollup,
    /// Cardano (Rosetta 协议)
    Cardano,
    Tron,
    /// ed25519 账户链 (Solana, Stellar)
    Account,
    /// 扁平密钥模型，无派生路径 (Chia)
    FlatKey,
}

/// 区块链身份（链 + 网络标志）
///
/// 每个钱包会话构造一次，之后不可变。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "id", content = "testnet", rename_all = "snake_case")]
pub enum Blockchain {
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // UTXO 系列
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    Bitcoin(bool),
    Litecoin,
    Dogecoin,
    Pepecoin(bool),
    BitcoinCash,
    Dash(bool),
    Ravencoin(bool),

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // EVM 系列
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    Ethereum(bool),
    EthereumClassic(bool),
    BinanceSmartChain(bool),
    Polygon(bool),
    Avalanche(bool),
    Arbitrum(bool),
    Optimism(bool),
    Base(bool),
    Cyber(bool),
    Blast(bool),
    Mantle(bool),

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 其他
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    Cardano(bool),
    Tron(bool),
    Solana(bool),
    Stellar(bool),
    Chia(bool),
}

/// 所有支持链的主网 id（用于遍历与测试）
pub const ALL_CHAIN_IDS: &[&str] = &[
    "bitcoin",
    "litecoin",
    "dogecoin",
    "pepecoin",
    "bitcoin-cash",
    "dash",
    "ravencoin",
    "ethereum",
    "ethereum-classic",
    "binance-smart-chain",
    "polygon",
    "avalanche",
    "arbitrum",
    "optimism",
    "base",
    "cyber",
    "blast",
    "mantle",
    "cardano",
    "tron",
    "solana",
    "stellar",
    "chia",
];

impl Blockchain {
    /// 稳定字符串 id（不含网络标志）
    pub fn id(&self) -> &'static str {
        match self {
            Self::Bitcoin(_) => "bitcoin",
            Self::Litecoin => "litecoin",
            Self::Dogecoin => "dogecoin",
            Self::Pepecoin(_) => "pepecoin",
            Self::BitcoinCash => "bitcoin-cash",
            Self::Dash(_) => "dash",
            Self::Ravencoin(_) => "ravencoin",
            Self::Ethereum(_) => "ethereum",
            Self::EthereumClassic(_) => "ethereum-classic",
            Self::BinanceSmartChain(_) => "binance-smart-chain",
            Self::Polygon(_) => "polygon",
            Self::Avalanche(_) => "avalanche",
            Self::Arbitrum(_) => "arbitrum",
            Self::Optimism(_) => "optimism",
            Self::Base(_) => "base",
            Self::Cyber(_) => "cyber",
            Self::Blast(_) => "blast",
            Self::Mantle(_) => "mantle",
            Self::Cardano(_) => "cardano",
            Self::Tron(_) => "tron",
            Self::Solana(_) => "solana",
            Self::Stellar(_) => "stellar",
            Self::Chia(_) => "chia",
        }
    }

    /// 从字符串 id 构造
    ///
    /// 支持的链集合是封闭的，未知 id 属于调用方的编程错误。
    pub fn from_id(id: &str, is_testnet: bool) -> Result<Self> {
        let t = is_testnet;
        let chain = match id.to_lowercase().as_str() {
            "bitcoin" | "btc" => Self::Bitcoin(t),
            "litecoin" | "ltc" => Self::Litecoin,
            "dogecoin" | "doge" => Self::Dogecoin,
            "pepecoin" | "pep" => Self::Pepecoin(t),
            "bitcoin-cash" | "bch" => Self::BitcoinCash,
            "dash" => Self::Dash(t),
            "ravencoin" | "rvn" => Self::Ravencoin(t),
            "ethereum" | "eth" => Self::Ethereum(t),
            "ethereum-classic" | "etc" => Self::EthereumClassic(t),
            "binance-smart-chain" | "bsc" => Self::BinanceSmartChain(t),
            "polygon" | "matic" => Self::Polygon(t),
            "avalanche" | "avax" => Self::Avalanche(t),
            "arbitrum" | "arb" => Self::Arbitrum(t),
            "optimism" | "op" => Self::Optimism(t),
            "base" => Self::Base(t),
            "cyber" => Self::Cyber(t),
            "blast" => Self::Blast(t),
            "mantle" => Self::Mantle(t),
            "cardano" | "ada" => Self::Cardano(t),
            "tron" | "trx" => Self::Tron(t),
            "solana" | "sol" => Self::Solana(t),
            "stellar" | "xlm" => Self::Stellar(t),
            "chia" | "xch" => Self::Chia(t),
            other => return Err(SdkError::UnsupportedChain(other.to_string())),
        };
        Ok(chain)
    }

    pub fn is_testnet(&self) -> bool {
        match self {
            Self::Litecoin | Self::Dogecoin | Self::BitcoinCash => false,
            Self::Bitcoin(t)
            | Self::Pepecoin(t)
            | Self::Dash(t)
            | Self::Ravencoin(t)
            | Self::Ethereum(t)
            | Self::EthereumClassic(t)
            | Self::BinanceSmartChain(t)
            | Self::Polygon(t)
            | Self::Avalanche(t)
            | Self::Arbitrum(t)
            | Self::Optimism(t)
            | Self::Base(t)
            | Self::Cyber(t)
            | Self::Blast(t)
            | Self::Mantle(t)
            | Self::Cardano(t)
            | Self::Tron(t)
            | Self::Solana(t)
            | Self::Stellar(t)
            | Self::Chia(t) => *t,
        }
    }

    pub fn family(&self) -> ChainFamily {
        match self {
            Self::Bitcoin(_)
            | Self::Litecoin
            | Self::Dogecoin
            | Self::Pepecoin(_)
            | Self::BitcoinCash
            | Self::Dash(_)
            | Self::Ravencoin(_) => ChainFamily::Utxo,
            Self::Optimism(_) | Self::Base(_) | Self::Cyber(_) | Self::Blast(_) | Self::Mantle(_) => {
                ChainFamily::EvmOptimisticRollup
            }
            Self::Ethereum(_)
            | Self::EthereumClassic(_)
            | Self::BinanceSmartChain(_)
            | Self::Polygon(_)
            | Self::Avalanche(_)
            | Self::Arbitrum(_) => ChainFamily::Evm,
            Self::Cardano(_) => ChainFamily::Cardano,
            Self::Tron(_) => ChainFamily::Tron,
            Self::Solana(_) | Self::Stellar(_) => ChainFamily::Account,
            Self::Chia(_) => ChainFamily::FlatKey,
        }
    }

    pub fn is_evm(&self) -> bool {
        matches!(
            self.family(),
            ChainFamily::Evm | ChainFamily::EvmOptimisticRollup
        )
    }

    pub fn is_utxo(&self) -> bool {
        self.family() == ChainFamily::Utxo
    }

    /// 是否为 L2 网络（包含 Arbitrum 这类非 OP Stack 的 rollup）
    pub fn is_l2(&self) -> bool {
        matches!(self, Self::Arbitrum(_)) || self.family() == ChainFamily::EvmOptimisticRollup
    }

    /// 最小单位的小数位数
    pub fn decimal_count(&self) -> u32 {
        match self.family() {
            ChainFamily::Utxo => 8,
            ChainFamily::Evm | ChainFamily::EvmOptimisticRollup => 18,
            ChainFamily::Cardano | ChainFamily::Tron => 6,
            ChainFamily::Account => match self {
                Self::Stellar(_) => 7,
                _ => 9,
            },
            ChainFamily::FlatKey => 12,
        }
    }

    pub fn currency_symbol(&self) -> &'static str {
        match self {
            Self::Bitcoin(_) => "BTC",
            Self::Litecoin => "LTC",
            Self::Dogecoin => "DOGE",
            Self::Pepecoin(_) => "PEP",
            Self::BitcoinCash => "BCH",
            Self::Dash(_) => "DASH",
            Self::Ravencoin(_) => "RVN",
            Self::Ethereum(_)
            | Self::Arbitrum(_)
            | Self::Optimism(_)
            | Self::Base(_)
            | Self::Cyber(_)
            | Self::Blast(_) => "ETH",
            Self::EthereumClassic(_) => "ETC",
            Self::BinanceSmartChain(_) => "BNB",
            Self::Polygon(_) => "POL",
            Self::Avalanche(_) => "AVAX",
            Self::Mantle(_) => "MNT",
            Self::Cardano(_) => "ADA",
            Self::Tron(_) => "TRX",
            Self::Solana(_) => "SOL",
            Self::Stellar(_) => "XLM",
            Self::Chia(_) => "XCH",
        }
    }

    /// EIP-155 链 ID，非 EVM 链返回 None
    pub fn chain_id(&self) -> Option<u64> {
        let t = self.is_testnet();
        let id = match self {
            Self::Ethereum(_) => if t { 11155111 } else { 1 },
            Self::EthereumClassic(_) => if t { 63 } else { 61 },
            Self::BinanceSmartChain(_) => if t { 97 } else { 56 },
            Self::Polygon(_) => if t { 80002 } else { 137 },
            Self::Avalanche(_) => if t { 43113 } else { 43114 },
            Self::Arbitrum(_) => if t { 421614 } else { 42161 },
            Self::Optimism(_) => if t { 11155420 } else { 10 },
            Self::Base(_) => if t { 84532 } else { 8453 },
            Self::Cyber(_) => if t { 111557560 } else { 7560 },
            Self::Blast(_) => if t { 168587773 } else { 81457 },
            Self::Mantle(_) => if t { 5003 } else { 5000 },
            _ => return None,
        };
        Some(id)
    }

    /// SLIP-44 coin type，测试网统一为 1
    pub fn coin_type(&self) -> u32 {
        if self.is_testnet() {
            return 1;
        }
        match self {
            Self::Bitcoin(_) => 0,
            Self::Litecoin => 2,
            Self::Dogecoin => 3,
            Self::Pepecoin(_) => 3434,
            Self::BitcoinCash => 145,
            Self::Dash(_) => 5,
            Self::Ravencoin(_) => 175,
            Self::EthereumClassic(_) => 61,
            Self::BinanceSmartChain(_) => 9006,
            Self::Polygon(_) => 966,
            Self::Avalanche(_) => 9000,
            Self::Ethereum(_)
            | Self::Arbitrum(_)
            | Self::Optimism(_)
            | Self::Base(_)
            | Self::Cyber(_)
            | Self::Blast(_)
            | Self::Mantle(_) => 60,
            Self::Cardano(_) => 1815,
            Self::Tron(_) => 195,
            Self::Solana(_) => 501,
            Self::Stellar(_) => 148,
            Self::Chia(_) => 8444,
        }
    }

    /// 是否支持 EIP-1559 动态费用
    pub fn supports_eip1559(&self) -> bool {
        matches!(
            self,
            Self::Ethereum(_)
                | Self::Polygon(_)
                | Self::Avalanche(_)
                | Self::Arbitrum(_)
                | Self::Optimism(_)
                | Self::Base(_)
                | Self::Cyber(_)
                | Self::Blast(_)
        )
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_testnet() {
            write!(f, "{}-testnet", self.id())
        } else {
            f.write_str(self.id())
        }
    }
}
