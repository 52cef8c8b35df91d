//! 地址模型

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    /// 默认展示的地址（支持隔离见证的链为 Bech32）
    Default,
    /// Base58 旧格式
    Legacy,
}

/// 携带锁定脚本的地址
///
/// 交易构建器需要原始锁定脚本字节，Electrum 也用它计算 script hash。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockingScriptAddress {
    pub value: String,
    #[serde(with = "hex_bytes")]
    pub locking_script: Vec<u8>,
    pub address_type: AddressType,
}

/// 钱包地址
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Address {
    Plain {
        value: String,
        address_type: AddressType,
    },
    LockingScript(LockingScriptAddress),
}

impl Address {
    pub fn plain(value: impl Into<String>) -> Self {
        Self::Plain {
            value: value.into(),
            address_type: AddressType::Default,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Plain { value, .. } => value,
            Self::LockingScript(a) => &a.value,
        }
    }

    pub fn address_type(&self) -> AddressType {
        match self {
            Self::Plain { address_type, .. } => *address_type,
            Self::LockingScript(a) => a.address_type,
        }
    }

    pub fn locking_script(&self) -> Option<&[u8]> {
        match self {
            Self::Plain { .. } => None,
            Self::LockingScript(a) => Some(&a.locking_script),
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}
