//! UTXO 模型
//!
//! 唯一标识为 (transaction_hash, output_index)，同一钱包内不得重复。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// UTXO 上附带的原生资产（Cardano 多资产）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub policy_id: String,
    /// 资产名（十六进制），用于身份比较
    pub asset_name_hex: String,
    pub amount: u64,
}

impl Asset {
    /// 资产名解码为 ASCII 用于展示，无法解码时返回原始十六进制
    pub fn display_name(&self) -> String {
        hex::decode(&self.asset_name_hex)
            .ok()
            .filter(|bytes| bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' '))
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_else(|| self.asset_name_hex.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub address: String,
    /// 最小单位金额
    pub amount: u64,
    pub output_index: u32,
    pub transaction_hash: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl UnspentOutput {
    pub fn key(&self) -> (&str, u32) {
        (&self.transaction_hash, self.output_index)
    }
}

/// `<hash>:<index>` 形式的输出标识
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputId {
    pub transaction_hash: String,
    pub output_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputIdError {
    #[error("missing ':' separator")]
    MissingSeparator,
    #[error("expected exactly two segments, got {0}")]
    WrongSegmentCount(usize),
    #[error("empty transaction hash")]
    EmptyHash,
    #[error("non-numeric output index: {0}")]
    InvalidIndex(String),
}

/// 解析 `<hash>:<index>`
pub fn parse_output_id(identifier: &str) -> Result<OutputId, OutputIdError> {
    if !identifier.contains(':') {
        return Err(OutputIdError::MissingSeparator);
    }

    let parts: Vec<&str> = identifier.split(':').collect();
    if parts.len() != 2 {
        return Err(OutputIdError::WrongSegmentCount(parts.len()));
    }

    let (hash, index) = (parts[0], parts[1]);
    if hash.is_empty() {
        return Err(OutputIdError::EmptyHash);
    }
    let output_index = index
        .parse::<u32>()
        .map_err(|_| OutputIdError::InvalidIndex(index.to_string()))?;

    Ok(OutputId {
        transaction_hash: hash.to_string(),
        output_index,
    })
}

/// 按 (hash, index) 去重，保留首次出现的顺序
pub fn unique_outputs(outputs: impl IntoIterator<Item = UnspentOutput>) -> Vec<UnspentOutput> {
    let mut seen = HashSet::new();
    outputs
        .into_iter()
        .filter(|o| seen.insert((o.transaction_hash.clone(), o.output_index)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(hash: &str, index: u32, amount: u64) -> UnspentOutput {
        UnspentOutput {
            address: "addr".into(),
            amount,
            output_index: index,
            transaction_hash: hash.into(),
            assets: vec![],
        }
    }

    #[test]
    fn test_parse_valid_identifier() {
        let hash = "482d88eb2d3b40b8a4e6bb8545cef842a5703e8f9eab9e3caca5c2edd1f31a7f";
        let id = parse_output_id(&format!("{hash}:0")).unwrap();
        assert_eq!(id.transaction_hash, hash);
        assert_eq!(id.output_index, 0);
    }

    #[test]
    fn test_parse_malformed_identifiers() {
        assert_eq!(
            parse_output_id("482d88eb"),
            Err(OutputIdError::MissingSeparator)
        );
        assert_eq!(
            parse_output_id("482d88eb:x"),
            Err(OutputIdError::InvalidIndex("x".into()))
        );
        assert_eq!(
            parse_output_id("482d88eb:1:2"),
            Err(OutputIdError::WrongSegmentCount(3))
        );
        assert_eq!(parse_output_id(":1"), Err(OutputIdError::EmptyHash));
        assert!(parse_output_id("abc:-1").is_err());
    }

    #[test]
    fn test_unique_outputs_drops_duplicates() {
        let outputs = vec![
            output("aa", 0, 10),
            output("aa", 1, 20),
            output("aa", 0, 10),
            output("bb", 0, 30),
        ];
        let unique = unique_outputs(outputs);
        assert_eq!(unique.len(), 3);
        assert_eq!(unique[1].key(), ("aa", 1));
    }

    #[test]
    fn test_asset_display_name() {
        let asset = Asset {
            policy_id: "p".into(),
            asset_name_hex: hex::encode("HOSKY"),
            amount: 1,
        };
        assert_eq!(asset.display_name(), "HOSKY");

        let binary = Asset {
            asset_name_hex: "00ff".into(),
            ..asset
        };
        assert_eq!(binary.display_name(), "00ff");
    }
}
