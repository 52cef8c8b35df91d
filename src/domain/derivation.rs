//! HD 派生路径解析
//!
//! 多个派生策略版本共存：旧版（所有 EVM 链共享 coin type 60）和当前版本。
//! 钱包一旦以某个版本派生出地址，该版本在钱包生命周期内保持固定。

use std::{fmt, str::FromStr};

use bitcoin::{
    bip32::{ChildNumber, Xpub},
    secp256k1::Secp256k1,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::chain_config::{Blockchain, ChainFamily};
use crate::error::{Result, SdkError};

static PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^m(/[0-9]+'?)+$").expect("valid derivation path pattern"));

const HARDENED_OFFSET: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivationNode {
    Hardened(u32),
    NonHardened(u32),
}

impl DerivationNode {
    pub fn index(&self) -> u32 {
        match self {
            Self::Hardened(i) | Self::NonHardened(i) => *i,
        }
    }

    pub fn is_hardened(&self) -> bool {
        matches!(self, Self::Hardened(_))
    }
}

/// BIP32 派生路径，例如 `m/44'/60'/0'/0/0`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivationPath {
    nodes: Vec<DerivationNode>,
}

impl DerivationPath {
    pub fn new(nodes: Vec<DerivationNode>) -> Self {
        Self { nodes }
    }

    /// BIP44 风格：purpose'/coin'/account'/change/index
    pub fn bip44(purpose: u32, coin_type: u32, account: u32, change: u32, index: u32) -> Self {
        Self::new(vec![
            DerivationNode::Hardened(purpose),
            DerivationNode::Hardened(coin_type),
            DerivationNode::Hardened(account),
            DerivationNode::NonHardened(change),
            DerivationNode::NonHardened(index),
        ])
    }

    pub fn nodes(&self) -> &[DerivationNode] {
        &self.nodes
    }

    pub fn is_fully_hardened(&self) -> bool {
        self.nodes.iter().all(DerivationNode::is_hardened)
    }
}

impl FromStr for DerivationPath {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self> {
        if !PATH_RE.is_match(s) {
            return Err(SdkError::InvalidDerivationPath(s.to_string()));
        }

        let mut nodes = Vec::new();
        for part in s[2..].split('/') {
            let (digits, hardened) = match part.strip_suffix('\'') {
                Some(d) => (d, true),
                None => (part, false),
            };
            let index: u32 = digits
                .parse()
                .map_err(|_| SdkError::InvalidDerivationPath(s.to_string()))?;
            if index >= HARDENED_OFFSET {
                return Err(SdkError::InvalidDerivationPath(s.to_string()));
            }
            nodes.push(if hardened {
                DerivationNode::Hardened(index)
            } else {
                DerivationNode::NonHardened(index)
            });
        }

        Ok(Self { nodes })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for node in &self.nodes {
            match node {
                DerivationNode::Hardened(i) => write!(f, "/{}'", i)?,
                DerivationNode::NonHardened(i) => write!(f, "/{}", i)?,
            }
        }
        Ok(())
    }
}

/// 派生策略版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivationStyle {
    /// 旧版：所有 EVM 链共享 coin type 60，Solana 使用四级路径
    Legacy,
    #[default]
    Current,
}

/// 路径解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivationOutcome {
    Path(DerivationPath),
    /// 扁平密钥模型的链没有派生路径
    NoDerivation,
}

impl DerivationOutcome {
    pub fn path(&self) -> Option<&DerivationPath> {
        match self {
            Self::Path(p) => Some(p),
            Self::NoDerivation => None,
        }
    }
}

/// 派生配置：`Blockchain -> 派生路径` 的纯函数
pub trait DerivationConfig: Send + Sync {
    fn style(&self) -> DerivationStyle;
    fn derivation(&self, chain: Blockchain) -> DerivationOutcome;
}

pub struct LegacyDerivationConfig;

pub struct CurrentDerivationConfig;

impl DerivationConfig for LegacyDerivationConfig {
    fn style(&self) -> DerivationStyle {
        DerivationStyle::Legacy
    }

    fn derivation(&self, chain: Blockchain) -> DerivationOutcome {
        let path = match chain.family() {
            ChainFamily::FlatKey => return DerivationOutcome::NoDerivation,
            // CIP-1852 测试网沿用主网路径
            ChainFamily::Cardano => DerivationPath::bip44(1852, 1815, 0, 0, 0),
            _ if chain.is_testnet() => DerivationPath::bip44(44, 1, 0, 0, 0),
            ChainFamily::Evm | ChainFamily::EvmOptimisticRollup => {
                DerivationPath::bip44(44, 60, 0, 0, 0)
            }
            ChainFamily::Utxo | ChainFamily::Tron => {
                DerivationPath::bip44(44, chain.coin_type(), 0, 0, 0)
            }
            ChainFamily::Account => match chain {
                Blockchain::Solana(_) => DerivationPath::new(vec![
                    DerivationNode::Hardened(44),
                    DerivationNode::Hardened(501),
                    DerivationNode::Hardened(0),
                    DerivationNode::Hardened(0),
                ]),
                _ => account_path(chain.coin_type()),
            },
        };
        DerivationOutcome::Path(path)
    }
}

impl DerivationConfig for CurrentDerivationConfig {
    fn style(&self) -> DerivationStyle {
        DerivationStyle::Current
    }

    fn derivation(&self, chain: Blockchain) -> DerivationOutcome {
        let path = match chain.family() {
            ChainFamily::FlatKey => return DerivationOutcome::NoDerivation,
            ChainFamily::Cardano => DerivationPath::bip44(1852, 1815, 0, 0, 0),
            _ if chain.is_testnet() => DerivationPath::bip44(44, 1, 0, 0, 0),
            // 仅有独立地址空间的链使用自己的 coin type
            ChainFamily::Evm | ChainFamily::EvmOptimisticRollup => match chain {
                Blockchain::EthereumClassic(_) => DerivationPath::bip44(44, 61, 0, 0, 0),
                _ => DerivationPath::bip44(44, 60, 0, 0, 0),
            },
            ChainFamily::Utxo | ChainFamily::Tron => {
                DerivationPath::bip44(44, chain.coin_type(), 0, 0, 0)
            }
            ChainFamily::Account => account_path(chain.coin_type()),
        };
        DerivationOutcome::Path(path)
    }
}

/// 账户模型链使用全硬化路径 m/44'/coin'/0'
fn account_path(coin_type: u32) -> DerivationPath {
    DerivationPath::new(vec![
        DerivationNode::Hardened(44),
        DerivationNode::Hardened(coin_type),
        DerivationNode::Hardened(0),
    ])
}

/// 派生路径解析器，构造时固定策略版本
pub struct DerivationPathResolver {
    config: Box<dyn DerivationConfig>,
}

impl DerivationPathResolver {
    pub fn new(style: DerivationStyle) -> Self {
        let config: Box<dyn DerivationConfig> = match style {
            DerivationStyle::Legacy => Box::new(LegacyDerivationConfig),
            DerivationStyle::Current => Box::new(CurrentDerivationConfig),
        };
        Self { config }
    }

    pub fn style(&self) -> DerivationStyle {
        self.config.style()
    }

    pub fn resolve(&self, chain: Blockchain) -> DerivationOutcome {
        self.config.derivation(chain)
    }

    /// 按字符串 id 解析
    ///
    /// 未知链在 debug 构建中直接 panic，release 构建中记录错误并返回 NoDerivation。
    pub fn resolve_id(&self, id: &str, is_testnet: bool) -> DerivationOutcome {
        match Blockchain::from_id(id, is_testnet) {
            Ok(chain) => self.resolve(chain),
            Err(e) => {
                debug_assert!(false, "unknown chain identity: {id}");
                tracing::error!(chain = %id, error = %e, "derivation_unknown_chain");
                DerivationOutcome::NoDerivation
            }
        }
    }
}

/// 从扩展公钥派生子公钥（非硬化 change/index），返回压缩公钥
pub fn derive_child_public_key(xpub: &str, change: u32, index: u32) -> Result<Vec<u8>> {
    let xpub = Xpub::from_str(xpub).map_err(|e| SdkError::InvalidPublicKey(e.to_string()))?;
    let path = [
        ChildNumber::from_normal_idx(change)
            .map_err(|e| SdkError::InvalidDerivationPath(e.to_string()))?,
        ChildNumber::from_normal_idx(index)
            .map_err(|e| SdkError::InvalidDerivationPath(e.to_string()))?,
    ];

    let secp = Secp256k1::verification_only();
    let child = xpub
        .derive_pub(&secp, &path)
        .map_err(|e| SdkError::InvalidPublicKey(e.to_string()))?;
    Ok(child.public_key.serialize().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain_config::ALL_CHAIN_IDS;

    #[test]
    fn test_every_chain_resolves_in_both_styles() {
        for style in [DerivationStyle::Legacy, DerivationStyle::Current] {
            let resolver = DerivationPathResolver::new(style);
            for id in ALL_CHAIN_IDS {
                for testnet in [false, true] {
                    let chain = Blockchain::from_id(id, testnet).unwrap();
                    match resolver.resolve(chain) {
                        DerivationOutcome::Path(path) => {
                            let text = path.to_string();
                            assert!(!text.is_empty());
                            assert_eq!(text.parse::<DerivationPath>().unwrap(), path);
                        }
                        DerivationOutcome::NoDerivation => {
                            assert_eq!(chain.family(), ChainFamily::FlatKey)
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_evm_paths() {
        let current = DerivationPathResolver::new(DerivationStyle::Current);
        let path = current.resolve(Blockchain::Base(false));
        assert_eq!(path.path().unwrap().to_string(), "m/44'/60'/0'/0/0");

        let etc = current.resolve(Blockchain::EthereumClassic(false));
        assert_eq!(etc.path().unwrap().to_string(), "m/44'/61'/0'/0/0");

        let legacy = DerivationPathResolver::new(DerivationStyle::Legacy);
        let etc = legacy.resolve(Blockchain::EthereumClassic(false));
        assert_eq!(etc.path().unwrap().to_string(), "m/44'/60'/0'/0/0");
    }

    #[test]
    fn test_account_chains_are_fully_hardened() {
        for style in [DerivationStyle::Legacy, DerivationStyle::Current] {
            let resolver = DerivationPathResolver::new(style);
            let sol = resolver.resolve(Blockchain::Solana(false));
            assert!(sol.path().unwrap().is_fully_hardened());
        }
        let current = DerivationPathResolver::new(DerivationStyle::Current);
        assert_eq!(
            current
                .resolve(Blockchain::Stellar(false))
                .path()
                .unwrap()
                .to_string(),
            "m/44'/148'/0'"
        );
    }

    #[test]
    fn test_testnet_uses_coin_type_one() {
        let resolver = DerivationPathResolver::new(DerivationStyle::Current);
        let path = resolver.resolve(Blockchain::Bitcoin(true));
        assert_eq!(path.path().unwrap().to_string(), "m/44'/1'/0'/0/0");
    }

    #[test]
    fn test_flat_key_chain_has_no_derivation() {
        let resolver = DerivationPathResolver::new(DerivationStyle::Current);
        assert_eq!(
            resolver.resolve(Blockchain::Chia(false)),
            DerivationOutcome::NoDerivation
        );
    }

    #[test]
    fn test_cardano_path() {
        let resolver = DerivationPathResolver::new(DerivationStyle::Legacy);
        let path = resolver.resolve(Blockchain::Cardano(false));
        assert_eq!(path.path().unwrap().to_string(), "m/1852'/1815'/0'/0/0");
        let testnet = resolver.resolve(Blockchain::Cardano(true));
        assert_eq!(testnet, path);
    }

    #[test]
    fn test_invalid_paths_rejected() {
        for bad in ["", "m", "m/", "44'/60'", "m/44''/0", "m/abc", "m/4294967295"] {
            assert!(bad.parse::<DerivationPath>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_derive_child_from_xpub() {
        // BIP32 test vector 1, chain m/0H
        let xpub = "xpub68Gmy5EdvgibQVfPdqkBBCHxA5htiqg55crXYuXoQRKfDBFA1WEjWgP6LHhwBZeNK1VTsfTFUHCdrfp1bgwQ9xv5ski8PX9rL2dZXvgGDnw";
        let a = derive_child_public_key(xpub, 0, 0).unwrap();
        let b = derive_child_public_key(xpub, 0, 1).unwrap();
        assert_eq!(a.len(), 33);
        assert_ne!(a, b);
        assert_eq!(a, derive_child_public_key(xpub, 0, 0).unwrap());
    }

    #[test]
    fn test_bad_xpub_rejected() {
        assert!(matches!(
            derive_child_public_key("xpub-nope", 0, 0),
            Err(SdkError::InvalidPublicKey(_))
        ));
    }
}
