//! UTXO 链网络参数
//!
//! 每个 (链, 网络) 组合对应一个不可变的参数值。

use serde::{Deserialize, Serialize};

use super::chain_config::Blockchain;
use crate::error::{Result, SdkError};

/// 签名哈希类型
pub const SIGHASH_ALL: u32 = 0x01;
/// Bitcoin Cash 要求带 FORKID 标志
pub const SIGHASH_ALL_FORKID: u32 = 0x41;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    /// P2PKH 地址版本字节
    pub p2pkh_prefix: u8,
    /// P2SH 地址版本字节
    pub p2sh_prefix: u8,
    /// Bech32 HRP，不支持隔离见证的链为 None
    pub bech32_hrp: Option<String>,
    pub sign_hash_type: u32,
    pub coin_type: u32,
    /// 低于该值的输出不会被节点转发（最小单位）
    pub dust_threshold: u64,
    /// 派生地址前是否必须压缩公钥
    pub requires_compressed_key: bool,
}

impl NetworkParams {
    pub fn for_chain(chain: Blockchain) -> Result<Self> {
        let testnet = chain.is_testnet();
        let coin_type = chain.coin_type();

        let params = match chain {
            Blockchain::Bitcoin(_) => Self {
                p2pkh_prefix: if testnet { 0x6f } else { 0x00 },
                p2sh_prefix: if testnet { 0xc4 } else { 0x05 },
                bech32_hrp: Some(if testnet { "tb" } else { "bc" }.to_string()),
                sign_hash_type: SIGHASH_ALL,
                coin_type,
                dust_threshold: 546,
                requires_compressed_key: false,
            },
            Blockchain::Litecoin => Self {
                p2pkh_prefix: 0x30,
                p2sh_prefix: 0x32,
                bech32_hrp: Some("ltc".to_string()),
                sign_hash_type: SIGHASH_ALL,
                coin_type,
                dust_threshold: 5_460,
                requires_compressed_key: false,
            },
            Blockchain::Dogecoin => Self {
                p2pkh_prefix: 0x1e,
                p2sh_prefix: 0x16,
                bech32_hrp: None,
                sign_hash_type: SIGHASH_ALL,
                coin_type,
                dust_threshold: 1_000_000,
                requires_compressed_key: true,
            },
            // 地址格式沿用 Dogecoin，仅版本字节不同
            Blockchain::Pepecoin(_) => Self {
                p2pkh_prefix: if testnet { 0x71 } else { 0x38 },
                p2sh_prefix: if testnet { 0xc4 } else { 0x16 },
                ..Self::for_chain(Blockchain::Dogecoin)?
            },
            Blockchain::BitcoinCash => Self {
                p2pkh_prefix: 0x00,
                p2sh_prefix: 0x05,
                bech32_hrp: None,
                sign_hash_type: SIGHASH_ALL_FORKID,
                coin_type,
                dust_threshold: 546,
                requires_compressed_key: true,
            },
            Blockchain::Dash(_) => Self {
                p2pkh_prefix: if testnet { 0x8c } else { 0x4c },
                p2sh_prefix: if testnet { 0x13 } else { 0x10 },
                bech32_hrp: None,
                sign_hash_type: SIGHASH_ALL,
                coin_type,
                dust_threshold: 5_460,
                requires_compressed_key: true,
            },
            Blockchain::Ravencoin(_) => Self {
                p2pkh_prefix: if testnet { 0x6f } else { 0x3c },
                p2sh_prefix: if testnet { 0xc4 } else { 0x7a },
                bech32_hrp: None,
                sign_hash_type: SIGHASH_ALL,
                coin_type,
                dust_threshold: 546,
                requires_compressed_key: true,
            },
            other => return Err(SdkError::UnsupportedChain(other.to_string())),
        };

        Ok(Self { coin_type, ..params })
    }
}
