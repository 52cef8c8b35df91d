//! 地址服务
//!
//! 按链族把公钥转换为地址，并校验地址字符串。
//! 校验永远不向调用方抛错，解码失败即视为无效。

use bech32::{primitives::decode::CheckedHrpstring, segwit, Checksum, Hrp};
use bitcoin::hashes::{hash160, Hash};
use blake2::{
    digest::{Update, VariableOutput},
    Blake2bVar,
};
use sha3::{Digest, Keccak256};

use crate::{
    domain::{Address, AddressType, Blockchain, ChainFamily, LockingScriptAddress, NetworkParams},
    error::{Result, SdkError},
};

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_0: u8 = 0x00;
const PUSH_20: u8 = 0x14;

pub trait AddressService: Send + Sync {
    /// 生成地址列表，第一个为默认地址
    fn make_addresses(&self, public_key: &[u8]) -> Result<Vec<Address>>;

    fn validate(&self, address: &str) -> bool;
}

/// 按链族创建地址服务
pub fn address_service_for(chain: Blockchain) -> Result<Box<dyn AddressService>> {
    let service: Box<dyn AddressService> = match chain.family() {
        ChainFamily::Utxo => Box::new(UtxoAddressService::new(NetworkParams::for_chain(chain)?)),
        ChainFamily::Evm | ChainFamily::EvmOptimisticRollup => Box::new(EvmAddressService),
        ChainFamily::Cardano => Box::new(CardanoAddressService::new(chain.is_testnet())),
        _ => return Err(SdkError::UnsupportedChain(chain.to_string())),
    };
    Ok(service)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// UTXO
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct UtxoAddressService {
    params: NetworkParams,
}

impl UtxoAddressService {
    pub fn new(params: NetworkParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    /// 校验公钥，必要时在派生地址之前强制压缩
    pub fn prepare_public_key(&self, public_key: &[u8]) -> Result<Vec<u8>> {
        let key = secp256k1::PublicKey::from_slice(public_key)
            .map_err(|e| SdkError::InvalidPublicKey(e.to_string()))?;
        if self.params.requires_compressed_key {
            Ok(key.serialize().to_vec())
        } else {
            Ok(public_key.to_vec())
        }
    }

    /// P2PKH 地址
    pub fn address(&self, public_key: &[u8]) -> Result<LockingScriptAddress> {
        let key = self.prepare_public_key(public_key)?;
        let hash = hash160::Hash::hash(&key).to_byte_array();
        Ok(LockingScriptAddress {
            value: base58_check(self.params.p2pkh_prefix, &hash),
            locking_script: p2pkh_script(&hash),
            address_type: AddressType::Legacy,
        })
    }

    /// P2SH 地址（赎回脚本先做 HASH160）
    pub fn script_address(&self, redeem_script: &[u8]) -> LockingScriptAddress {
        let hash = hash160::Hash::hash(redeem_script).to_byte_array();
        self.script_address_from_hash(&hash)
    }

    pub fn script_address_from_hash(&self, script_hash: &[u8; 20]) -> LockingScriptAddress {
        let mut script = Vec::with_capacity(23);
        script.push(OP_HASH160);
        script.push(PUSH_20);
        script.extend_from_slice(script_hash);
        script.push(OP_EQUAL);

        LockingScriptAddress {
            value: base58_check(self.params.p2sh_prefix, script_hash),
            locking_script: script,
            address_type: AddressType::Legacy,
        }
    }

    /// P2WPKH 地址，隔离见证只接受压缩公钥
    pub fn segwit_address(&self, public_key: &[u8]) -> Result<LockingScriptAddress> {
        let hrp = self
            .hrp()
            .ok_or_else(|| SdkError::UnsupportedChain("segwit not supported".into()))?;
        let key = secp256k1::PublicKey::from_slice(public_key)
            .map_err(|e| SdkError::InvalidPublicKey(e.to_string()))?
            .serialize();
        let program = hash160::Hash::hash(&key).to_byte_array();
        let value = segwit::encode_v0(hrp, &program)
            .map_err(|e| SdkError::InvalidAddress(e.to_string()))?;

        let mut script = Vec::with_capacity(22);
        script.push(OP_0);
        script.push(PUSH_20);
        script.extend_from_slice(&program);

        Ok(LockingScriptAddress {
            value,
            locking_script: script,
            address_type: AddressType::Default,
        })
    }

    /// 地址 -> 锁定脚本
    pub fn locking_script(&self, address: &str) -> Result<Vec<u8>> {
        if let Some(program) = self.decode_segwit(address) {
            let mut script = vec![OP_0, program.len() as u8];
            script.extend_from_slice(&program);
            return Ok(script);
        }

        let payload = bs58::decode(address)
            .with_check(None)
            .into_vec()
            .map_err(|_| SdkError::InvalidAddress(address.to_string()))?;
        if payload.len() != 21 {
            return Err(SdkError::InvalidAddress(address.to_string()));
        }

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);
        match payload[0] {
            p if p == self.params.p2pkh_prefix => Ok(p2pkh_script(&hash)),
            p if p == self.params.p2sh_prefix => {
                Ok(self.script_address_from_hash(&hash).locking_script)
            }
            _ => Err(SdkError::InvalidAddress(address.to_string())),
        }
    }

    fn hrp(&self) -> Option<Hrp> {
        self.params
            .bech32_hrp
            .as_deref()
            .and_then(|h| Hrp::parse(h).ok())
    }

    fn decode_segwit(&self, address: &str) -> Option<Vec<u8>> {
        let expected = self.hrp()?;
        let (hrp, version, program) = segwit::decode(address).ok()?;
        if hrp != expected || version != segwit::VERSION_0 {
            return None;
        }
        matches!(program.len(), 20 | 32).then_some(program)
    }
}

impl AddressService for UtxoAddressService {
    fn make_addresses(&self, public_key: &[u8]) -> Result<Vec<Address>> {
        let legacy = Address::LockingScript(self.address(public_key)?);
        if self.params.bech32_hrp.is_some() {
            let segwit = Address::LockingScript(self.segwit_address(public_key)?);
            Ok(vec![segwit, legacy])
        } else {
            // 没有隔离见证时旧格式即默认地址
            let default = match legacy {
                Address::LockingScript(mut a) => {
                    a.address_type = AddressType::Default;
                    Address::LockingScript(a)
                }
                other => other,
            };
            Ok(vec![default])
        }
    }

    fn validate(&self, address: &str) -> bool {
        self.locking_script(address).is_ok()
    }
}

pub(crate) fn p2pkh_script(hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, PUSH_20]);
    script.extend_from_slice(hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

fn base58_check(prefix: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(payload.len() + 1);
    data.push(prefix);
    data.extend_from_slice(payload);
    bs58::encode(data).with_check().into_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EVM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Default)]
pub struct EvmAddressService;

impl EvmAddressService {
    pub fn address(&self, public_key: &[u8]) -> Result<String> {
        let key = k256::PublicKey::from_sec1_bytes(public_key)
            .map_err(|e| SdkError::InvalidPublicKey(e.to_string()))?;
        let point = k256::elliptic_curve::sec1::ToEncodedPoint::to_encoded_point(&key, false);
        let hash = Keccak256::digest(&point.as_bytes()[1..]);
        Ok(to_checksum_address(&hex::encode(&hash[12..])))
    }
}

/// EIP-55 校验和地址
pub fn to_checksum_address(hex_address: &str) -> String {
    let lower = hex_address
        .trim_start_matches("0x")
        .to_lowercase();
    let hash = hex::encode(Keccak256::digest(lower.as_bytes()));

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (c, h) in lower.chars().zip(hash.chars()) {
        if c.is_ascii_alphabetic() && h.to_digit(16).unwrap_or(0) >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

impl AddressService for EvmAddressService {
    fn make_addresses(&self, public_key: &[u8]) -> Result<Vec<Address>> {
        Ok(vec![Address::plain(self.address(public_key)?)])
    }

    fn validate(&self, address: &str) -> bool {
        let Some(body) = address.strip_prefix("0x") else {
            return false;
        };
        if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return false;
        }
        let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
        // 全小写或全大写不带校验和
        if has_upper && has_lower {
            return to_checksum_address(body) == address;
        }
        true
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cardano
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cardano 地址长度超过 BIP173 的 90 字符限制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardanoBech32 {}

impl Checksum for CardanoBech32 {
    type MidstateRepr = u32;
    const CODE_LENGTH: usize = 1023;
    const CHECKSUM_LENGTH: usize = 6;
    const GENERATOR_SH: [u32; 5] = [
        0x3b6a_57b2,
        0x2650_8e6d,
        0x1ea1_19fa,
        0x3d42_33dd,
        0x2a14_62b3,
    ];
    const TARGET_RESIDUE: u32 = 1;
}

#[derive(Debug, Clone)]
pub struct CardanoAddressService {
    is_testnet: bool,
}

impl CardanoAddressService {
    pub fn new(is_testnet: bool) -> Self {
        Self { is_testnet }
    }

    fn hrp_str(&self) -> &'static str {
        if self.is_testnet {
            "addr_test"
        } else {
            "addr"
        }
    }

    /// Shelley enterprise 地址（仅支付凭证）
    pub fn address(&self, public_key: &[u8]) -> Result<String> {
        // 扩展公钥为 公钥(32) + chain code(32)
        let key = match public_key.len() {
            32 => public_key,
            64 => &public_key[..32],
            n => return Err(SdkError::InvalidPublicKey(format!("ed25519 key length {n}"))),
        };
        let key_bytes: [u8; 32] = key
            .try_into()
            .map_err(|_| SdkError::InvalidPublicKey("ed25519 key".into()))?;
        ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| SdkError::InvalidPublicKey(e.to_string()))?;

        let mut hasher = Blake2bVar::new(28)
            .map_err(|e| SdkError::InvalidPublicKey(e.to_string()))?;
        hasher.update(&key_bytes);
        let mut key_hash = [0u8; 28];
        hasher
            .finalize_variable(&mut key_hash)
            .map_err(|e| SdkError::InvalidPublicKey(e.to_string()))?;

        // header: 类型 6 (enterprise) | 网络 id
        let header = 0x60 | u8::from(!self.is_testnet);
        let mut payload = Vec::with_capacity(29);
        payload.push(header);
        payload.extend_from_slice(&key_hash);

        let hrp = Hrp::parse(self.hrp_str()).map_err(|e| SdkError::InvalidAddress(e.to_string()))?;
        bech32::encode::<CardanoBech32>(hrp, &payload)
            .map_err(|e| SdkError::InvalidAddress(e.to_string()))
    }

    /// 解码地址得到原始字节（交易输出使用）
    pub fn decode(&self, address: &str) -> Result<Vec<u8>> {
        let checked = CheckedHrpstring::new::<CardanoBech32>(address)
            .map_err(|_| SdkError::InvalidAddress(address.to_string()))?;
        if checked.hrp().as_str() != self.hrp_str() {
            return Err(SdkError::InvalidAddress(address.to_string()));
        }
        let bytes: Vec<u8> = checked.byte_iter().collect();
        let network_id = bytes.first().map(|h| h & 0x0f);
        if network_id != Some(u8::from(!self.is_testnet)) {
            return Err(SdkError::InvalidAddress(address.to_string()));
        }
        Ok(bytes)
    }
}

impl AddressService for CardanoAddressService {
    fn make_addresses(&self, public_key: &[u8]) -> Result<Vec<Address>> {
        Ok(vec![Address::plain(self.address(public_key)?)])
    }

    fn validate(&self, address: &str) -> bool {
        self.decode(address).is_ok()
    }
}
