//! Cardano 交易构建
//!
//! 交易体为 CBOR map {0: inputs, 1: outputs, 2: fee, 3: ttl}，
//! 签名对象为交易体的 Blake2b-256。

use std::collections::BTreeMap;

use blake2::{
    digest::{Update, VariableOutput},
    Blake2bVar,
};
use ciborium::value::{Integer, Value};

use crate::{
    domain::{AmountType, FeeParameters, Transaction, UnspentOutput},
    error::{Result, SdkError},
    service::address_service::CardanoAddressService,
};

/// 线性手续费 a * size + b
pub const LINEAR_FEE_A: u64 = 44;
pub const LINEAR_FEE_B: u64 = 155_381;
pub const DEFAULT_TTL: u64 = 190_000_000;
/// 单个输出的最小 lovelace
pub const MIN_OUTPUT_LOVELACE: u64 = 1_000_000;
/// 携带原生资产的输出需要更多 lovelace
pub const MIN_TOKEN_OUTPUT_LOVELACE: u64 = 1_500_000;

const POLICY_ID_HEX_LEN: usize = 56;
// vkey 见证 + 外层数组的大致字节数
const WITNESS_OVERHEAD: usize = 110;

type AssetBundle = BTreeMap<String, BTreeMap<String, u64>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardanoTransactionPlan {
    pub body: Vec<u8>,
    pub fee: u64,
    pub change: u64,
    pub inputs: Vec<UnspentOutput>,
}

#[derive(Debug, Clone)]
pub struct CardanoTransactionBuilder {
    addresses: CardanoAddressService,
    ttl: u64,
}

impl CardanoTransactionBuilder {
    pub fn new(is_testnet: bool) -> Self {
        Self {
            addresses: CardanoAddressService::new(is_testnet),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn linear_fee(size: usize) -> u64 {
        LINEAR_FEE_A * size as u64 + LINEAR_FEE_B
    }

    /// 使用全部 UTXO 作为输入，剩余资产全部找零
    ///
    /// 手续费取线性费用与交易中已报价费用的较大者。
    pub fn plan(
        &self,
        transaction: &Transaction,
        unspent: &[UnspentOutput],
    ) -> Result<CardanoTransactionPlan> {
        if unspent.is_empty() {
            return Err(SdkError::InsufficientFunds);
        }

        let units = u64::try_from(transaction.amount.to_smallest_unit()?)
            .map_err(|_| SdkError::InvalidAmount(transaction.amount.value.to_string()))?;
        let destination = self.addresses.decode(&transaction.destination_address)?;
        let change_address = self.addresses.decode(
            transaction
                .change_address
                .as_deref()
                .unwrap_or(&transaction.source_address),
        )?;

        let (send_coin, send_assets) = match &transaction.amount.amount_type {
            AmountType::Coin => (units, AssetBundle::new()),
            AmountType::Token(token) => {
                let (policy, name) = split_asset_unit(&token.contract_address)?;
                let mut assets = AssetBundle::new();
                assets.entry(policy).or_default().insert(name, units);
                (MIN_TOKEN_OUTPUT_LOVELACE, assets)
            }
        };
        if send_coin < MIN_OUTPUT_LOVELACE {
            return Err(SdkError::InvalidAmount(format!(
                "{send_coin} lovelace is below the minimum output"
            )));
        }

        let total_coin: u64 = unspent.iter().map(|o| o.amount).sum();
        let mut change_assets = collect_assets(unspent);
        subtract_assets(&mut change_assets, &send_assets)?;

        let assemble = |fee: u64| -> Result<(Vec<u8>, u64, u64)> {
            let change = total_coin
                .checked_sub(send_coin + fee)
                .ok_or(SdkError::InsufficientFunds)?;
            let mut outputs = vec![output_value(&destination, send_coin, &send_assets)];
            let (fee, change) = if !change_assets.is_empty() {
                if change < MIN_TOKEN_OUTPUT_LOVELACE {
                    return Err(SdkError::InsufficientFunds);
                }
                outputs.push(output_value(&change_address, change, &change_assets));
                (fee, change)
            } else if change >= MIN_OUTPUT_LOVELACE {
                outputs.push(output_value(&change_address, change, &change_assets));
                (fee, change)
            } else {
                // 找零不足最小输出时并入手续费
                (fee + change, 0)
            };
            let body = encode(&self.body_value(unspent, outputs, fee)?)?;
            Ok((body, fee, change))
        };

        let quoted = match transaction.fee.parameters {
            Some(FeeParameters::Cardano { fee }) => fee,
            _ => 0,
        };
        let fee_for = |body: &[u8]| Self::linear_fee(body.len() + WITNESS_OVERHEAD).max(quoted);

        // 费用依赖交易大小，迭代两次收敛
        let (draft, _, _) = assemble(quoted)?;
        let (draft, _, _) = assemble(fee_for(&draft))?;
        let (body, fee, change) = assemble(fee_for(&draft))?;

        tracing::debug!(
            inputs = unspent.len(),
            fee = fee,
            change = change,
            size = body.len(),
            "cardano_transaction_planned"
        );

        Ok(CardanoTransactionPlan {
            body,
            fee,
            change,
            inputs: unspent.to_vec(),
        })
    }

    /// Blake2b-256(body)
    pub fn body_hash(&self, plan: &CardanoTransactionPlan) -> Result<[u8; 32]> {
        let mut hasher =
            Blake2bVar::new(32).map_err(|e| SdkError::Signer(e.to_string()))?;
        hasher.update(&plan.body);
        let mut hash = [0u8; 32];
        hasher
            .finalize_variable(&mut hash)
            .map_err(|e| SdkError::Signer(e.to_string()))?;
        Ok(hash)
    }

    /// [body, {0: [[vkey, signature]]}, true, null]
    pub fn encode_signed(
        &self,
        plan: &CardanoTransactionPlan,
        public_key: &[u8],
        signature: &[u8],
    ) -> Result<Vec<u8>> {
        let vkey = public_key
            .get(..32)
            .ok_or_else(|| SdkError::InvalidPublicKey("ed25519 key too short".into()))?;
        if signature.len() != 64 {
            return Err(SdkError::Signer(format!(
                "expected 64-byte ed25519 signature, got {}",
                signature.len()
            )));
        }

        let body: Value = ciborium::de::from_reader(plan.body.as_slice())
            .map_err(|e| SdkError::decoding("cardano transaction body", &e.to_string()))?;
        let witness_set = Value::Map(vec![(
            uint(0),
            Value::Array(vec![Value::Array(vec![
                Value::Bytes(vkey.to_vec()),
                Value::Bytes(signature.to_vec()),
            ])]),
        )]);

        encode(&Value::Array(vec![
            body,
            witness_set,
            Value::Bool(true),
            Value::Null,
        ]))
    }

    fn body_value(&self, inputs: &[UnspentOutput], outputs: Vec<Value>, fee: u64) -> Result<Value> {
        let inputs = inputs
            .iter()
            .map(|input| {
                let hash = hex::decode(&input.transaction_hash)
                    .map_err(|_| SdkError::decoding("cardano input hash", &input.transaction_hash))?;
                Ok(Value::Array(vec![
                    Value::Bytes(hash),
                    uint(u64::from(input.output_index)),
                ]))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Value::Map(vec![
            (uint(0), Value::Array(inputs)),
            (uint(1), Value::Array(outputs)),
            (uint(2), uint(fee)),
            (uint(3), uint(self.ttl)),
        ]))
    }
}

/// `policyId(56 hex) + assetNameHex`
fn split_asset_unit(unit: &str) -> Result<(String, String)> {
    if unit.len() < POLICY_ID_HEX_LEN || hex::decode(unit).is_err() {
        return Err(SdkError::InvalidAmount(format!("invalid asset unit {unit}")));
    }
    let (policy, name) = unit.split_at(POLICY_ID_HEX_LEN);
    Ok((policy.to_lowercase(), name.to_lowercase()))
}

fn collect_assets(outputs: &[UnspentOutput]) -> AssetBundle {
    let mut bundle = AssetBundle::new();
    for asset in outputs.iter().flat_map(|o| &o.assets) {
        *bundle
            .entry(asset.policy_id.to_lowercase())
            .or_default()
            .entry(asset.asset_name_hex.to_lowercase())
            .or_default() += asset.amount;
    }
    bundle
}

fn subtract_assets(total: &mut AssetBundle, spent: &AssetBundle) -> Result<()> {
    for (policy, names) in spent {
        let available = total.get_mut(policy).ok_or(SdkError::InsufficientFunds)?;
        for (name, amount) in names {
            let left = available
                .get(name)
                .and_then(|have| have.checked_sub(*amount))
                .ok_or(SdkError::InsufficientFunds)?;
            if left == 0 {
                available.remove(name);
            } else {
                available.insert(name.clone(), left);
            }
        }
        if available.is_empty() {
            total.remove(policy);
        }
    }
    Ok(())
}

fn output_value(address: &[u8], coin: u64, assets: &AssetBundle) -> Value {
    let amount = if assets.is_empty() {
        uint(coin)
    } else {
        let multiasset = assets
            .iter()
            .map(|(policy, names)| {
                let names = names
                    .iter()
                    .map(|(name, amount)| {
                        (Value::Bytes(hex::decode(name).unwrap_or_default()), uint(*amount))
                    })
                    .collect();
                (
                    Value::Bytes(hex::decode(policy).unwrap_or_default()),
                    Value::Map(names),
                )
            })
            .collect();
        Value::Array(vec![uint(coin), Value::Map(multiasset)])
    };
    Value::Array(vec![Value::Bytes(address.to_vec()), amount])
}

fn uint(value: u64) -> Value {
    Value::Integer(Integer::from(value))
}

fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| SdkError::InvalidAmount(format!("cbor encoding failed: {e}")))?;
    Ok(bytes)
}
