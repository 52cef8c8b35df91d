//! UTXO 交易构建
//!
//! 最大优先选币；P2PKH 输入走传统 sighash，P2WPKH 输入与 FORKID 链走 BIP143。

use sha2::{Digest, Sha256};

use crate::{
    domain::{AmountType, FeeParameters, NetworkParams, Transaction, UnspentOutput},
    error::{Result, SdkError},
    service::address_service::{p2pkh_script, UtxoAddressService},
};

const TX_VERSION: u32 = 1;
const SEQUENCE_FINAL: u32 = 0xffff_ffff;
const LOCK_TIME: u32 = 0;
const SIGHASH_FORKID: u32 = 0x40;
const OP_PUSHDATA1: u8 = 0x4c;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    P2pkh,
    P2wpkh,
}

impl InputKind {
    fn classify(script: &[u8]) -> Option<Self> {
        match script {
            [0x76, 0xa9, 0x14, .., 0x88, 0xac] if script.len() == 25 => Some(Self::P2pkh),
            [0x00, 0x14, ..] if script.len() == 22 => Some(Self::P2wpkh),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedInput {
    pub output: UnspentOutput,
    pub locking_script: Vec<u8>,
    pub kind: InputKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOutput {
    pub value: u64,
    pub script: Vec<u8>,
}

/// 选币结果，签名前后都不再改变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoTransactionPlan {
    pub inputs: Vec<PlannedInput>,
    pub outputs: Vec<PlannedOutput>,
    pub fee: u64,
    pub change: u64,
}

impl UtxoTransactionPlan {
    fn has_witness(&self) -> bool {
        self.inputs.iter().any(|i| i.kind == InputKind::P2wpkh)
    }
}

#[derive(Debug, Clone)]
pub struct UtxoTransactionBuilder {
    addresses: UtxoAddressService,
}

impl UtxoTransactionBuilder {
    pub fn new(params: NetworkParams) -> Self {
        Self {
            addresses: UtxoAddressService::new(params),
        }
    }

    fn params(&self) -> &NetworkParams {
        self.addresses.params()
    }

    /// 按 P2PKH 估算的交易字节数
    pub fn estimate_size(inputs: usize, outputs: usize) -> u64 {
        (10 + 148 * inputs + 34 * outputs) as u64
    }

    pub fn plan(
        &self,
        transaction: &Transaction,
        unspent: &[UnspentOutput],
    ) -> Result<UtxoTransactionPlan> {
        if !matches!(transaction.amount.amount_type, AmountType::Coin) {
            return Err(SdkError::InvalidAmount(
                "utxo chains only transfer the native coin".into(),
            ));
        }
        let rate = match transaction.fee.parameters {
            Some(FeeParameters::Utxo { rate_per_byte }) => rate_per_byte,
            _ => return Err(SdkError::NoFeeAvailable),
        };
        let amount = u64::try_from(transaction.amount.to_smallest_unit()?)
            .map_err(|_| SdkError::InvalidAmount(transaction.amount.value.to_string()))?;
        let dust = self.params().dust_threshold;
        if amount < dust {
            return Err(SdkError::InvalidAmount(format!(
                "{amount} is below dust threshold {dust}"
            )));
        }

        let destination = self.addresses.locking_script(&transaction.destination_address)?;
        let change_address = transaction
            .change_address
            .as_deref()
            .unwrap_or(&transaction.source_address);
        let change_script = self.addresses.locking_script(change_address)?;

        let mut candidates: Vec<&UnspentOutput> = unspent.iter().collect();
        candidates.sort_by(|a, b| b.amount.cmp(&a.amount));

        let mut selected = Vec::new();
        let mut total: u64 = 0;
        for output in candidates {
            selected.push(output);
            total = total.saturating_add(output.amount);
            let fee = rate.saturating_mul(Self::estimate_size(selected.len(), 2));
            if total >= amount.saturating_add(fee) {
                break;
            }
        }

        let fee_with_change = rate.saturating_mul(Self::estimate_size(selected.len(), 2));
        let fee_without_change = rate.saturating_mul(Self::estimate_size(selected.len(), 1));

        let mut outputs = vec![PlannedOutput {
            value: amount,
            script: destination,
        }];
        let (fee, change) = match total.checked_sub(amount.saturating_add(fee_with_change)) {
            Some(change) if change > dust => {
                outputs.push(PlannedOutput {
                    value: change,
                    script: change_script,
                });
                (fee_with_change, change)
            }
            // 找零低于粉尘线时并入手续费
            _ if total >= amount.saturating_add(fee_without_change) => (total - amount, 0),
            _ => return Err(SdkError::InsufficientFunds),
        };

        let inputs = selected
            .into_iter()
            .map(|output| {
                let locking_script = self.addresses.locking_script(&output.address)?;
                let kind = InputKind::classify(&locking_script).ok_or_else(|| {
                    SdkError::InvalidAddress(format!("unsupported input script: {}", output.address))
                })?;
                Ok(PlannedInput {
                    output: output.clone(),
                    locking_script,
                    kind,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            inputs = inputs.len(),
            outputs = outputs.len(),
            fee = fee,
            change = change,
            "utxo_transaction_planned"
        );

        Ok(UtxoTransactionPlan {
            inputs,
            outputs,
            fee,
            change,
        })
    }

    /// 每个输入一个待签名摘要
    pub fn signing_hashes(&self, plan: &UtxoTransactionPlan) -> Result<Vec<[u8; 32]>> {
        let hash_type = self.params().sign_hash_type;
        let forkid = hash_type & SIGHASH_FORKID != 0;

        (0..plan.inputs.len())
            .map(|index| {
                let input = &plan.inputs[index];
                match input.kind {
                    InputKind::P2wpkh => {
                        let mut hash = [0u8; 20];
                        hash.copy_from_slice(&input.locking_script[2..22]);
                        bip143_hash(plan, index, &p2pkh_script(&hash), hash_type)
                    }
                    InputKind::P2pkh if forkid => {
                        bip143_hash(plan, index, &input.locking_script, hash_type)
                    }
                    InputKind::P2pkh => legacy_hash(plan, index, hash_type),
                }
            })
            .collect()
    }

    /// 用签名器返回的紧凑签名（64 字节，可带恢复位）组装最终交易
    pub fn encode_signed(
        &self,
        plan: &UtxoTransactionPlan,
        public_key: &[u8],
        signatures: &[Vec<u8>],
    ) -> Result<Vec<u8>> {
        if signatures.len() != plan.inputs.len() {
            return Err(SdkError::Signer(format!(
                "expected {} signatures, got {}",
                plan.inputs.len(),
                signatures.len()
            )));
        }

        let legacy_key = self.addresses.prepare_public_key(public_key)?;
        let compressed_key = secp256k1::PublicKey::from_slice(public_key)
            .map_err(|e| SdkError::InvalidPublicKey(e.to_string()))?
            .serialize();
        let hash_type_byte = (self.params().sign_hash_type & 0xff) as u8;

        let mut script_sigs = Vec::with_capacity(plan.inputs.len());
        let mut witnesses = Vec::with_capacity(plan.inputs.len());
        for (input, signature) in plan.inputs.iter().zip(signatures) {
            let mut sig = der_signature(signature)?;
            sig.push(hash_type_byte);

            match input.kind {
                InputKind::P2pkh => {
                    let mut script = Vec::new();
                    push_data(&mut script, &sig);
                    push_data(&mut script, &legacy_key);
                    script_sigs.push(script);
                    witnesses.push(Vec::new());
                }
                InputKind::P2wpkh => {
                    script_sigs.push(Vec::new());
                    witnesses.push(vec![sig, compressed_key.to_vec()]);
                }
            }
        }

        let witnesses = plan.has_witness().then_some(witnesses.as_slice());
        serialize(plan, &script_sigs, witnesses)
    }
}

/// 紧凑签名 -> low-S DER
pub fn der_signature(signature: &[u8]) -> Result<Vec<u8>> {
    let compact = signature
        .get(..64)
        .ok_or_else(|| SdkError::Signer(format!("signature too short: {}", signature.len())))?;
    let mut sig = secp256k1::ecdsa::Signature::from_compact(compact)
        .map_err(|e| SdkError::Signer(e.to_string()))?;
    sig.normalize_s();
    Ok(sig.serialize_der().to_vec())
}

fn legacy_hash(plan: &UtxoTransactionPlan, index: usize, hash_type: u32) -> Result<[u8; 32]> {
    let scripts: Vec<Vec<u8>> = plan
        .inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            if i == index {
                input.locking_script.clone()
            } else {
                Vec::new()
            }
        })
        .collect();

    let mut preimage = serialize(plan, &scripts, None)?;
    preimage.extend_from_slice(&hash_type.to_le_bytes());
    Ok(double_sha256(&preimage))
}

fn bip143_hash(
    plan: &UtxoTransactionPlan,
    index: usize,
    script_code: &[u8],
    hash_type: u32,
) -> Result<[u8; 32]> {
    let mut prevouts = Vec::new();
    let mut sequences = Vec::new();
    for input in &plan.inputs {
        write_outpoint(&mut prevouts, &input.output)?;
        sequences.extend_from_slice(&SEQUENCE_FINAL.to_le_bytes());
    }
    let mut outputs = Vec::new();
    for output in &plan.outputs {
        write_output(&mut outputs, output);
    }

    let input = &plan.inputs[index];
    let mut preimage = Vec::new();
    preimage.extend_from_slice(&TX_VERSION.to_le_bytes());
    preimage.extend_from_slice(&double_sha256(&prevouts));
    preimage.extend_from_slice(&double_sha256(&sequences));
    write_outpoint(&mut preimage, &input.output)?;
    write_var_bytes(&mut preimage, script_code);
    preimage.extend_from_slice(&input.output.amount.to_le_bytes());
    preimage.extend_from_slice(&SEQUENCE_FINAL.to_le_bytes());
    preimage.extend_from_slice(&double_sha256(&outputs));
    preimage.extend_from_slice(&LOCK_TIME.to_le_bytes());
    preimage.extend_from_slice(&hash_type.to_le_bytes());
    Ok(double_sha256(&preimage))
}

fn serialize(
    plan: &UtxoTransactionPlan,
    script_sigs: &[Vec<u8>],
    witnesses: Option<&[Vec<Vec<u8>>]>,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(&TX_VERSION.to_le_bytes());
    if witnesses.is_some() {
        // marker + flag
        out.extend_from_slice(&[0x00, 0x01]);
    }

    write_compact_size(&mut out, plan.inputs.len() as u64);
    for (input, script) in plan.inputs.iter().zip(script_sigs) {
        write_outpoint(&mut out, &input.output)?;
        write_var_bytes(&mut out, script);
        out.extend_from_slice(&SEQUENCE_FINAL.to_le_bytes());
    }

    write_compact_size(&mut out, plan.outputs.len() as u64);
    for output in &plan.outputs {
        write_output(&mut out, output);
    }

    if let Some(witnesses) = witnesses {
        for items in witnesses {
            write_compact_size(&mut out, items.len() as u64);
            for item in items {
                write_var_bytes(&mut out, item);
            }
        }
    }

    out.extend_from_slice(&LOCK_TIME.to_le_bytes());
    Ok(out)
}

fn write_outpoint(out: &mut Vec<u8>, output: &UnspentOutput) -> Result<()> {
    let mut hash = hex::decode(&output.transaction_hash)
        .ok()
        .filter(|h| h.len() == 32)
        .ok_or_else(|| SdkError::decoding("utxo transaction hash", &output.transaction_hash))?;
    // 交易哈希按小端序写入
    hash.reverse();
    out.extend_from_slice(&hash);
    out.extend_from_slice(&output.output_index.to_le_bytes());
    Ok(())
}

fn write_output(out: &mut Vec<u8>, output: &PlannedOutput) {
    out.extend_from_slice(&output.value.to_le_bytes());
    write_var_bytes(out, &output.script);
}

fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    if data.len() < OP_PUSHDATA1 as usize {
        script.push(data.len() as u8);
    } else {
        script.push(OP_PUSHDATA1);
        script.push(data.len() as u8);
    }
    script.extend_from_slice(data);
}

fn double_sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

#[cfg(test)]
mod tests {
    use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};

    use super::*;
    use crate::domain::{Amount, Blockchain, Fee};

    const HASH_A: &str = "a1075db55d416d3ca199f55b6084e2115b9345e16c5cf302fc80e9d5fbf5d48d";
    const HASH_B: &str = "b1075db55d416d3ca199f55b6084e2115b9345e16c5cf302fc80e9d5fbf5d48d";
    const HASH_C: &str = "c1075db55d416d3ca199f55b6084e2115b9345e16c5cf302fc80e9d5fbf5d48d";

    fn secret() -> SecretKey {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        SecretKey::from_slice(&bytes).unwrap()
    }

    fn public_key() -> Vec<u8> {
        PublicKey::from_secret_key(&Secp256k1::new(), &secret())
            .serialize()
            .to_vec()
    }

    fn builder(chain: Blockchain) -> UtxoTransactionBuilder {
        UtxoTransactionBuilder::new(NetworkParams::for_chain(chain).unwrap())
    }

    fn legacy_address(chain: Blockchain) -> String {
        UtxoAddressService::new(NetworkParams::for_chain(chain).unwrap())
            .address(&public_key())
            .unwrap()
            .value
    }

    fn output(address: &str, hash: &str, amount: u64) -> UnspentOutput {
        UnspentOutput {
            address: address.to_string(),
            amount,
            output_index: 0,
            transaction_hash: hash.to_string(),
            assets: vec![],
        }
    }

    fn transaction(chain: Blockchain, source: &str, sats: u64, rate: u64) -> Transaction {
        Transaction {
            amount: Amount::coin_from_units(chain, u128::from(sats)).unwrap(),
            fee: Fee::new(
                Amount::zero_coin(chain),
                FeeParameters::Utxo {
                    rate_per_byte: rate,
                },
            ),
            source_address: source.to_string(),
            destination_address: "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH".to_string(),
            change_address: None,
        }
    }

    fn sign_all(hashes: &[[u8; 32]]) -> Vec<Vec<u8>> {
        let secp = Secp256k1::new();
        hashes
            .iter()
            .map(|h| {
                secp.sign_ecdsa(&Message::from_digest(*h), &secret())
                    .serialize_compact()
                    .to_vec()
            })
            .collect()
    }

    #[test]
    fn test_size_estimate() {
        assert_eq!(UtxoTransactionBuilder::estimate_size(1, 2), 226);
    }

    #[test]
    fn test_largest_first_selection_with_change() {
        let chain = Blockchain::Bitcoin(false);
        let source = legacy_address(chain);
        let utxos = vec![
            output(&source, HASH_A, 10_000),
            output(&source, HASH_B, 200_000),
            output(&source, HASH_C, 50_000),
        ];

        let plan = builder(chain)
            .plan(&transaction(chain, &source, 100_000, 1), &utxos)
            .unwrap();
        assert_eq!(plan.inputs.len(), 1);
        assert_eq!(plan.inputs[0].output.transaction_hash, HASH_B);
        assert_eq!(plan.fee, 226);
        assert_eq!(plan.change, 200_000 - 100_000 - 226);
        assert_eq!(plan.outputs.len(), 2);
        assert_eq!(plan.outputs[1].script, plan.inputs[0].locking_script);
    }

    #[test]
    fn test_change_below_dust_is_absorbed_into_fee() {
        let chain = Blockchain::Bitcoin(false);
        let source = legacy_address(chain);
        let plan = builder(chain)
            .plan(
                &transaction(chain, &source, 100_000, 1),
                &[output(&source, HASH_A, 100_500)],
            )
            .unwrap();
        assert_eq!(plan.outputs.len(), 1);
        assert_eq!(plan.fee, 500);
        assert_eq!(plan.change, 0);
    }

    #[test]
    fn test_insufficient_funds_and_dust_amount() {
        let chain = Blockchain::Bitcoin(false);
        let source = legacy_address(chain);
        let utxos = [output(&source, HASH_A, 1_000)];

        assert!(matches!(
            builder(chain).plan(&transaction(chain, &source, 100_000, 1), &utxos),
            Err(SdkError::InsufficientFunds)
        ));
        assert!(matches!(
            builder(chain).plan(&transaction(chain, &source, 100, 1), &utxos),
            Err(SdkError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_missing_fee_parameters() {
        let chain = Blockchain::Bitcoin(false);
        let source = legacy_address(chain);
        let mut tx = transaction(chain, &source, 100_000, 1);
        tx.fee.parameters = None;
        assert!(matches!(
            builder(chain).plan(&tx, &[output(&source, HASH_A, 1_000_000)]),
            Err(SdkError::NoFeeAvailable)
        ));
    }

    #[test]
    fn test_der_signature_verifies() {
        let secp = Secp256k1::new();
        let digest = [7u8; 32];
        let compact = sign_all(&[digest]).remove(0);

        let der = der_signature(&compact).unwrap();
        assert_eq!(der[0], 0x30);
        let parsed = Signature::from_der(&der).unwrap();
        let key = PublicKey::from_slice(&public_key()).unwrap();
        assert!(secp
            .verify_ecdsa(&Message::from_digest(digest), &parsed, &key)
            .is_ok());
    }

    #[test]
    fn test_signed_p2pkh_layout() {
        let chain = Blockchain::Bitcoin(false);
        let source = legacy_address(chain);
        let builder = builder(chain);
        let plan = builder
            .plan(
                &transaction(chain, &source, 100_000, 2),
                &[output(&source, HASH_A, 80_000), output(&source, HASH_B, 80_000)],
            )
            .unwrap();
        assert_eq!(plan.inputs.len(), 2);

        let hashes = builder.signing_hashes(&plan).unwrap();
        assert_eq!(hashes.len(), 2);
        assert_ne!(hashes[0], hashes[1]);

        let raw = builder
            .encode_signed(&plan, &public_key(), &sign_all(&hashes))
            .unwrap();
        assert_eq!(raw[..4], [1, 0, 0, 0]);
        // 无隔离见证标记，紧跟输入数量
        assert_eq!(raw[4], 2);
        assert_eq!(raw[raw.len() - 4..], [0, 0, 0, 0]);
        let key_hex = hex::encode(public_key());
        assert_eq!(hex::encode(&raw).matches(&key_hex).count(), 2);
    }

    #[test]
    fn test_signed_p2wpkh_has_witness() {
        let chain = Blockchain::Bitcoin(false);
        let source = UtxoAddressService::new(NetworkParams::for_chain(chain).unwrap())
            .segwit_address(&public_key())
            .unwrap()
            .value;
        let builder = builder(chain);
        let plan = builder
            .plan(
                &transaction(chain, &source, 100_000, 1),
                &[output(&source, HASH_A, 150_000)],
            )
            .unwrap();
        assert_eq!(plan.inputs[0].kind, InputKind::P2wpkh);

        let hashes = builder.signing_hashes(&plan).unwrap();
        let raw = builder
            .encode_signed(&plan, &public_key(), &sign_all(&hashes))
            .unwrap();
        assert_eq!(raw[4..6], [0x00, 0x01]);
    }

    #[test]
    fn test_forkid_chain_uses_bip143_digest() {
        let source = legacy_address(Blockchain::Bitcoin(false));
        let utxos = [output(&source, HASH_A, 150_000)];
        let tx = transaction(Blockchain::Bitcoin(false), &source, 100_000, 1);

        let btc = builder(Blockchain::Bitcoin(false));
        let bch = builder(Blockchain::BitcoinCash);
        let btc_plan = btc.plan(&tx, &utxos).unwrap();
        let bch_plan = bch.plan(&tx, &utxos).unwrap();
        assert_eq!(btc_plan, bch_plan);
        assert_ne!(
            btc.signing_hashes(&btc_plan).unwrap(),
            bch.signing_hashes(&bch_plan).unwrap()
        );
    }

    #[test]
    fn test_signature_count_mismatch() {
        let chain = Blockchain::Bitcoin(false);
        let source = legacy_address(chain);
        let builder = builder(chain);
        let plan = builder
            .plan(
                &transaction(chain, &source, 100_000, 1),
                &[output(&source, HASH_A, 150_000)],
            )
            .unwrap();
        assert!(matches!(
            builder.encode_signed(&plan, &public_key(), &[]),
            Err(SdkError::Signer(_))
        ));
    }
}
