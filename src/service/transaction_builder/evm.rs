//! EVM 交易构建（EIP-155 legacy 与 EIP-1559 type 2）

use ethers::{
    abi::{self, Token as AbiToken},
    types::{H160, U256},
};
use rlp::RlpStream;
use sha3::{Digest, Keccak256};

use crate::{
    domain::{Amount, AmountType, Blockchain, FeeParameters, Transaction},
    error::{Result, SdkError},
    service::network::json_rpc::decode_evm_address,
};

/// `transfer(address,uint256)`
pub const ERC20_TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

const EIP1559_TX_TYPE: u8 = 0x02;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmTransactionInput {
    pub nonce: u64,
    pub to: [u8; 20],
    pub value: u128,
    pub data: Vec<u8>,
    pub fee: FeeParameters,
}

#[derive(Debug, Clone, Copy)]
pub struct EvmTransactionBuilder {
    chain_id: u64,
}

impl EvmTransactionBuilder {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    pub fn for_chain(chain: Blockchain) -> Result<Self> {
        chain
            .chain_id()
            .map(Self::new)
            .ok_or_else(|| SdkError::UnsupportedChain(chain.to_string()))
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// 钱包交易 -> 构建输入；代币转账改为调用合约
    pub fn build_input(&self, transaction: &Transaction, nonce: u64) -> Result<EvmTransactionInput> {
        let fee = transaction
            .fee
            .parameters
            .clone()
            .ok_or(SdkError::NoFeeAvailable)?;
        let (to, value, data) =
            transfer_call(&transaction.amount, &transaction.destination_address)?;

        Ok(EvmTransactionInput {
            nonce,
            to,
            value,
            data,
            fee,
        })
    }

    /// 未签名载荷（legacy 带 EIP-155 的 chainId, 0, 0）
    pub fn encode_unsigned(&self, input: &EvmTransactionInput) -> Result<Vec<u8>> {
        match &input.fee {
            FeeParameters::EthereumLegacy {
                gas_limit,
                gas_price,
            } => {
                let mut stream = RlpStream::new_list(9);
                stream.append(&input.nonce);
                stream.append(&be_trimmed(*gas_price));
                stream.append(gas_limit);
                stream.append(&input.to.to_vec());
                stream.append(&be_trimmed(input.value));
                stream.append(&input.data);
                stream.append(&self.chain_id);
                stream.append(&0u8);
                stream.append(&0u8);
                Ok(stream.out().to_vec())
            }
            FeeParameters::EthereumEip1559 { .. } => {
                let mut stream = RlpStream::new_list(9);
                self.append_eip1559_fields(&mut stream, input)?;
                Ok(typed_payload(stream))
            }
            other => Err(SdkError::InvalidAmount(format!(
                "unexpected fee parameters for evm: {other:?}"
            ))),
        }
    }

    /// Keccak-256 签名摘要
    pub fn signing_hash(&self, input: &EvmTransactionInput) -> Result<[u8; 32]> {
        let unsigned = self.encode_unsigned(input)?;
        Ok(Keccak256::digest(&unsigned).into())
    }

    /// 用 65 字节签名 (r || s || v) 组装最终交易
    pub fn encode_signed(&self, input: &EvmTransactionInput, signature: &[u8]) -> Result<Vec<u8>> {
        if signature.len() != 65 {
            return Err(SdkError::Signer(format!(
                "expected 65-byte signature, got {}",
                signature.len()
            )));
        }
        let r = trim_leading_zeros(&signature[..32]);
        let s = trim_leading_zeros(&signature[32..64]);
        let recovery_id = match signature[64] {
            v @ (0 | 1) => u64::from(v),
            v @ (27 | 28) => u64::from(v - 27),
            v => return Err(SdkError::Signer(format!("invalid recovery id {v}"))),
        };

        match &input.fee {
            FeeParameters::EthereumLegacy {
                gas_limit,
                gas_price,
            } => {
                let v = recovery_id + self.chain_id * 2 + 35;
                let mut stream = RlpStream::new_list(9);
                stream.append(&input.nonce);
                stream.append(&be_trimmed(*gas_price));
                stream.append(gas_limit);
                stream.append(&input.to.to_vec());
                stream.append(&be_trimmed(input.value));
                stream.append(&input.data);
                stream.append(&v);
                stream.append(&r);
                stream.append(&s);
                Ok(stream.out().to_vec())
            }
            FeeParameters::EthereumEip1559 { .. } => {
                let mut stream = RlpStream::new_list(12);
                self.append_eip1559_fields(&mut stream, input)?;
                stream.append(&recovery_id);
                stream.append(&r);
                stream.append(&s);
                Ok(typed_payload(stream))
            }
            other => Err(SdkError::InvalidAmount(format!(
                "unexpected fee parameters for evm: {other:?}"
            ))),
        }
    }

    /// 提交给 L1 费用预言机的未签名交易，nonce 固定为 1
    pub fn encode_for_l1_fee(&self, input: &EvmTransactionInput) -> Result<Vec<u8>> {
        let dummy = EvmTransactionInput {
            nonce: 1,
            ..input.clone()
        };
        self.encode_unsigned(&dummy)
    }

    fn append_eip1559_fields(
        &self,
        stream: &mut RlpStream,
        input: &EvmTransactionInput,
    ) -> Result<()> {
        let FeeParameters::EthereumEip1559 {
            gas_limit,
            max_fee_per_gas,
            priority_fee,
        } = &input.fee
        else {
            return Err(SdkError::InvalidAmount("expected eip-1559 fee".into()));
        };

        stream.append(&self.chain_id);
        stream.append(&input.nonce);
        stream.append(&be_trimmed(*priority_fee));
        stream.append(&be_trimmed(*max_fee_per_gas));
        stream.append(gas_limit);
        stream.append(&input.to.to_vec());
        stream.append(&be_trimmed(input.value));
        stream.append(&input.data);
        // access list
        stream.begin_list(0);
        Ok(())
    }
}

/// 转账的实际调用目标：(to, value, data)
pub fn transfer_call(amount: &Amount, destination: &str) -> Result<([u8; 20], u128, Vec<u8>)> {
    let units = amount.to_smallest_unit()?;
    match &amount.amount_type {
        AmountType::Coin => Ok((decode_evm_address(destination)?, units, Vec::new())),
        AmountType::Token(token) => Ok((
            decode_evm_address(&token.contract_address)?,
            0,
            erc20_transfer_data(destination, units)?,
        )),
    }
}

/// ERC-20 `transfer(to, amount)` 调用数据
pub fn erc20_transfer_data(to: &str, amount: u128) -> Result<Vec<u8>> {
    let to = H160::from(decode_evm_address(to)?);
    let mut data = ERC20_TRANSFER_SELECTOR.to_vec();
    data.extend(abi::encode(&[
        AbiToken::Address(to),
        AbiToken::Uint(U256::from(amount)),
    ]));
    Ok(data)
}

fn typed_payload(stream: RlpStream) -> Vec<u8> {
    let body = stream.out();
    let mut payload = Vec::with_capacity(body.len() + 1);
    payload.push(EIP1559_TX_TYPE);
    payload.extend_from_slice(&body);
    payload
}

/// RLP 整数：大端、去掉前导零
fn be_trimmed(value: u128) -> Vec<u8> {
    trim_leading_zeros(&value.to_be_bytes())
}

fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}
