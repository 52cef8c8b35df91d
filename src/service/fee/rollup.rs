//! Optimistic rollup 费用：L2 执行费 + L1 数据费
//!
//! L1 部分只影响展示金额，签名参数始终来自 L2 估算。
//! 预言机读取、换算或累加任一环节失败时 L1 部分按 0 计。

use std::sync::Arc;

use async_trait::async_trait;
use ethers::{
    abi::{self, ParamType, Token as AbiToken},
    types::U256,
};

use super::{scale_units, FeeEstimator, FeeRequest};
use crate::{
    domain::{Amount, Blockchain, Fee, Transaction},
    error::{Result, SdkError},
    service::{network::JsonRpcClient, transaction_builder::EvmTransactionBuilder},
};

#[async_trait]
pub trait L1FeeOracle: Send + Sync {
    /// 未签名交易字节对应的 L1 数据费（wei）
    async fn l1_fee(&self, transaction: &[u8]) -> Result<u128>;
}

/// OP Stack GasPriceOracle 预编译合约
pub struct ContractL1FeeOracle {
    node: Arc<JsonRpcClient>,
    address: String,
}

impl ContractL1FeeOracle {
    pub fn new(node: Arc<JsonRpcClient>, address: impl Into<String>) -> Self {
        Self {
            node,
            address: address.into(),
        }
    }

    pub async fn l1_gas_used(&self, transaction: &[u8]) -> Result<u128> {
        self.call_uint(
            "getL1GasUsed(bytes)",
            &[AbiToken::Bytes(transaction.to_vec())],
        )
        .await
    }

    pub async fn l1_base_fee(&self) -> Result<u128> {
        self.call_uint("l1BaseFee()", &[]).await
    }

    async fn call_uint(&self, signature: &str, args: &[AbiToken]) -> Result<u128> {
        let mut data = ethers::utils::id(signature).to_vec();
        data.extend(abi::encode(args));

        let result = self.node.eth_call(&self.address, &data).await?;
        let value = abi::decode(&[ParamType::Uint(256)], &result)
            .ok()
            .and_then(|tokens| tokens.into_iter().next())
            .and_then(AbiToken::into_uint)
            .ok_or_else(|| SdkError::decoding(signature, &hex::encode(&result)))?;

        if value > U256::from(u128::MAX) {
            return Err(SdkError::decoding(signature, &value.to_string()));
        }
        Ok(value.as_u128())
    }
}

#[async_trait]
impl L1FeeOracle for ContractL1FeeOracle {
    async fn l1_fee(&self, transaction: &[u8]) -> Result<u128> {
        self.call_uint("getL1Fee(bytes)", &[AbiToken::Bytes(transaction.to_vec())])
            .await
    }
}

/// 在任意 EVM 估算器之上叠加 L1 数据费
pub struct OptimisticRollupFeeEstimator {
    chain: Blockchain,
    inner: Arc<dyn FeeEstimator>,
    oracle: Arc<dyn L1FeeOracle>,
    builder: EvmTransactionBuilder,
    multiplier: f64,
}

impl OptimisticRollupFeeEstimator {
    pub fn new(
        chain: Blockchain,
        inner: Arc<dyn FeeEstimator>,
        oracle: Arc<dyn L1FeeOracle>,
        multiplier: f64,
    ) -> Result<Self> {
        Ok(Self {
            chain,
            inner,
            oracle,
            builder: EvmTransactionBuilder::for_chain(chain)?,
            multiplier,
        })
    }

    /// 用第一档 L2 参数构建 nonce = 1 的未签名交易并询问预言机
    async fn l1_fee(&self, request: &FeeRequest, recommended: &Fee) -> Result<Amount> {
        let dummy = Transaction {
            amount: request.amount.clone(),
            fee: recommended.clone(),
            source_address: request.source.clone(),
            destination_address: request.destination.clone(),
            change_address: None,
        };
        let input = self.builder.build_input(&dummy, 1)?;
        let payload = self.builder.encode_for_l1_fee(&input)?;
        let units = self.oracle.l1_fee(&payload).await?;
        Amount::coin_from_units(self.chain, scale_units(units, self.multiplier))
    }

    fn with_l1(fees: &[Fee], l1_amount: &Amount) -> Result<Vec<Fee>> {
        fees.iter()
            .map(|fee| {
                Ok(Fee {
                    amount: fee.amount.checked_add(l1_amount)?,
                    parameters: fee.parameters.clone(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl FeeEstimator for OptimisticRollupFeeEstimator {
    async fn estimate(&self, request: &FeeRequest) -> Result<Vec<Fee>> {
        let l2_fees = self.inner.estimate(request).await?;
        let Some(recommended) = l2_fees.first().cloned() else {
            return Ok(l2_fees);
        };

        let combined = self
            .l1_fee(request, &recommended)
            .await
            .and_then(|l1_amount| {
                Self::with_l1(&l2_fees, &l1_amount).map(|fees| (fees, l1_amount))
            });

        match combined {
            Ok((fees, l1_amount)) => {
                tracing::debug!(
                    chain = %self.chain,
                    l1_fee = %l1_amount.value,
                    multiplier = self.multiplier,
                    "l1_fee_applied"
                );
                Ok(fees)
            }
            Err(e) => {
                tracing::warn!(chain = %self.chain, error = %e, "l1_fee_unavailable");
                Ok(l2_fees)
            }
        }
    }
}
