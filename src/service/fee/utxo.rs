//! UTXO 费用估算
//!
//! 节点返回 coin/kB，换算为 sat/byte（向上取整，下限 1）后乘以估算的交易大小。

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use rust_decimal::{
    prelude::{FromPrimitive, ToPrimitive},
    Decimal,
};

use super::{enforce_non_decreasing, FeeEstimator, FeeRequest};
use crate::{
    domain::{Amount, Blockchain, Fee, FeeParameters, UnspentOutput},
    error::{Result, SdkError},
    service::{
        network::UtxoNetworkProvider, transaction_builder::UtxoTransactionBuilder,
        unspent_output_manager::UnspentOutputManager,
    },
};

/// 慢 / 普通 / 快 对应的确认目标块数
pub const FEE_TARGET_BLOCKS: [u32; 3] = [6, 3, 1];

pub struct UtxoFeeEstimator {
    chain: Blockchain,
    provider: Arc<dyn UtxoNetworkProvider>,
    outputs: Arc<UnspentOutputManager>,
}

impl UtxoFeeEstimator {
    pub fn new(
        chain: Blockchain,
        provider: Arc<dyn UtxoNetworkProvider>,
        outputs: Arc<UnspentOutputManager>,
    ) -> Self {
        Self {
            chain,
            provider,
            outputs,
        }
    }
}

#[async_trait]
impl FeeEstimator for UtxoFeeEstimator {
    async fn estimate(&self, request: &FeeRequest) -> Result<Vec<Fee>> {
        let rates = try_join_all(
            FEE_TARGET_BLOCKS
                .iter()
                .map(|blocks| self.provider.estimate_fee_rate(*blocks)),
        )
        .await?;
        let rates = fill_missing(&rates).ok_or(SdkError::NoFeeAvailable)?;

        let amount = request.amount.to_smallest_unit()?;
        let inputs = count_inputs(&self.outputs.outputs().await, amount);
        let size = UtxoTransactionBuilder::estimate_size(inputs, 2);

        let fees = rates
            .into_iter()
            .map(|rate| {
                let rate_per_byte = per_byte_rate(rate, self.chain.decimal_count())?;
                let units = u128::from(rate_per_byte) * u128::from(size);
                Ok(Fee::new(
                    Amount::coin_from_units(self.chain, units)?,
                    FeeParameters::Utxo { rate_per_byte },
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            chain = %self.chain,
            host = %self.provider.host(),
            inputs,
            size,
            "utxo_fee_estimated"
        );
        Ok(enforce_non_decreasing(fees))
    }
}

/// coin/kB -> 最小单位/byte
pub fn per_byte_rate(rate_per_kb: f64, decimals: u32) -> Result<u64> {
    let rate = Decimal::from_f64(rate_per_kb)
        .filter(|r| !r.is_sign_negative())
        .ok_or_else(|| SdkError::InvalidAmount(format!("fee rate {rate_per_kb}")))?;
    let per_kb_units = rate
        .checked_mul(Decimal::from(10u64.pow(decimals)))
        .ok_or_else(|| SdkError::InvalidAmount(format!("fee rate {rate_per_kb}")))?;
    let per_byte = (per_kb_units / Decimal::from(1000)).ceil();
    Ok(per_byte.to_u64().unwrap_or(u64::MAX).max(1))
}

/// 缺失档位取前一个可用档位，开头缺失取第一个可用值；全部缺失时为 None
fn fill_missing(rates: &[Option<f64>]) -> Option<Vec<f64>> {
    let first = rates.iter().flatten().next().copied()?;
    let mut last = first;
    Some(
        rates
            .iter()
            .map(|rate| {
                if let Some(rate) = rate {
                    last = *rate;
                }
                last
            })
            .collect(),
    )
}

/// 按最大优先选币需要的输入数量，至少为 1
fn count_inputs(outputs: &[UnspentOutput], amount: u128) -> usize {
    let mut amounts: Vec<u64> = outputs.iter().map(|o| o.amount).collect();
    amounts.sort_unstable_by(|a, b| b.cmp(a));

    let mut total: u128 = 0;
    let mut count = 0;
    for value in amounts {
        if total >= amount && count > 0 {
            break;
        }
        total += u128::from(value);
        count += 1;
    }
    count.max(1)
}
