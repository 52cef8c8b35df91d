//! 费用估算
//!
//! 每个估算器返回按优先级排列的费用档位，第一个为推荐档。

pub mod cardano;
pub mod evm;
pub mod rollup;
pub mod utxo;

use async_trait::async_trait;
use rust_decimal::{
    prelude::{FromPrimitive, ToPrimitive},
    Decimal,
};

pub use cardano::CardanoFeeEstimator;
pub use evm::EvmFeeEstimator;
pub use rollup::{ContractL1FeeOracle, L1FeeOracle, OptimisticRollupFeeEstimator};
pub use utxo::UtxoFeeEstimator;

use crate::{
    domain::{Amount, Fee},
    error::Result,
};

/// 估算请求：金额与收发地址
#[derive(Debug, Clone, PartialEq)]
pub struct FeeRequest {
    pub amount: Amount,
    pub source: String,
    pub destination: String,
}

#[async_trait]
pub trait FeeEstimator: Send + Sync {
    async fn estimate(&self, request: &FeeRequest) -> Result<Vec<Fee>>;
}

/// 档位按优先级不递减：低于前一档的档位用前一档替换
pub fn enforce_non_decreasing(fees: Vec<Fee>) -> Vec<Fee> {
    let mut result: Vec<Fee> = Vec::with_capacity(fees.len());
    for fee in fees {
        match result.last() {
            Some(previous) if fee.amount.value < previous.amount.value => {
                tracing::debug!(
                    tier = result.len(),
                    value = %fee.amount.value,
                    floor = %previous.amount.value,
                    "fee_tier_raised"
                );
                let previous = previous.clone();
                result.push(previous);
            }
            _ => result.push(fee),
        }
    }
    result
}

/// 最小单位乘以浮点倍数（向下取整），无法表示时保持原值
pub(crate) fn scale_units(units: u128, multiplier: f64) -> u128 {
    Decimal::from_u128(units)
        .zip(Decimal::from_f64(multiplier))
        .and_then(|(units, multiplier)| units.checked_mul(multiplier))
        .and_then(|scaled| scaled.floor().to_u128())
        .unwrap_or(units)
}
