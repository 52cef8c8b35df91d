//! EVM 费用估算
//!
//! gas limit 来自 `eth_estimateGas` 并按百分比上浮；
//! legacy 链按 `eth_gasPrice` 分档，EIP-1559 链按 2 * baseFee + priority 分档。

use std::sync::Arc;

use async_trait::async_trait;

use super::{enforce_non_decreasing, scale_units, FeeEstimator, FeeRequest};
use crate::{
    config::FeeConfig,
    domain::{Amount, Blockchain, Fee, FeeParameters},
    error::Result,
    service::{network::JsonRpcClient, transaction_builder::evm::transfer_call},
};

/// 节点不支持 `eth_maxPriorityFeePerGas` 时的小费（1.5 gwei）
pub const DEFAULT_PRIORITY_FEE: u128 = 1_500_000_000;

pub struct EvmFeeEstimator {
    chain: Blockchain,
    node: Arc<JsonRpcClient>,
    gas_limit_multiplier_percent: u64,
    tier_multipliers: [f64; 3],
}

impl EvmFeeEstimator {
    pub fn new(chain: Blockchain, node: Arc<JsonRpcClient>, config: &FeeConfig) -> Self {
        Self {
            chain,
            node,
            gas_limit_multiplier_percent: config.gas_limit_multiplier_percent,
            tier_multipliers: config.tier_multipliers,
        }
    }

    pub async fn gas_limit(&self, request: &FeeRequest) -> Result<u64> {
        let (to, value, data) = transfer_call(&request.amount, &request.destination)?;
        let estimated = self
            .node
            .eth_estimate_gas(
                &request.source,
                &format!("0x{}", hex::encode(to)),
                value,
                &data,
            )
            .await?;
        Ok(estimated.saturating_mul(self.gas_limit_multiplier_percent) / 100)
    }

    async fn priority_fee(&self) -> Result<u128> {
        match self.node.eth_max_priority_fee_per_gas().await {
            Ok(fee) => Ok(fee),
            Err(e) if !e.is_retryable() => {
                tracing::debug!(chain = %self.chain, error = %e, "priority_fee_fallback");
                Ok(DEFAULT_PRIORITY_FEE)
            }
            Err(e) => Err(e),
        }
    }

    fn fee(&self, parameters: FeeParameters) -> Result<Fee> {
        let amount = Amount::coin_from_units(self.chain, parameters.fee_units())?;
        Ok(Fee::new(amount, parameters))
    }
}

#[async_trait]
impl FeeEstimator for EvmFeeEstimator {
    async fn estimate(&self, request: &FeeRequest) -> Result<Vec<Fee>> {
        let gas_limit = self.gas_limit(request).await?;

        let fees = if self.chain.supports_eip1559() {
            let base_fee = self.node.eth_base_fee().await?;
            let priority_fee = self.priority_fee().await?;
            self.tier_multipliers
                .iter()
                .map(|m| {
                    let priority_fee = scale_units(priority_fee, *m);
                    self.fee(FeeParameters::EthereumEip1559 {
                        gas_limit,
                        max_fee_per_gas: base_fee.saturating_mul(2).saturating_add(priority_fee),
                        priority_fee,
                    })
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            let gas_price = self.node.eth_gas_price().await?;
            self.tier_multipliers
                .iter()
                .map(|m| {
                    self.fee(FeeParameters::EthereumLegacy {
                        gas_limit,
                        gas_price: scale_units(gas_price, *m),
                    })
                })
                .collect::<Result<Vec<_>>>()?
        };

        tracing::debug!(chain = %self.chain, gas_limit, tiers = fees.len(), "evm_fee_estimated");
        Ok(enforce_non_decreasing(fees))
    }
}
