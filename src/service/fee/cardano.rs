//! Cardano 费用估算：按当前 UTXO 构建一次交易体，取线性手续费

use std::sync::Arc;

use async_trait::async_trait;

use super::{FeeEstimator, FeeRequest};
use crate::{
    domain::{Amount, Blockchain, Fee, FeeParameters, Transaction},
    error::Result,
    service::{
        transaction_builder::CardanoTransactionBuilder,
        unspent_output_manager::UnspentOutputManager,
    },
};

pub struct CardanoFeeEstimator {
    builder: CardanoTransactionBuilder,
    outputs: Arc<UnspentOutputManager>,
}

impl CardanoFeeEstimator {
    pub fn new(builder: CardanoTransactionBuilder, outputs: Arc<UnspentOutputManager>) -> Self {
        Self { builder, outputs }
    }
}

#[async_trait]
impl FeeEstimator for CardanoFeeEstimator {
    async fn estimate(&self, request: &FeeRequest) -> Result<Vec<Fee>> {
        let draft = Transaction {
            amount: request.amount.clone(),
            fee: Fee::new(
                Amount::zero_coin(Blockchain::Cardano(false)),
                FeeParameters::Cardano { fee: 0 },
            ),
            source_address: request.source.clone(),
            destination_address: request.destination.clone(),
            change_address: None,
        };
        let plan = self.builder.plan(&draft, &self.outputs.outputs().await)?;

        // Cardano 只有一个档位
        Ok(vec![Fee::new(
            Amount::coin_from_units(Blockchain::Cardano(false), u128::from(plan.fee))?,
            FeeParameters::Cardano { fee: plan.fee },
        )])
    }
}
