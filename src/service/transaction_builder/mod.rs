//! 交易构建
//!
//! 产出待签名的摘要与最终广播字节：EVM 为 RLP，UTXO 为原始字节，Cardano 为 CBOR。

pub mod cardano;
pub mod evm;
pub mod utxo;

pub use cardano::CardanoTransactionBuilder;
pub use evm::{EvmTransactionBuilder, EvmTransactionInput};
pub use utxo::{UtxoTransactionBuilder, UtxoTransactionPlan};
