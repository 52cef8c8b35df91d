//! Domain 模块
//!
//! 链身份、派生路径、金额、UTXO 与交易记录等领域模型

pub mod address;
pub mod amount;
pub mod chain_config;
pub mod derivation;
pub mod network_params;
pub mod transaction_record;
pub mod unspent_output;
pub mod wallet;

// 重新导出常用类型
pub use address::{Address, AddressType, LockingScriptAddress};
pub use amount::{units_to_decimal, Amount, AmountType, Fee, FeeParameters, Token};
pub use chain_config::{Blockchain, ChainFamily};
pub use derivation::{DerivationOutcome, DerivationPath, DerivationPathResolver, DerivationStyle};
pub use network_params::NetworkParams;
pub use transaction_record::{
    Destination, DestinationAddress, DestinationType, Source, SourceType, StakingKind,
    TransactionRecord, TransactionStatus, TransactionType,
};
pub use unspent_output::{parse_output_id, unique_outputs, Asset, OutputId, UnspentOutput};
pub use wallet::{PendingTransaction, Transaction, Wallet};
