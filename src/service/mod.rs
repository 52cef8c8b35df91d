//! 服务层：地址、网络提供者、UTXO、费用、交易构建、历史与钱包门面

pub mod address_service;
pub mod fee;
pub mod history;
pub mod network;
pub mod transaction_builder;
pub mod unspent_output_manager;
pub mod wallet_manager;

pub use address_service::{
    address_service_for, AddressService, CardanoAddressService, EvmAddressService,
    UtxoAddressService,
};
pub use unspent_output_manager::UnspentOutputManager;
pub use wallet_manager::{ChainStrategy, ChainStrategyFactory, TransactionSigner, WalletManager};
