//! IronChain SDK - 多链钱包核心
//!
//! 公钥进，地址/余额/手续费/交易出。签名与密钥存储交给外部签名器。

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;

pub use config::SdkConfig;
pub use error::{ExplorerApiError, Result, SdkError};

pub mod prelude {
    pub use crate::{
        config::SdkConfig,
        domain::{
            Address, Amount, AmountType, Blockchain, ChainFamily, DerivationOutcome,
            DerivationPathResolver, DerivationStyle, Fee, FeeParameters, TransactionRecord,
            UnspentOutput, Wallet,
        },
        error::{ExplorerApiError, Result, SdkError},
        service::{
            wallet_manager::{ChainStrategyFactory, TransactionSigner, WalletManager},
            AddressService,
        },
    };
}
