//! 钱包门面
//!
//! 组合地址服务与链族策略，对外提供余额、手续费、发送与历史。
//! 所有网络操作都可被 [`WalletManager::shutdown`] 取消，取消后的结果不会写回钱包。

mod factory;
mod strategy;

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::Utc;
use tokio::sync::{watch, Mutex, RwLock};

pub use factory::ChainStrategyFactory;
pub use strategy::{
    CardanoStrategy, ChainStrategy, EvmHistoryBackend, EvmStrategy, TransactionSigner,
    UtxoStrategy, WalletUpdate,
};

use super::{
    address_service::{address_service_for, AddressService},
    fee::FeeRequest,
    history::TransactionHistoryService,
};
use crate::{
    config::SdkConfig,
    domain::{
        Amount, AmountType, Blockchain, DerivationStyle, Fee, PendingTransaction, Token,
        Transaction, TransactionRecord, Wallet,
    },
    error::{Result, SdkError},
};

/// 单个金额类型的历史分页器；翻页只锁自身
struct HistorySlot {
    service: Mutex<Box<dyn TransactionHistoryService>>,
    can_fetch_more: AtomicBool,
}

impl HistorySlot {
    fn new(service: Box<dyn TransactionHistoryService>) -> Self {
        Self {
            can_fetch_more: AtomicBool::new(service.can_fetch_more()),
            service: Mutex::new(service),
        }
    }
}

pub struct WalletManager {
    wallet: RwLock<Wallet>,
    tokens: RwLock<Vec<Token>>,
    strategy: Arc<dyn ChainStrategy>,
    addresses: Box<dyn AddressService>,
    history: Mutex<HashMap<AmountType, Arc<HistorySlot>>>,
    cancel: watch::Sender<bool>,
}

impl WalletManager {
    pub fn new(wallet: Wallet, strategy: Arc<dyn ChainStrategy>) -> Result<Self> {
        if wallet.blockchain != strategy.blockchain() {
            return Err(SdkError::UnsupportedChain(format!(
                "strategy for {} used with {} wallet",
                strategy.blockchain(),
                wallet.blockchain
            )));
        }
        let (cancel, _) = watch::channel(false);
        Ok(Self {
            addresses: address_service_for(wallet.blockchain)?,
            wallet: RwLock::new(wallet),
            tokens: RwLock::new(Vec::new()),
            strategy,
            history: Mutex::new(HashMap::new()),
            cancel,
        })
    }

    /// 从公钥派生地址并按配置组装策略
    pub fn create(
        blockchain: Blockchain,
        public_key: Vec<u8>,
        derivation_style: DerivationStyle,
        config: &SdkConfig,
    ) -> Result<Self> {
        let addresses = address_service_for(blockchain)?.make_addresses(&public_key)?;
        let wallet = Wallet::new(blockchain, addresses, public_key, derivation_style);
        Self::new(wallet, ChainStrategyFactory::make(blockchain, config)?)
    }

    /// 当前钱包状态的快照
    pub async fn wallet(&self) -> Wallet {
        self.wallet.read().await.clone()
    }

    pub fn blockchain(&self) -> Blockchain {
        self.strategy.blockchain()
    }

    pub async fn add_token(&self, token: Token) {
        let mut tokens = self.tokens.write().await;
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }

    pub async fn remove_token(&self, token: &Token) {
        self.tokens.write().await.retain(|t| t != token);
        self.wallet
            .write()
            .await
            .clear_amount(&AmountType::Token(token.clone()));
        self.history
            .lock()
            .await
            .remove(&AmountType::Token(token.clone()));
    }

    /// 刷新余额（UTXO 链同时刷新 UTXO 集合）
    pub async fn update(&self) -> Result<()> {
        let wallet = self.wallet().await;
        let tokens = self.tokens.read().await.clone();

        let update = self
            .cancellable(self.strategy.update(&wallet, &tokens))
            .await
            .map_err(|e| {
                tracing::warn!(chain = %wallet.blockchain, error = %e, code = e.code(), "wallet_update_failed");
                e
            })?;

        let mut wallet = self.wallet.write().await;
        if self.is_cancelled() {
            return Err(SdkError::Cancelled);
        }
        wallet.set_coin_value(update.coin);
        for (token, value) in update.tokens {
            wallet.set_token_value(token, value);
        }
        tracing::debug!(chain = %wallet.blockchain, coin = %update.coin, "wallet_updated");
        Ok(())
    }

    /// 手续费档位（低/中/高），第一档为推荐档
    pub async fn fees(&self, amount: Amount, destination: &str) -> Result<Vec<Fee>> {
        self.ensure_valid(destination)?;
        let source = self.source_address().await?;
        let request = FeeRequest {
            amount,
            source,
            destination: destination.to_string(),
        };
        self.cancellable(self.strategy.fees(&request)).await
    }

    /// 构建、签名并广播；成功后加入待确认列表
    pub async fn send(
        &self,
        transaction: Transaction,
        signer: &dyn TransactionSigner,
    ) -> Result<String> {
        self.ensure_valid(&transaction.destination_address)?;
        self.ensure_valid(&transaction.source_address)?;
        let wallet = self.wallet().await;

        let hash = self
            .cancellable(self.strategy.send(&wallet, &transaction, signer))
            .await?;

        tracing::info!(
            chain = %wallet.blockchain,
            hash = %hash,
            destination = %transaction.destination_address,
            "transaction_sent"
        );
        self.wallet
            .write()
            .await
            .add_pending_transaction(PendingTransaction {
                hash: hash.clone(),
                source: transaction.source_address,
                destination: transaction.destination_address,
                amount: transaction.amount,
                fee: transaction.fee.amount,
                date: Utc::now(),
            });
        Ok(hash)
    }

    /// 下一页历史；历史结束时返回空列表
    pub async fn load_history_page(&self, amount_type: &AmountType) -> Result<Vec<TransactionRecord>> {
        let slot = self.history_slot(amount_type).await?;
        let mut service = slot.service.lock().await;
        let page = self.cancellable(service.load_next_page()).await;
        slot.can_fetch_more
            .store(service.can_fetch_more(), Ordering::SeqCst);
        page
    }

    pub async fn can_fetch_more_history(&self, amount_type: &AmountType) -> bool {
        self.history
            .lock()
            .await
            .get(amount_type)
            .map_or(true, |slot| slot.can_fetch_more.load(Ordering::SeqCst))
    }

    /// 完整重新加载前调用：丢弃分页器，下次加载从第一页、序号 0 开始
    pub async fn reset_history(&self) {
        self.history.lock().await.clear();
    }

    async fn history_slot(&self, amount_type: &AmountType) -> Result<Arc<HistorySlot>> {
        let address = self.source_address().await?;
        let mut slots = self.history.lock().await;
        if let Some(slot) = slots.get(amount_type) {
            return Ok(slot.clone());
        }
        let service = self
            .strategy
            .history(&address, amount_type)
            .ok_or(SdkError::NotImplemented)?;
        let slot = Arc::new(HistorySlot::new(service));
        slots.insert(amount_type.clone(), slot.clone());
        Ok(slot)
    }

    /// 取消所有进行中的请求并丢弃缓存状态，之后的调用都返回 [`SdkError::Cancelled`]
    pub async fn shutdown(&self) {
        self.cancel.send_replace(true);
        self.strategy.invalidate().await;
        self.history.lock().await.clear();
        tracing::info!(chain = %self.blockchain(), "wallet_manager_shutdown");
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn ensure_valid(&self, address: &str) -> Result<()> {
        if self.addresses.validate(address) {
            Ok(())
        } else {
            Err(SdkError::InvalidAddress(address.to_string()))
        }
    }

    async fn source_address(&self) -> Result<String> {
        self.wallet
            .read()
            .await
            .default_address()
            .map(|a| a.value().to_string())
            .ok_or_else(|| SdkError::InvalidAddress("wallet has no address".into()))
    }

    async fn cancellable<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let mut cancelled = self.cancel.subscribe();
        if *cancelled.borrow_and_update() {
            return Err(SdkError::Cancelled);
        }
        tokio::select! {
            result = operation => result,
            _ = async { let _ = cancelled.wait_for(|c| *c).await; } => Err(SdkError::Cancelled),
        }
    }
}
