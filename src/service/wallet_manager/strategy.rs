//! 链族策略
//!
//! 每个链族一个 [`ChainStrategy`] 实现，[`super::WalletManager`] 只委托，不继承。
//! Rollup 链复用 EVM 策略，差别只在注入的费用估算器（L1 装饰器）。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use futures::future::try_join_all;
use rust_decimal::Decimal;

use crate::{
    domain::{units_to_decimal, AmountType, Blockchain, Fee, Token, Transaction, Wallet},
    error::{Result, SdkError},
    service::{
        fee::{FeeEstimator, FeeRequest},
        history::{
            BlockBookEvmMapper, BlockBookHistorySource, BlockBookUtxoMapper,
            EtherscanHistorySource, EtherscanMapper, TransactionHistoryPager,
            TransactionHistoryService,
        },
        network::{
            BlockBookProvider, CardanoNetworkProvider, EtherscanProvider, JsonRpcClient,
            UtxoNetworkProvider,
        },
        transaction_builder::{
            CardanoTransactionBuilder, EvmTransactionBuilder, UtxoTransactionBuilder,
        },
        unspent_output_manager::UnspentOutputManager,
    },
};

/// 外部签名器（硬件卡或软件密钥），核心从不接触私钥
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// 对每个 32 字节摘要签名，返回顺序与输入一致
    async fn sign(&self, hashes: &[[u8; 32]], public_key: &[u8]) -> Result<Vec<Vec<u8>>>;
}

/// 一次刷新得到的余额，由管理器在未取消时写回钱包
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalletUpdate {
    pub coin: Decimal,
    pub tokens: Vec<(Token, Decimal)>,
}

#[async_trait]
pub trait ChainStrategy: Send + Sync {
    fn blockchain(&self) -> Blockchain;

    async fn update(&self, wallet: &Wallet, tokens: &[Token]) -> Result<WalletUpdate>;

    async fn fees(&self, request: &FeeRequest) -> Result<Vec<Fee>>;

    /// 构建、签名并广播，返回交易哈希
    async fn send(
        &self,
        wallet: &Wallet,
        transaction: &Transaction,
        signer: &dyn TransactionSigner,
    ) -> Result<String>;

    /// 没有配置历史浏览器时为 None
    fn history(
        &self,
        address: &str,
        amount_type: &AmountType,
    ) -> Option<Box<dyn TransactionHistoryService>>;

    /// 钱包关闭或切换时丢弃缓存状态
    async fn invalidate(&self) {}
}

fn single_signature(mut signatures: Vec<Vec<u8>>) -> Result<Vec<u8>> {
    if signatures.len() != 1 {
        return Err(SdkError::Signer(format!(
            "expected 1 signature, got {}",
            signatures.len()
        )));
    }
    Ok(signatures.remove(0))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// UTXO
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct UtxoStrategy {
    chain: Blockchain,
    provider: Arc<dyn UtxoNetworkProvider>,
    outputs: Arc<UnspentOutputManager>,
    fees: Arc<dyn FeeEstimator>,
    builder: UtxoTransactionBuilder,
    explorer: Option<Arc<BlockBookProvider>>,
}

impl UtxoStrategy {
    pub fn new(
        chain: Blockchain,
        provider: Arc<dyn UtxoNetworkProvider>,
        outputs: Arc<UnspentOutputManager>,
        fees: Arc<dyn FeeEstimator>,
        builder: UtxoTransactionBuilder,
        explorer: Option<Arc<BlockBookProvider>>,
    ) -> Self {
        Self {
            chain,
            provider,
            outputs,
            fees,
            builder,
            explorer,
        }
    }
}

#[async_trait]
impl ChainStrategy for UtxoStrategy {
    fn blockchain(&self) -> Blockchain {
        self.chain
    }

    async fn update(&self, wallet: &Wallet, _tokens: &[Token]) -> Result<WalletUpdate> {
        let outputs = self
            .outputs
            .fetch(self.provider.as_ref(), &wallet.address_values())
            .await?;
        let total: u64 = outputs.iter().map(|o| o.amount).sum();
        Ok(WalletUpdate {
            coin: units_to_decimal(u128::from(total), self.chain.decimal_count())?,
            tokens: vec![],
        })
    }

    async fn fees(&self, request: &FeeRequest) -> Result<Vec<Fee>> {
        self.fees.estimate(request).await
    }

    async fn send(
        &self,
        wallet: &Wallet,
        transaction: &Transaction,
        signer: &dyn TransactionSigner,
    ) -> Result<String> {
        let plan = self
            .builder
            .plan(transaction, &self.outputs.outputs().await)?;
        let hashes = self.builder.signing_hashes(&plan)?;
        let signatures = signer.sign(&hashes, &wallet.public_key).await?;
        let raw = self
            .builder
            .encode_signed(&plan, &wallet.public_key, &signatures)?;

        let hash = self.provider.send(&hex::encode(raw)).await?;
        let spent: Vec<_> = plan.inputs.into_iter().map(|i| i.output).collect();
        self.outputs.remove_spent(&spent).await;
        Ok(hash)
    }

    fn history(
        &self,
        address: &str,
        amount_type: &AmountType,
    ) -> Option<Box<dyn TransactionHistoryService>> {
        let provider = self.explorer.clone()?;
        let source = BlockBookHistorySource::new(provider, BlockBookUtxoMapper::new(self.chain));
        Some(Box::new(TransactionHistoryPager::new(
            source,
            address,
            amount_type.clone(),
        )))
    }

    async fn invalidate(&self) {
        self.outputs.invalidate().await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EVM（含 Rollup）
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// EVM 历史来源，Etherscan 优先
#[derive(Clone)]
pub enum EvmHistoryBackend {
    Etherscan(Arc<EtherscanProvider>),
    BlockBook(Arc<BlockBookProvider>),
    None,
}

pub struct EvmStrategy {
    chain: Blockchain,
    node: Arc<JsonRpcClient>,
    fees: Arc<dyn FeeEstimator>,
    builder: EvmTransactionBuilder,
    history: EvmHistoryBackend,
}

impl EvmStrategy {
    pub fn new(
        chain: Blockchain,
        node: Arc<JsonRpcClient>,
        fees: Arc<dyn FeeEstimator>,
        history: EvmHistoryBackend,
    ) -> Result<Self> {
        Ok(Self {
            chain,
            node,
            fees,
            builder: EvmTransactionBuilder::for_chain(chain)?,
            history,
        })
    }
}

#[async_trait]
impl ChainStrategy for EvmStrategy {
    fn blockchain(&self) -> Blockchain {
        self.chain
    }

    async fn update(&self, wallet: &Wallet, tokens: &[Token]) -> Result<WalletUpdate> {
        let address = wallet
            .default_address()
            .ok_or_else(|| SdkError::InvalidAddress("wallet has no address".into()))?
            .value()
            .to_string();

        let balance = self.node.eth_get_balance(&address).await?;
        let token_balances = try_join_all(tokens.iter().map(|token| {
            let address = address.clone();
            async move {
                let units = self
                    .node
                    .erc20_balance(&token.contract_address, &address)
                    .await?;
                Ok::<_, SdkError>((token.clone(), units_to_decimal(units, token.decimal_count)?))
            }
        }))
        .await?;

        Ok(WalletUpdate {
            coin: units_to_decimal(balance, self.chain.decimal_count())?,
            tokens: token_balances,
        })
    }

    async fn fees(&self, request: &FeeRequest) -> Result<Vec<Fee>> {
        self.fees.estimate(request).await
    }

    async fn send(
        &self,
        wallet: &Wallet,
        transaction: &Transaction,
        signer: &dyn TransactionSigner,
    ) -> Result<String> {
        let nonce = self
            .node
            .eth_get_transaction_count(&transaction.source_address)
            .await?;
        let input = self.builder.build_input(transaction, nonce)?;
        let hash = self.builder.signing_hash(&input)?;

        let signature = single_signature(signer.sign(&[hash], &wallet.public_key).await?)?;
        let raw = self.builder.encode_signed(&input, &signature)?;

        tracing::debug!(chain = %self.chain, nonce, "evm_transaction_signed");
        self.node.eth_send_raw_transaction(&raw).await
    }

    fn history(
        &self,
        address: &str,
        amount_type: &AmountType,
    ) -> Option<Box<dyn TransactionHistoryService>> {
        let amount_type = amount_type.clone();
        match &self.history {
            EvmHistoryBackend::Etherscan(provider) => {
                let source = EtherscanHistorySource::new(
                    provider.clone(),
                    EtherscanMapper::new(self.chain),
                );
                Some(Box::new(TransactionHistoryPager::new(source, address, amount_type)))
            }
            EvmHistoryBackend::BlockBook(provider) => {
                let source = BlockBookHistorySource::new(
                    provider.clone(),
                    BlockBookEvmMapper::new(self.chain),
                );
                Some(Box::new(TransactionHistoryPager::new(source, address, amount_type)))
            }
            EvmHistoryBackend::None => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cardano
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct CardanoStrategy {
    chain: Blockchain,
    provider: Arc<dyn CardanoNetworkProvider>,
    outputs: Arc<UnspentOutputManager>,
    fees: Arc<dyn FeeEstimator>,
    builder: CardanoTransactionBuilder,
}

impl CardanoStrategy {
    pub fn new(
        chain: Blockchain,
        provider: Arc<dyn CardanoNetworkProvider>,
        outputs: Arc<UnspentOutputManager>,
        fees: Arc<dyn FeeEstimator>,
        builder: CardanoTransactionBuilder,
    ) -> Self {
        Self {
            chain,
            provider,
            outputs,
            fees,
            builder,
        }
    }
}

/// 代币单位为 policy id 或 policy id + 资产名十六进制
fn asset_matches(policy_id: &str, asset_name_hex: &str, unit: &str) -> bool {
    unit.eq_ignore_ascii_case(policy_id)
        || unit.eq_ignore_ascii_case(&format!("{policy_id}{asset_name_hex}"))
}

#[async_trait]
impl ChainStrategy for CardanoStrategy {
    fn blockchain(&self) -> Blockchain {
        self.chain
    }

    async fn update(&self, wallet: &Wallet, tokens: &[Token]) -> Result<WalletUpdate> {
        let ticket = self.outputs.begin_refresh();
        let outputs = self
            .provider
            .unspent_outputs(&wallet.address_values())
            .await?;

        let mut by_address: HashMap<String, Vec<_>> = HashMap::new();
        for output in &outputs {
            by_address
                .entry(output.address.clone())
                .or_default()
                .push(output.clone());
        }
        if !self.outputs.apply(ticket, by_address).await {
            return Err(SdkError::Cancelled);
        }

        let coin: u64 = outputs.iter().map(|o| o.amount).sum();
        let mut token_values = Vec::with_capacity(tokens.len());
        for token in tokens {
            let units: u64 = outputs
                .iter()
                .flat_map(|o| o.assets.iter())
                .filter(|a| asset_matches(&a.policy_id, &a.asset_name_hex, &token.contract_address))
                .map(|a| a.amount)
                .sum();
            token_values.push((
                token.clone(),
                units_to_decimal(u128::from(units), token.decimal_count)?,
            ));
        }

        Ok(WalletUpdate {
            coin: units_to_decimal(u128::from(coin), self.chain.decimal_count())?,
            tokens: token_values,
        })
    }

    async fn fees(&self, request: &FeeRequest) -> Result<Vec<Fee>> {
        self.fees.estimate(request).await
    }

    async fn send(
        &self,
        wallet: &Wallet,
        transaction: &Transaction,
        signer: &dyn TransactionSigner,
    ) -> Result<String> {
        let plan = self
            .builder
            .plan(transaction, &self.outputs.outputs().await)?;
        let hash = self.builder.body_hash(&plan)?;
        let signature = single_signature(signer.sign(&[hash], &wallet.public_key).await?)?;
        let raw = self
            .builder
            .encode_signed(&plan, &wallet.public_key, &signature)?;

        let tx_hash = self.provider.send(&raw).await?;
        self.outputs.remove_spent(&plan.inputs).await;
        Ok(tx_hash)
    }

    fn history(
        &self,
        _address: &str,
        _amount_type: &AmountType,
    ) -> Option<Box<dyn TransactionHistoryService>> {
        None
    }

    async fn invalidate(&self) {
        self.outputs.invalidate().await;
    }
}
