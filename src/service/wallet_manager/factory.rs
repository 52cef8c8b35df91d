//! 按链族组装策略：提供者、费用估算器、交易构建器

use std::{sync::Arc, time::Duration};

use super::strategy::{CardanoStrategy, ChainStrategy, EvmHistoryBackend, EvmStrategy, UtxoStrategy};
use crate::{
    config::SdkConfig,
    domain::{Blockchain, ChainFamily, NetworkParams},
    error::{Result, SdkError},
    infrastructure::HttpClient,
    service::{
        address_service::UtxoAddressService,
        fee::{
            CardanoFeeEstimator, ContractL1FeeOracle, EvmFeeEstimator, FeeEstimator,
            OptimisticRollupFeeEstimator, UtxoFeeEstimator,
        },
        network::{
            BlockBookProvider, ElectrumProvider, EtherscanProvider, JsonRpcClient,
            MultiUtxoNetworkProvider, ProviderPoolPolicy, RosettaProvider, UtxoNetworkProvider,
        },
        transaction_builder::{CardanoTransactionBuilder, UtxoTransactionBuilder},
        unspent_output_manager::UnspentOutputManager,
    },
};

pub struct ChainStrategyFactory;

impl ChainStrategyFactory {
    pub fn make(blockchain: Blockchain, config: &SdkConfig) -> Result<Arc<dyn ChainStrategy>> {
        let http = HttpClient::new(&config.network);
        let strategy: Arc<dyn ChainStrategy> = match blockchain.family() {
            ChainFamily::Utxo => Arc::new(Self::utxo(blockchain, config, http)?),
            ChainFamily::Evm | ChainFamily::EvmOptimisticRollup => {
                Arc::new(Self::evm(blockchain, config, http)?)
            }
            ChainFamily::Cardano => Arc::new(Self::cardano(blockchain, config, http)?),
            _ => return Err(SdkError::UnsupportedChain(blockchain.to_string())),
        };

        tracing::info!(chain = %blockchain, family = ?blockchain.family(), "chain_strategy_created");
        Ok(strategy)
    }

    fn blockbook(
        blockchain: Blockchain,
        config: &SdkConfig,
        http: &HttpClient,
    ) -> Option<Arc<BlockBookProvider>> {
        config
            .providers
            .blockbook_urls
            .get(blockchain.id())
            .map(|url| {
                Arc::new(BlockBookProvider::new(
                    http.clone(),
                    url.clone(),
                    config.providers.blockbook_api_key.clone(),
                ))
            })
    }

    fn utxo(blockchain: Blockchain, config: &SdkConfig, http: HttpClient) -> Result<UtxoStrategy> {
        let params = NetworkParams::for_chain(blockchain)?;
        let blockbook = Self::blockbook(blockchain, config, &http);

        let mut providers: Vec<Arc<dyn UtxoNetworkProvider>> = Vec::new();
        if let Some(blockbook) = &blockbook {
            providers.push(blockbook.clone());
        }
        let timeout = Duration::from_secs(config.network.request_timeout_secs);
        for endpoint in config
            .providers
            .electrum_endpoints
            .get(blockchain.id())
            .into_iter()
            .flatten()
        {
            providers.push(Arc::new(ElectrumProvider::new(
                endpoint.clone(),
                UtxoAddressService::new(params.clone()),
                timeout,
            )));
        }

        let provider: Arc<dyn UtxoNetworkProvider> =
            Arc::new(MultiUtxoNetworkProvider::new(providers, ProviderPoolPolicy::Failover)?);
        let outputs = Arc::new(UnspentOutputManager::new());
        let fees = Arc::new(UtxoFeeEstimator::new(
            blockchain,
            provider.clone(),
            outputs.clone(),
        ));

        Ok(UtxoStrategy::new(
            blockchain,
            provider,
            outputs,
            fees,
            UtxoTransactionBuilder::new(params),
            blockbook,
        ))
    }

    fn evm(blockchain: Blockchain, config: &SdkConfig, http: HttpClient) -> Result<EvmStrategy> {
        let url = config
            .providers
            .node_urls
            .get(blockchain.id())
            .and_then(|urls| urls.first())
            .ok_or_else(|| {
                SdkError::UnsupportedChain(format!("{blockchain}: no node url configured"))
            })?;
        let node = Arc::new(JsonRpcClient::new(http.clone(), url.clone()));

        let base: Arc<dyn FeeEstimator> =
            Arc::new(EvmFeeEstimator::new(blockchain, node.clone(), &config.fees));
        let is_rollup = blockchain.family() == ChainFamily::EvmOptimisticRollup;
        let fees: Arc<dyn FeeEstimator> = if is_rollup {
            let oracle = Arc::new(ContractL1FeeOracle::new(
                node.clone(),
                config.fees.l1_oracle_address.clone(),
            ));
            Arc::new(OptimisticRollupFeeEstimator::new(
                blockchain,
                base,
                oracle,
                config.fees.l1_multiplier(blockchain.id()),
            )?)
        } else {
            base
        };

        let history = match config.providers.etherscan_urls.get(blockchain.id()) {
            Some(url) => EvmHistoryBackend::Etherscan(Arc::new(EtherscanProvider::new(
                http.clone(),
                url.clone(),
                config.providers.etherscan_api_key.clone(),
            ))),
            None => Self::blockbook(blockchain, config, &http)
                .map_or(EvmHistoryBackend::None, EvmHistoryBackend::BlockBook),
        };

        EvmStrategy::new(blockchain, node, fees, history)
    }

    fn cardano(
        blockchain: Blockchain,
        config: &SdkConfig,
        http: HttpClient,
    ) -> Result<CardanoStrategy> {
        let url = config.providers.rosetta_url.clone().ok_or_else(|| {
            SdkError::UnsupportedChain(format!("{blockchain}: no rosetta url configured"))
        })?;
        let provider = Arc::new(RosettaProvider::new(http, url, blockchain.is_testnet()));
        let outputs = Arc::new(UnspentOutputManager::new());
        let builder = CardanoTransactionBuilder::new(blockchain.is_testnet());
        let fees = Arc::new(CardanoFeeEstimator::new(builder.clone(), outputs.clone()));

        Ok(CardanoStrategy::new(blockchain, provider, outputs, fees, builder))
    }
}
