//! Rosetta 协议客户端（Cardano）
//!
//! 线上字段为 snake_case；多资产元数据按 policyId 分组，代币名为 ASCII 十六进制。

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use super::CardanoNetworkProvider;
use crate::{
    domain::{parse_output_id, Asset, UnspentOutput},
    error::{Result, SdkError},
    infrastructure::HttpClient,
};

pub const ADA_SYMBOL: &str = "ADA";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIdentifier {
    pub blockchain: String,
    pub network: String,
}

impl NetworkIdentifier {
    pub fn cardano(is_testnet: bool) -> Self {
        Self {
            blockchain: "cardano".into(),
            network: if is_testnet { "preprod" } else { "mainnet" }.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountIdentifier {
    pub address: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountBalanceRequest {
    pub network_identifier: NetworkIdentifier,
    pub account_identifier: AccountIdentifier,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountCoinsRequest {
    pub network_identifier: NetworkIdentifier,
    pub account_identifier: AccountIdentifier,
    pub include_mempool: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub network_identifier: NetworkIdentifier,
    pub signed_transaction: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosettaCurrency {
    pub symbol: String,
    #[serde(default)]
    pub decimals: u32,
    pub metadata: Option<RosettaCurrencyMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosettaCurrencyMetadata {
    #[serde(rename = "policyId")]
    pub policy_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosettaAmount {
    pub value: String,
    pub currency: RosettaCurrency,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountBalanceResponse {
    #[serde(default)]
    pub balances: Vec<RosettaAmount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoinIdentifier {
    pub identifier: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosettaTokenBundle {
    #[serde(rename = "policyId")]
    pub policy_id: Option<String>,
    #[serde(default)]
    pub tokens: Vec<RosettaAmount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosettaCoin {
    pub coin_identifier: CoinIdentifier,
    pub amount: RosettaAmount,
    /// 键为 coin 标识，值为按 policy 分组的代币
    pub metadata: Option<HashMap<String, Vec<RosettaTokenBundle>>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountCoinsResponse {
    #[serde(default)]
    pub coins: Vec<RosettaCoin>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionIdentifier {
    pub hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub transaction_identifier: TransactionIdentifier,
}

/// 汇总余额：ADA（lovelace）与原生资产
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosettaBalance {
    pub coin: u64,
    pub assets: Vec<Asset>,
}

#[derive(Debug)]
pub struct RosettaProvider {
    http: HttpClient,
    base_url: String,
    network: NetworkIdentifier,
}

impl RosettaProvider {
    pub fn new(http: HttpClient, base_url: impl Into<String>, is_testnet: bool) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            network: NetworkIdentifier::cardano(is_testnet),
        }
    }

    fn account(&self, address: &str) -> (NetworkIdentifier, AccountIdentifier) {
        (
            self.network.clone(),
            AccountIdentifier {
                address: address.to_string(),
            },
        )
    }

    /// `POST /account/balance`，多个地址并发查询后合并
    pub async fn balance(&self, addresses: &[String]) -> Result<RosettaBalance> {
        let url = format!("{}/account/balance", self.base_url);
        let responses = try_join_all(addresses.iter().map(|address| {
            let (network_identifier, account_identifier) = self.account(address);
            let request = AccountBalanceRequest {
                network_identifier,
                account_identifier,
            };
            let url = url.clone();
            async move {
                self.http
                    .post_json::<_, AccountBalanceResponse>(&url, &request, "rosetta balance")
                    .await
            }
        }))
        .await?;

        let mut total = RosettaBalance::default();
        let mut assets: HashMap<(String, String), u64> = HashMap::new();
        for amount in responses.into_iter().flat_map(|r| r.balances) {
            let Ok(value) = amount.value.parse::<u64>() else {
                tracing::warn!(value = %amount.value, symbol = %amount.currency.symbol, "balance_dropped_invalid_value");
                continue;
            };
            match amount.currency.metadata.and_then(|m| m.policy_id) {
                Some(policy_id) => {
                    *assets.entry((policy_id, amount.currency.symbol)).or_default() += value;
                }
                None if amount.currency.symbol == ADA_SYMBOL => total.coin += value,
                None => {
                    tracing::debug!(symbol = %amount.currency.symbol, "balance_unknown_currency");
                }
            }
        }

        total.assets = assets
            .into_iter()
            .map(|((policy_id, asset_name_hex), amount)| Asset {
                policy_id,
                asset_name_hex,
                amount,
            })
            .collect();
        total
            .assets
            .sort_by(|a, b| (&a.policy_id, &a.asset_name_hex).cmp(&(&b.policy_id, &b.asset_name_hex)));
        Ok(total)
    }

    /// `POST /account/coins`
    pub async fn coins(&self, address: &str) -> Result<Vec<UnspentOutput>> {
        let url = format!("{}/account/coins", self.base_url);
        let (network_identifier, account_identifier) = self.account(address);
        let request = AccountCoinsRequest {
            network_identifier,
            account_identifier,
            include_mempool: false,
        };
        let response: AccountCoinsResponse = self
            .http
            .post_json(&url, &request, "rosetta coins")
            .await?;

        Ok(response
            .coins
            .into_iter()
            .filter_map(|coin| map_coin(address, coin))
            .collect())
    }

    /// `POST /construction/submit`
    pub async fn submit(&self, transaction: &[u8]) -> Result<String> {
        let url = format!("{}/construction/submit", self.base_url);
        let request = SubmitRequest {
            network_identifier: self.network.clone(),
            signed_transaction: submit_payload(transaction)?,
        };
        let response: SubmitResponse = self
            .http
            .post_json(&url, &request, "rosetta submit")
            .await?;
        Ok(response.transaction_identifier.hash)
    }
}

/// 已签名交易包装为只含一个小写十六进制字符串的 CBOR 数组
pub fn submit_payload(transaction: &[u8]) -> Result<String> {
    let wrapped = ciborium::value::Value::Array(vec![ciborium::value::Value::Text(
        hex::encode(transaction),
    )]);
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&wrapped, &mut bytes)
        .map_err(|e| SdkError::decoding("cbor submit payload", &e.to_string()))?;
    Ok(hex::encode(bytes))
}

fn map_coin(address: &str, coin: RosettaCoin) -> Option<UnspentOutput> {
    let id = match parse_output_id(&coin.coin_identifier.identifier) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(identifier = %coin.coin_identifier.identifier, error = %e, "coin_dropped_invalid_identifier");
            return None;
        }
    };
    let amount = match coin.amount.value.parse::<u64>() {
        Ok(amount) => amount,
        Err(_) => {
            tracing::warn!(identifier = %coin.coin_identifier.identifier, value = %coin.amount.value, "coin_dropped_invalid_amount");
            return None;
        }
    };

    let assets = coin
        .metadata
        .into_iter()
        .flat_map(|m| m.into_values())
        .flatten()
        .flat_map(|bundle| {
            let policy_id = bundle.policy_id;
            bundle
                .tokens
                .into_iter()
                .filter_map(move |token| map_asset(policy_id.as_deref(), token))
        })
        .collect();

    Some(UnspentOutput {
        address: address.to_string(),
        amount,
        output_index: id.output_index,
        transaction_hash: id.transaction_hash,
        assets,
    })
}

/// 资产解析失败只丢弃该资产
fn map_asset(bundle_policy: Option<&str>, token: RosettaAmount) -> Option<Asset> {
    let policy_id = bundle_policy
        .map(str::to_string)
        .or_else(|| token.currency.metadata.and_then(|m| m.policy_id));
    let Some(policy_id) = policy_id.filter(|p| !p.is_empty()) else {
        tracing::warn!(symbol = %token.currency.symbol, "asset_dropped_missing_policy");
        return None;
    };
    let Ok(amount) = token.value.parse::<u64>() else {
        tracing::warn!(policy_id = %policy_id, value = %token.value, "asset_dropped_invalid_amount");
        return None;
    };

    Some(Asset {
        policy_id,
        asset_name_hex: token.currency.symbol.to_lowercase(),
        amount,
    })
}

#[async_trait]
impl CardanoNetworkProvider for RosettaProvider {
    async fn unspent_outputs(&self, addresses: &[String]) -> Result<Vec<UnspentOutput>> {
        let per_address = try_join_all(addresses.iter().map(|a| self.coins(a))).await?;
        Ok(per_address.into_iter().flatten().collect())
    }

    async fn send(&self, transaction: &[u8]) -> Result<String> {
        self.submit(transaction).await
    }
}
