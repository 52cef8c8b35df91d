//! 钱包状态模型

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    address::Address,
    amount::{Amount, AmountType, Fee, Token},
    chain_config::Blockchain,
    derivation::DerivationStyle,
};

/// 待发送的交易
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub amount: Amount,
    pub fee: Fee,
    pub source_address: String,
    pub destination_address: String,
    /// 找零地址，UTXO 链默认回到来源地址
    #[serde(default)]
    pub change_address: Option<String>,
}

impl Transaction {
    pub fn contract_address(&self) -> Option<&str> {
        match &self.amount.amount_type {
            AmountType::Token(token) => Some(&token.contract_address),
            AmountType::Coin => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub hash: String,
    pub source: String,
    pub destination: String,
    pub amount: Amount,
    pub fee: Amount,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Wallet {
    pub blockchain: Blockchain,
    pub addresses: Vec<Address>,
    pub public_key: Vec<u8>,
    /// 派生出地址时使用的策略版本，钱包生命周期内不变
    pub derivation_style: DerivationStyle,
    amounts: HashMap<AmountType, Amount>,
    pub pending_transactions: Vec<PendingTransaction>,
}

impl Wallet {
    pub fn new(
        blockchain: Blockchain,
        addresses: Vec<Address>,
        public_key: Vec<u8>,
        derivation_style: DerivationStyle,
    ) -> Self {
        Self {
            blockchain,
            addresses,
            public_key,
            derivation_style,
            amounts: HashMap::new(),
            pending_transactions: Vec::new(),
        }
    }

    /// 默认地址（第一个地址）
    pub fn default_address(&self) -> Option<&Address> {
        self.addresses.first()
    }

    pub fn address_values(&self) -> Vec<String> {
        self.addresses.iter().map(|a| a.value().to_string()).collect()
    }

    pub fn amount(&self, amount_type: &AmountType) -> Option<&Amount> {
        self.amounts.get(amount_type)
    }

    pub fn set_coin_value(&mut self, value: Decimal) {
        self.amounts
            .insert(AmountType::Coin, Amount::coin(self.blockchain, value));
    }

    pub fn set_token_value(&mut self, token: Token, value: Decimal) {
        let amount_type = AmountType::Token(token.clone());
        self.amounts.insert(amount_type, Amount::token(token, value));
    }

    pub fn clear_amount(&mut self, amount_type: &AmountType) {
        self.amounts.remove(amount_type);
    }

    pub fn add_pending_transaction(&mut self, tx: PendingTransaction) {
        if self.pending_transactions.iter().any(|p| p.hash == tx.hash) {
            return;
        }
        self.pending_transactions.push(tx);
    }

    pub fn clear_pending_transactions(&mut self) {
        self.pending_transactions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_transactions_deduplicated() {
        let chain = Blockchain::Bitcoin(false);
        let mut wallet = Wallet::new(chain, vec![], vec![2; 33], DerivationStyle::Current);
        let pending = PendingTransaction {
            hash: "aa".into(),
            source: "a".into(),
            destination: "b".into(),
            amount: Amount::zero_coin(chain),
            fee: Amount::zero_coin(chain),
            date: Utc::now(),
        };
        wallet.add_pending_transaction(pending.clone());
        wallet.add_pending_transaction(pending);
        assert_eq!(wallet.pending_transactions.len(), 1);
    }

    #[test]
    fn test_amounts() {
        let chain = Blockchain::Ethereum(false);
        let mut wallet = Wallet::new(chain, vec![], vec![], DerivationStyle::Current);
        wallet.set_coin_value(Decimal::ONE);
        assert_eq!(
            wallet.amount(&AmountType::Coin).map(|a| a.value),
            Some(Decimal::ONE)
        );
        wallet.clear_amount(&AmountType::Coin);
        assert!(wallet.amount(&AmountType::Coin).is_none());
    }
}
