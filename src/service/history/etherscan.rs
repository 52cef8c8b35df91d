//! Etherscan 风格浏览器的历史映射

use rust_decimal::Decimal;

use super::{classify, parse_units, timestamp, IndexCounter, TransactionHistoryMapper};
use crate::{
    domain::{
        Amount, AmountType, Blockchain, Destination, DestinationAddress, DestinationType, Fee,
        Source, SourceType, TransactionRecord, TransactionStatus,
    },
    error::{ExplorerApiError, Result},
    service::network::etherscan::{EtherscanResponse, EtherscanResult, EtherscanTransaction},
};

const RATE_LIMIT_PREFIX: &str = "Max rate limit reached";

#[derive(Debug)]
pub struct EtherscanMapper {
    chain: Blockchain,
    counter: IndexCounter,
}

/// 信封级错误：限流、空页、其他
fn envelope_items(response: &EtherscanResponse) -> Result<&[serde_json::Value]> {
    match (&response.result, response.is_success()) {
        (EtherscanResult::Transactions(items), _) if items.is_empty() => {
            Err(ExplorerApiError::EndOfHistory.into())
        }
        (EtherscanResult::Transactions(items), true) => Ok(items),
        (EtherscanResult::Message(message), _) if message.starts_with(RATE_LIMIT_PREFIX) => {
            Err(ExplorerApiError::RateLimited.into())
        }
        (EtherscanResult::Message(message), _) => {
            Err(ExplorerApiError::Unknown(format!("{}: {}", response.message, message)).into())
        }
        (EtherscanResult::Transactions(_), false) => {
            Err(ExplorerApiError::Unknown(response.message.clone()).into())
        }
    }
}

fn status(tx: &EtherscanTransaction) -> TransactionStatus {
    let failed = tx.is_error.as_deref() == Some("1") || tx.receipt_status.as_deref() == Some("0");
    if failed {
        TransactionStatus::Failed
    } else if tx.confirmations.as_deref() == Some("0") {
        TransactionStatus::Unconfirmed
    } else {
        TransactionStatus::Confirmed
    }
}

impl EtherscanMapper {
    pub fn new(chain: Blockchain) -> Self {
        Self {
            chain,
            counter: IndexCounter::default(),
        }
    }

    fn fee(&self, tx: &EtherscanTransaction) -> Fee {
        let units = tx
            .gas_price
            .parse::<u128>()
            .ok()
            .zip(tx.gas_used.parse::<u128>().ok())
            .and_then(|(price, used)| price.checked_mul(used))
            .unwrap_or(0);
        Fee {
            amount: Amount::coin_from_units(self.chain, units)
                .unwrap_or_else(|_| Amount::zero_coin(self.chain)),
            parameters: None,
        }
    }

    fn record(
        &mut self,
        tx: &EtherscanTransaction,
        wallet: &str,
        amount_type: &AmountType,
    ) -> Option<TransactionRecord> {
        let is_outgoing = tx.from.eq_ignore_ascii_case(wallet);
        if !is_outgoing && !tx.to.eq_ignore_ascii_case(wallet) {
            return None;
        }

        let value: Decimal = match amount_type {
            AmountType::Coin => parse_units(&tx.value, self.chain.decimal_count())?,
            AmountType::Token(token) => {
                let contract = tx.contract_address.as_deref()?;
                if !contract.eq_ignore_ascii_case(&token.contract_address) {
                    return None;
                }
                let decimals = tx
                    .token_decimal
                    .as_deref()
                    .and_then(|d| d.parse().ok())
                    .unwrap_or(token.decimal_count);
                let value = parse_units(&tx.value, decimals)?;
                if value.is_zero() {
                    tracing::debug!(hash = %tx.hash, "zero_value_token_transfer_filtered");
                    return None;
                }
                value
            }
        };

        let seconds: i64 = match tx.time_stamp.trim().parse() {
            Ok(seconds) => seconds,
            Err(e) => {
                tracing::warn!(
                    hash = %tx.hash,
                    time_stamp = %tx.time_stamp,
                    error = %e,
                    "etherscan_timestamp_invalid"
                );
                return None;
            }
        };

        let input = tx.input.as_deref().unwrap_or_default();
        let is_contract_call = matches!(amount_type, AmountType::Coin)
            && !input.trim_start_matches("0x").is_empty();
        let destination = if is_contract_call {
            DestinationAddress::Contract(tx.to.clone())
        } else {
            DestinationAddress::User(tx.to.clone())
        };

        Some(TransactionRecord {
            hash: tx.hash.clone(),
            index: self.counter.next(&tx.hash),
            source: SourceType::Single(Source {
                address: tx.from.clone(),
                amount: value,
            }),
            destination: DestinationType::Single(Destination {
                address: destination,
                amount: value,
            }),
            fee: self.fee(tx),
            status: status(tx),
            is_outgoing,
            transaction_type: classify(tx.method_id.as_deref(), tx.function_name.as_deref()),
            date: timestamp(seconds),
            is_spam: false,
        })
    }
}

impl TransactionHistoryMapper for EtherscanMapper {
    type Response = EtherscanResponse;

    fn map(
        &mut self,
        response: &EtherscanResponse,
        wallet_address: &str,
        amount_type: &AmountType,
    ) -> Result<Vec<TransactionRecord>> {
        let items = envelope_items(response)?;

        let mut records = Vec::with_capacity(items.len());
        for item in items {
            let tx: EtherscanTransaction = match serde_json::from_value(item.clone()) {
                Ok(tx) => tx,
                Err(e) => {
                    tracing::warn!(error = %e, "etherscan_item_dropped");
                    continue;
                }
            };
            if let Some(record) = self.record(&tx, wallet_address, amount_type) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn reset(&mut self) {
        self.counter.reset();
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;
    use crate::{
        domain::{Token, TransactionType},
        error::SdkError,
    };

    const WALLET: &str = "0x1111111111111111111111111111111111111111";
    const OTHER: &str = "0x2222222222222222222222222222222222222222";

    fn envelope(value: serde_json::Value) -> EtherscanResponse {
        serde_json::from_value(value).unwrap()
    }

    fn tx(hash: &str, from: &str, to: &str, value: &str) -> serde_json::Value {
        json!({
            "blockNumber": "100",
            "timeStamp": "1700000000",
            "hash": hash,
            "from": from,
            "to": to,
            "value": value,
            "gasPrice": "20000000000",
            "gasUsed": "21000",
            "isError": "0",
            "txreceipt_status": "1",
            "input": "0x",
            "contractAddress": "",
            "methodId": "0x",
            "functionName": "",
            "confirmations": "12"
        })
    }

    fn map(response: &EtherscanResponse, amount_type: &AmountType) -> Result<Vec<TransactionRecord>> {
        EtherscanMapper::new(Blockchain::Ethereum(false)).map(response, WALLET, amount_type)
    }

    #[test]
    fn test_rate_limit_message() {
        let response = envelope(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Max rate limit reached, please use API Key for higher rate limit"
        }));
        assert!(matches!(
            map(&response, &AmountType::Coin),
            Err(SdkError::Explorer(ExplorerApiError::RateLimited))
        ));
    }

    #[test]
    fn test_empty_page_is_end_of_history() {
        let response = envelope(json!({"status": "0", "message": "No transactions found", "result": []}));
        assert!(matches!(
            map(&response, &AmountType::Coin),
            Err(SdkError::Explorer(ExplorerApiError::EndOfHistory))
        ));
    }

    #[test]
    fn test_other_failures_are_unknown() {
        let response = envelope(json!({"status": "0", "message": "NOTOK", "result": "Invalid API Key"}));
        assert!(matches!(
            map(&response, &AmountType::Coin),
            Err(SdkError::Explorer(ExplorerApiError::Unknown(m))) if m.contains("Invalid API Key")
        ));
    }

    #[test]
    fn test_malformed_items_are_dropped_individually() {
        let response = envelope(json!({
            "status": "1",
            "message": "OK",
            "result": [
                tx("0x01", OTHER, WALLET, "1000000000000000000"),
                {"hash": "0x02"},
                tx("0x03", WALLET, OTHER, "not-a-number")
            ]
        }));
        let records = map(&response, &AmountType::Coin).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_amount(), Decimal::ONE);
        assert_eq!(records[0].fee.amount.value, Decimal::from_str("0.00042").unwrap());
        assert_eq!(records[0].status, TransactionStatus::Confirmed);
    }

    #[test]
    fn test_unparsable_timestamp_drops_item() {
        let mut bad = tx("0x0a", OTHER, WALLET, "1");
        bad["timeStamp"] = json!("not-a-time");
        let good = tx("0x0b", OTHER, WALLET, "1");

        let response = envelope(json!({"status": "1", "message": "OK", "result": [bad, good]}));
        let records = map(&response, &AmountType::Coin).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hash, "0x0b");
        assert_eq!(records[0].index, 0);
        assert!(records[0].date.is_some());
    }

    #[test]
    fn test_method_classification() {
        let mut by_id = tx("0x04", WALLET, OTHER, "0");
        by_id["methodId"] = json!("0xa9059cbb");
        by_id["functionName"] = json!("transfer(address _to, uint256 _value)");
        by_id["input"] = json!("0xa9059cbb00");
        let mut by_name = tx("0x05", WALLET, OTHER, "0");
        by_name["functionName"] = json!("approve(address _spender, uint256 _value)");
        let mut failed = tx("0x06", WALLET, OTHER, "0");
        failed["isError"] = json!("1");

        let response = envelope(json!({"status": "1", "message": "OK", "result": [by_id, by_name, failed]}));
        let records = map(&response, &AmountType::Coin).unwrap();

        assert_eq!(
            records[0].transaction_type,
            TransactionType::ContractMethodIdentifier("0xa9059cbb".into())
        );
        assert!(matches!(
            &records[0].destination,
            DestinationType::Single(Destination { address: DestinationAddress::Contract(_), .. })
        ));
        assert_eq!(
            records[1].transaction_type,
            TransactionType::ContractMethodName("approve".into())
        );
        assert_eq!(records[2].transaction_type, TransactionType::Transfer);
        assert_eq!(records[2].status, TransactionStatus::Failed);
    }

    #[test]
    fn test_token_mode_filters_contract_and_zero_value() {
        let usdt = "0xdac17f958d2ee523a2206206994597c13d831ec7";
        let mut leg = tx("0x07", OTHER, WALLET, "1500000");
        leg["contractAddress"] = json!(usdt);
        leg["tokenDecimal"] = json!("6");
        let mut zero = tx("0x08", OTHER, WALLET, "0");
        zero["contractAddress"] = json!(usdt);
        let mut foreign = tx("0x09", OTHER, WALLET, "5");
        foreign["contractAddress"] = json!(OTHER);

        let token = Token {
            name: "Tether".into(),
            symbol: "USDT".into(),
            contract_address: "0xdAC17F958D2ee523a2206206994597C13D831ec7".into(),
            decimal_count: 6,
            id: None,
        };
        let response = envelope(json!({"status": "1", "message": "OK", "result": [leg, zero, foreign]}));
        let records = map(&response, &AmountType::Token(token)).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_amount(), Decimal::from_str("1.5").unwrap());
    }

    trait SourceAmount {
        fn source_amount(&self) -> Decimal;
    }

    impl SourceAmount for TransactionRecord {
        fn source_amount(&self) -> Decimal {
            match &self.source {
                SourceType::Single(source) => source.amount,
                SourceType::Multiple(sources) => sources.iter().map(|s| s.amount).sum(),
            }
        }
    }
}
