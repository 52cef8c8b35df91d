//! BlockBook 历史映射（EVM 与 UTXO 链）

use rust_decimal::Decimal;

use super::{
    classify, method_id_from_data, parse_units, timestamp, IndexCounter,
    TransactionHistoryMapper,
};
use crate::{
    domain::{
        Amount, AmountType, Blockchain, Destination, DestinationAddress, DestinationType, Fee,
        Source, SourceType, Token, TransactionRecord, TransactionStatus, TransactionType,
    },
    error::Result,
    service::network::blockbook::{
        BlockBookAddressResponse, BlockBookTokenTransfer, BlockBookTransaction, ReceiptStatus,
    },
};

pub(crate) fn receipt_status(status: Option<ReceiptStatus>, confirmations: u64) -> TransactionStatus {
    match status {
        Some(ReceiptStatus::Ok) => TransactionStatus::Confirmed,
        Some(ReceiptStatus::Failure) => TransactionStatus::Failed,
        Some(ReceiptStatus::Pending) => TransactionStatus::Unconfirmed,
        None if confirmations > 0 => TransactionStatus::Confirmed,
        None => TransactionStatus::Unconfirmed,
    }
}

/// 浏览器记录的手续费（币种最小单位）；缺失为 0，非法时返回 None，整条记录被丢弃
pub(crate) fn recorded_fee(chain: Blockchain, hash: &str, fees: &str) -> Option<Fee> {
    let value = if fees.trim().is_empty() {
        Decimal::ZERO
    } else {
        match parse_units(fees, chain.decimal_count()) {
            Some(value) => value,
            None => {
                tracing::warn!(hash = %hash, fees = %fees, "recorded_fee_invalid");
                return None;
            }
        }
    };
    Some(Fee {
        amount: Amount::coin(chain, value),
        parameters: None,
    })
}

/// EVM 交易分类：显式方法 id、调用数据前缀、方法名，最后为普通转账
pub(crate) fn evm_transaction_type(tx: &BlockBookTransaction) -> TransactionType {
    let specific = tx.ethereum_specific.as_ref();
    let data = specific
        .and_then(|s| s.data.as_deref())
        .unwrap_or_default();
    let parsed = specific.and_then(|s| s.parsed_data.as_ref());
    let method_id = parsed
        .and_then(|p| p.method_id.clone())
        .filter(|id| !id.is_empty())
        .or_else(|| method_id_from_data(data));
    classify(
        method_id.as_deref(),
        parsed.and_then(|p| p.name.as_deref()),
    )
}

/// 代币转账是否属于指定代币
pub(crate) fn transfer_matches(transfer: &BlockBookTokenTransfer, token: &Token) -> bool {
    transfer.contract_address().map_or(false, |contract| {
        contract.eq_ignore_ascii_case(&token.contract_address)
            || token
                .id
                .as_deref()
                .map_or(false, |id| contract.eq_ignore_ascii_case(id))
    })
}

/// 代币转账金额，优先使用转账自身的精度
pub(crate) fn transfer_amount(transfer: &BlockBookTokenTransfer, token: &Token) -> Option<Decimal> {
    let decimals = if transfer.decimals > 0 {
        transfer.decimals
    } else {
        token.decimal_count
    };
    parse_units(transfer.value.as_deref()?, decimals)
}

/// 钱包作为一方参与的代币转账腿；自转与无关转账返回 None
pub(crate) fn token_leg_direction(transfer: &BlockBookTokenTransfer, wallet: &str) -> Option<bool> {
    let from_wallet = transfer.from.eq_ignore_ascii_case(wallet);
    let to_wallet = transfer.to.eq_ignore_ascii_case(wallet);
    match (from_wallet, to_wallet) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

/// 金额为零、且仅含零金额代币转账的交易
pub(crate) fn is_zero_value_token_spam(tx: &BlockBookTransaction, value: Decimal) -> bool {
    if !value.is_zero() {
        return false;
    }
    match tx.token_transfers.as_deref() {
        Some(transfers) if !transfers.is_empty() => transfers.iter().all(|t| {
            t.value
                .as_deref()
                .and_then(|v| v.trim().parse::<u128>().ok())
                .map_or(true, |v| v == 0)
        }),
        _ => false,
    }
}

/// 代币腿共享的交易级属性
pub(crate) struct TokenLegContext<'a> {
    pub hash: &'a str,
    pub status: TransactionStatus,
    pub transaction_type: TransactionType,
}

/// 单笔交易中与钱包相关的指定代币转账腿，零金额腿视为垃圾被排除
pub(crate) fn token_records(
    counter: &mut IndexCounter,
    chain: Blockchain,
    tx: &BlockBookTransaction,
    wallet: &str,
    token: &Token,
    context: TokenLegContext<'_>,
) -> Vec<TransactionRecord> {
    let TokenLegContext {
        hash,
        status,
        transaction_type,
    } = context;
    let Some(fee) = recorded_fee(chain, hash, &tx.fees) else {
        return Vec::new();
    };
    let mut records = Vec::new();
    for transfer in tx.token_transfers.iter().flatten() {
        if !transfer_matches(transfer, token) {
            continue;
        }
        let Some(is_outgoing) = token_leg_direction(transfer, wallet) else {
            continue;
        };
        let Some(amount) = transfer_amount(transfer, token) else {
            tracing::debug!(hash = %hash, "token_transfer_dropped_invalid_value");
            continue;
        };
        if amount.is_zero() {
            tracing::debug!(hash = %hash, from = %transfer.from, "zero_value_token_transfer_filtered");
            continue;
        }
        records.push(TransactionRecord {
            hash: hash.to_string(),
            index: counter.next(hash),
            source: SourceType::Single(Source {
                address: transfer.from.clone(),
                amount,
            }),
            destination: DestinationType::Single(Destination {
                address: DestinationAddress::User(transfer.to.clone()),
                amount,
            }),
            fee: fee.clone(),
            status,
            is_outgoing,
            transaction_type: transaction_type.clone(),
            date: timestamp(tx.block_time),
            is_spam: false,
        });
    }
    records
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EVM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
pub struct BlockBookEvmMapper {
    chain: Blockchain,
    counter: IndexCounter,
}

impl BlockBookEvmMapper {
    pub fn new(chain: Blockchain) -> Self {
        Self {
            chain,
            counter: IndexCounter::default(),
        }
    }

    fn coin_record(&mut self, tx: &BlockBookTransaction, wallet: &str) -> Option<TransactionRecord> {
        let from = tx.vin.first()?.addresses.first()?;
        let to = tx.vout.first()?.addresses.first()?;
        let is_outgoing = from.eq_ignore_ascii_case(wallet);
        if !is_outgoing && !to.eq_ignore_ascii_case(wallet) {
            return None;
        }

        let value = parse_units(&tx.value, self.chain.decimal_count())?;
        if is_zero_value_token_spam(tx, value) {
            tracing::debug!(hash = %tx.txid, "zero_value_token_spam_filtered");
            return None;
        }

        let fee = recorded_fee(self.chain, &tx.txid, &tx.fees)?;
        let specific = tx.ethereum_specific.as_ref();
        let data = specific
            .and_then(|s| s.data.as_deref())
            .unwrap_or_default();
        let has_transfers = tx.token_transfers.as_ref().map_or(false, |t| !t.is_empty());
        let is_contract = !data.trim_start_matches("0x").is_empty() || has_transfers;

        let destination = if is_contract {
            DestinationAddress::Contract(to.clone())
        } else {
            DestinationAddress::User(to.clone())
        };

        Some(TransactionRecord {
            hash: tx.txid.clone(),
            index: self.counter.next(&tx.txid),
            source: SourceType::Single(Source {
                address: from.clone(),
                amount: value,
            }),
            destination: DestinationType::Single(Destination {
                address: destination,
                amount: value,
            }),
            fee,
            status: receipt_status(specific.and_then(|s| s.status), tx.confirmations),
            is_outgoing,
            transaction_type: evm_transaction_type(tx),
            date: timestamp(tx.block_time),
            is_spam: false,
        })
    }
}

impl TransactionHistoryMapper for BlockBookEvmMapper {
    type Response = BlockBookAddressResponse;

    fn map(
        &mut self,
        response: &BlockBookAddressResponse,
        wallet_address: &str,
        amount_type: &AmountType,
    ) -> Result<Vec<TransactionRecord>> {
        let mut records = Vec::new();
        for tx in response.transactions.iter().flatten() {
            match amount_type {
                AmountType::Coin => match self.coin_record(tx, wallet_address) {
                    Some(record) => records.push(record),
                    None => tracing::trace!(hash = %tx.txid, "evm_transaction_skipped"),
                },
                AmountType::Token(token) => {
                    let status = receipt_status(
                        tx.ethereum_specific.as_ref().and_then(|s| s.status),
                        tx.confirmations,
                    );
                    records.extend(token_records(
                        &mut self.counter,
                        self.chain,
                        tx,
                        wallet_address,
                        token,
                        TokenLegContext {
                            hash: &tx.txid,
                            status,
                            transaction_type: evm_transaction_type(tx),
                        },
                    ));
                }
            }
        }
        Ok(records)
    }

    fn total_pages(&self, response: &BlockBookAddressResponse, _amount_type: &AmountType) -> Option<u32> {
        response.total_pages
    }

    fn reset(&mut self) {
        self.counter.reset();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// UTXO
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
pub struct BlockBookUtxoMapper {
    chain: Blockchain,
    counter: IndexCounter,
}

impl BlockBookUtxoMapper {
    pub fn new(chain: Blockchain) -> Self {
        Self {
            chain,
            counter: IndexCounter::default(),
        }
    }

    fn record(&mut self, tx: &BlockBookTransaction, wallet: &str) -> Option<TransactionRecord> {
        let decimals = self.chain.decimal_count();
        let fee = recorded_fee(self.chain, &tx.txid, &tx.fees)?;

        let mut sources = Vec::with_capacity(tx.vin.len());
        for vin in &tx.vin {
            let Some(address) = vin.addresses.first().cloned() else {
                continue;
            };
            let amount = parse_units(vin.value.as_deref().unwrap_or("0"), decimals)?;
            sources.push(Source { address, amount });
        }

        let mut outputs = Vec::with_capacity(tx.vout.len());
        for vout in &tx.vout {
            let Some(address) = vout.addresses.first() else {
                // OP_RETURN 等无地址输出
                continue;
            };
            let amount = parse_units(vout.value.as_deref().unwrap_or("0"), decimals)?;
            outputs.push(Destination {
                address: DestinationAddress::User(address.clone()),
                amount,
            });
        }

        let is_outgoing = sources.iter().any(|s| s.address == wallet);
        let (mine, others): (Vec<_>, Vec<_>) = outputs
            .into_iter()
            .partition(|d| d.address.value() == wallet);

        let destinations = if is_outgoing {
            if others.is_empty() {
                mine
            } else {
                others
            }
        } else if mine.is_empty() {
            return None;
        } else {
            mine
        };

        Some(TransactionRecord {
            hash: tx.txid.clone(),
            index: self.counter.next(&tx.txid),
            source: single_or_multiple_sources(sources),
            destination: single_or_multiple_destinations(destinations),
            fee,
            status: receipt_status(None, tx.confirmations),
            is_outgoing,
            transaction_type: TransactionType::Transfer,
            date: timestamp(tx.block_time),
            is_spam: false,
        })
    }
}

fn single_or_multiple_sources(mut sources: Vec<Source>) -> SourceType {
    if sources.len() == 1 {
        SourceType::Single(sources.remove(0))
    } else {
        SourceType::Multiple(sources)
    }
}

fn single_or_multiple_destinations(mut destinations: Vec<Destination>) -> DestinationType {
    if destinations.len() == 1 {
        DestinationType::Single(destinations.remove(0))
    } else {
        DestinationType::Multiple(destinations)
    }
}

impl TransactionHistoryMapper for BlockBookUtxoMapper {
    type Response = BlockBookAddressResponse;

    fn map(
        &mut self,
        response: &BlockBookAddressResponse,
        wallet_address: &str,
        _amount_type: &AmountType,
    ) -> Result<Vec<TransactionRecord>> {
        let mut records = Vec::new();
        for tx in response.transactions.iter().flatten() {
            match self.record(tx, wallet_address) {
                Some(record) => records.push(record),
                None => tracing::trace!(hash = %tx.txid, "utxo_transaction_skipped"),
            }
        }
        Ok(records)
    }

    fn total_pages(&self, response: &BlockBookAddressResponse, _amount_type: &AmountType) -> Option<u32> {
        response.total_pages
    }

    fn reset(&mut self) {
        self.counter.reset();
    }
}
