//! Tron BlockBook 历史映射
//!
//! 合约类型决定交易分类；哈希去掉 `0x` 前缀后对外展示。

use super::{
    blockbook::{receipt_status, recorded_fee, token_records, TokenLegContext},
    method_id_from_data, parse_units, timestamp, IndexCounter, TransactionHistoryMapper,
};
use crate::{
    domain::{
        AmountType, Blockchain, Destination, DestinationAddress, DestinationType, Source,
        SourceType, StakingKind, TransactionRecord, TransactionType,
    },
    error::Result,
    service::network::blockbook::{BlockBookAddressResponse, BlockBookTransaction},
};

const TRANSFER_CONTRACT: i64 = 1;
const TRANSFER_ASSET_CONTRACT: i64 = 2;
const VOTE_WITNESS_CONTRACT: i64 = 4;
const WITHDRAW_BALANCE_CONTRACT: i64 = 13;
const TRIGGER_SMART_CONTRACT: i64 = 31;
const FREEZE_BALANCE_V2_CONTRACT: i64 = 54;
const UNFREEZE_BALANCE_V2_CONTRACT: i64 = 55;
const WITHDRAW_EXPIRE_UNFREEZE_CONTRACT: i64 = 56;

fn staking(kind: StakingKind, validator: Option<String>) -> TransactionType {
    TransactionType::Staking { kind, validator }
}

fn transaction_type(tx: &BlockBookTransaction) -> TransactionType {
    match tx.contract_type {
        None | Some(TRANSFER_CONTRACT) | Some(TRANSFER_ASSET_CONTRACT) => TransactionType::Transfer,
        Some(VOTE_WITNESS_CONTRACT) => {
            // 多个投票对象时取字典序第一个
            let validator = tx
                .vote_list
                .as_ref()
                .and_then(|votes| votes.keys().min().cloned());
            staking(StakingKind::Vote, validator)
        }
        Some(WITHDRAW_BALANCE_CONTRACT) => staking(StakingKind::ClaimRewards, None),
        Some(FREEZE_BALANCE_V2_CONTRACT) => staking(StakingKind::Stake, None),
        Some(UNFREEZE_BALANCE_V2_CONTRACT) => staking(StakingKind::Unstake, None),
        Some(WITHDRAW_EXPIRE_UNFREEZE_CONTRACT) => staking(StakingKind::Withdraw, None),
        Some(TRIGGER_SMART_CONTRACT) => tx
            .ethereum_specific
            .as_ref()
            .and_then(|s| s.data.as_deref())
            .and_then(method_id_from_data)
            .map(TransactionType::ContractMethodIdentifier)
            .unwrap_or(TransactionType::Transfer),
        Some(other) => TransactionType::ContractMethodIdentifier(
            tx.contract_name
                .clone()
                .unwrap_or_else(|| other.to_string()),
        ),
    }
}

pub(crate) fn strip_hash_prefix(hash: &str) -> String {
    hash.strip_prefix("0x").unwrap_or(hash).to_string()
}

#[derive(Debug)]
pub struct BlockBookTronMapper {
    chain: Blockchain,
    counter: IndexCounter,
}

impl BlockBookTronMapper {
    pub fn new(chain: Blockchain) -> Self {
        Self {
            chain,
            counter: IndexCounter::default(),
        }
    }

    fn coin_record(&mut self, tx: &BlockBookTransaction, wallet: &str) -> Option<TransactionRecord> {
        let from = tx
            .from_address
            .clone()
            .or_else(|| tx.vin.first()?.addresses.first().cloned())?;
        let to = tx
            .to_address
            .clone()
            .or_else(|| tx.vout.first()?.addresses.first().cloned())
            .unwrap_or_default();

        let is_outgoing = from == wallet;
        if !is_outgoing && to != wallet {
            return None;
        }

        let value = parse_units(&tx.value, self.chain.decimal_count())?;
        let hash = strip_hash_prefix(&tx.txid);
        let fee = recorded_fee(self.chain, &hash, &tx.fees)?;
        let destination = if tx.contract_type == Some(TRIGGER_SMART_CONTRACT) {
            DestinationAddress::Contract(to)
        } else {
            DestinationAddress::User(to)
        };

        Some(TransactionRecord {
            index: self.counter.next(&hash),
            hash,
            source: SourceType::Single(Source {
                address: from,
                amount: value,
            }),
            destination: DestinationType::Single(Destination {
                address: destination,
                amount: value,
            }),
            fee,
            status: receipt_status(
                tx.tron_tx_receipt.as_ref().and_then(|r| r.status),
                tx.confirmations,
            ),
            is_outgoing,
            transaction_type: transaction_type(tx),
            date: timestamp(tx.block_time),
            is_spam: false,
        })
    }
}

impl TransactionHistoryMapper for BlockBookTronMapper {
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
                AmountType::Coin => {
                    if let Some(record) = self.coin_record(tx, wallet_address) {
                        records.push(record);
                    }
                }
                AmountType::Token(token) => {
                    let status = receipt_status(
                        tx.tron_tx_receipt.as_ref().and_then(|r| r.status),
                        tx.confirmations,
                    );
                    let hash = strip_hash_prefix(&tx.txid);
                    records.extend(token_records(
                        &mut self.counter,
                        self.chain,
                        tx,
                        wallet_address,
                        token,
                        TokenLegContext {
                            hash: &hash,
                            status,
                            transaction_type: transaction_type(tx),
                        },
                    ));
                }
            }
        }
        Ok(records)
    }

    /// 代币模式按该代币的转账次数计算页数
    fn total_pages(&self, response: &BlockBookAddressResponse, amount_type: &AmountType) -> Option<u32> {
        let AmountType::Token(token) = amount_type else {
            return response.total_pages;
        };
        let transfers = response
            .tokens
            .iter()
            .flatten()
            .find(|t| t.matches_contract(&token.contract_address))
            .and_then(|t| t.transfers);
        match (transfers, response.items_on_page) {
            (Some(transfers), Some(per_page)) if per_page > 0 => {
                Some(transfers.div_ceil(per_page))
            }
            _ => response.total_pages,
        }
    }

    fn reset(&mut self) {
        self.counter.reset();
    }
}
