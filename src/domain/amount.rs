//! 金额与费用模型
//!
//! Amount 始终带上币种身份，不在链族之间隐式换算单位。

use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};

use super::chain_config::Blockchain;
use crate::error::{Result, SdkError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub name: String,
    pub symbol: String,
    pub contract_address: String,
    pub decimal_count: u32,
    /// 部分浏览器用 id 而不是合约地址标识代币（Tron TRC10）
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountType {
    Coin,
    Token(Token),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    pub amount_type: AmountType,
    pub currency_symbol: String,
    pub value: Decimal,
    pub decimals: u32,
}

impl Amount {
    pub fn coin(chain: Blockchain, value: Decimal) -> Self {
        Self {
            amount_type: AmountType::Coin,
            currency_symbol: chain.currency_symbol().to_string(),
            value,
            decimals: chain.decimal_count(),
        }
    }

    pub fn token(token: Token, value: Decimal) -> Self {
        Self {
            currency_symbol: token.symbol.clone(),
            decimals: token.decimal_count,
            amount_type: AmountType::Token(token),
            value,
        }
    }

    pub fn zero_coin(chain: Blockchain) -> Self {
        Self::coin(chain, Decimal::ZERO)
    }

    /// 从最小单位构造
    pub fn coin_from_units(chain: Blockchain, units: u128) -> Result<Self> {
        Ok(Self::coin(chain, units_to_decimal(units, chain.decimal_count())?))
    }

    /// 转换为最小单位；负数或超出精度的小数部分视为无效
    pub fn to_smallest_unit(&self) -> Result<u128> {
        decimal_to_units(self.value, self.decimals)
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn checked_add(&self, other: &Amount) -> Result<Amount> {
        if self.amount_type != other.amount_type {
            return Err(SdkError::InvalidAmount(format!(
                "cannot add {} to {}",
                other.currency_symbol, self.currency_symbol
            )));
        }
        let value = self
            .value
            .checked_add(other.value)
            .ok_or_else(|| SdkError::InvalidAmount("overflow".into()))?;
        Ok(Amount {
            value,
            ..self.clone()
        })
    }
}

/// 最小单位 -> 十进制
pub fn units_to_decimal(units: u128, decimals: u32) -> Result<Decimal> {
    let units = i128::try_from(units).map_err(|_| SdkError::InvalidAmount(units.to_string()))?;
    Decimal::try_from_i128_with_scale(units, decimals)
        .map(|d| d.normalize())
        .map_err(|e| SdkError::InvalidAmount(e.to_string()))
}

/// 十进制 -> 最小单位
pub fn decimal_to_units(value: Decimal, decimals: u32) -> Result<u128> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(SdkError::InvalidAmount(value.to_string()));
    }
    if decimals > 19 {
        return Err(SdkError::InvalidAmount(format!("unsupported decimals {decimals}")));
    }
    let factor = Decimal::from(10u64.pow(decimals));
    let scaled = value
        .checked_mul(factor)
        .ok_or_else(|| SdkError::InvalidAmount(value.to_string()))?;
    if scaled.fract() != Decimal::ZERO {
        return Err(SdkError::InvalidAmount(format!(
            "{value} has more than {decimals} decimals"
        )));
    }
    scaled
        .trunc()
        .to_u128()
        .ok_or_else(|| SdkError::InvalidAmount(value.to_string()))
}

/// 链相关的费用参数，交易构建器只使用这里的值签名
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeeParameters {
    EthereumLegacy {
        gas_limit: u64,
        gas_price: u128,
    },
    EthereumEip1559 {
        gas_limit: u64,
        max_fee_per_gas: u128,
        priority_fee: u128,
    },
    Utxo {
        rate_per_byte: u64,
    },
    Cardano {
        fee: u64,
    },
}

impl FeeParameters {
    /// 按参数计算的最小单位费用
    pub fn fee_units(&self) -> u128 {
        match self {
            Self::EthereumLegacy {
                gas_limit,
                gas_price,
            } => u128::from(*gas_limit) * gas_price,
            Self::EthereumEip1559 {
                gas_limit,
                max_fee_per_gas,
                ..
            } => u128::from(*gas_limit) * max_fee_per_gas,
            Self::Utxo { .. } => 0,
            Self::Cardano { fee } => u128::from(*fee),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fee {
    pub amount: Amount,
    pub parameters: Option<FeeParameters>,
}

impl Fee {
    pub fn new(amount: Amount, parameters: FeeParameters) -> Self {
        Self {
            amount,
            parameters: Some(parameters),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_units_round_trip() {
        let amount = Amount::coin_from_units(Blockchain::Bitcoin(false), 150_000_000).unwrap();
        assert_eq!(amount.value, Decimal::from_str("1.5").unwrap());
        assert_eq!(amount.to_smallest_unit().unwrap(), 150_000_000);
    }

    #[test]
    fn test_wei_precision() {
        let amount = Amount::coin_from_units(Blockchain::Ethereum(false), 1).unwrap();
        assert_eq!(amount.value, Decimal::from_str("0.000000000000000001").unwrap());
        assert_eq!(amount.to_smallest_unit().unwrap(), 1);
    }

    #[test]
    fn test_negative_and_fractional_units_rejected() {
        let chain = Blockchain::Bitcoin(false);
        assert!(Amount::coin(chain, Decimal::from(-1)).to_smallest_unit().is_err());
        let too_precise = Decimal::from_str("0.000000001").unwrap();
        assert!(Amount::coin(chain, too_precise).to_smallest_unit().is_err());
    }

    #[test]
    fn test_add_requires_same_currency() {
        let chain = Blockchain::Ethereum(false);
        let token = Token {
            name: "Tether".into(),
            symbol: "USDT".into(),
            contract_address: "0xdac17f958d2ee523a2206206994597c13d831ec7".into(),
            decimal_count: 6,
            id: None,
        };
        let coin = Amount::coin(chain, Decimal::ONE);
        let usdt = Amount::token(token, Decimal::ONE);
        assert!(coin.checked_add(&usdt).is_err());
        assert_eq!(
            coin.checked_add(&coin).unwrap().value,
            Decimal::from(2)
        );
    }

    #[test]
    fn test_fee_units() {
        let legacy = FeeParameters::EthereumLegacy {
            gas_limit: 21_000,
            gas_price: 20_000_000_000,
        };
        assert_eq!(legacy.fee_units(), 420_000_000_000_000);
    }
}
