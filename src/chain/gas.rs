//! Gas Details
//!
//! Two fee models: legacy single `gasPrice` and EIP-1559 dual fee fields.
//! The model is fixed once per workflow run; every stage that builds gas
//! details uses the same [`GasType`].

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::FeeData;
use crate::core_types::Amount;

/// Fallback when the node reports no gas price (30 gwei)
pub fn default_gas_price() -> Amount {
    BigUint::from(30_000_000_000u64)
}

/// Fallback when the node reports no priority fee (1.5 gwei)
pub fn default_priority_fee() -> Amount {
    BigUint::from(1_500_000_000u64)
}

/// EVM fee model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasType {
    /// Type 0 / type 1 transactions
    Legacy,
    /// Type 2 transactions
    Eip1559,
}

impl GasType {
    /// EVM transaction type byte
    pub fn evm_type(&self) -> u8 {
        match self {
            GasType::Legacy => 0,
            GasType::Eip1559 => 2,
        }
    }
}

impl fmt::Display for GasType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GasType::Legacy => f.write_str("legacy"),
            GasType::Eip1559 => f.write_str("eip1559"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasDetails {
    Legacy {
        gas_estimate: Amount,
        gas_price: Amount,
    },
    Eip1559 {
        gas_estimate: Amount,
        max_fee_per_gas: Amount,
        max_priority_fee_per_gas: Amount,
    },
}

impl GasDetails {
    /// Build gas details of `gas_type` from fresh fee data, filling gaps with defaults
    pub fn from_fee_data(gas_type: GasType, fee: &FeeData, gas_estimate: Amount) -> Self {
        match gas_type {
            GasType::Eip1559 => GasDetails::Eip1559 {
                gas_estimate,
                max_fee_per_gas: fee.max_fee_per_gas.clone().unwrap_or_else(default_gas_price),
                max_priority_fee_per_gas: fee
                    .max_priority_fee_per_gas
                    .clone()
                    .unwrap_or_else(default_priority_fee),
            },
            GasType::Legacy => GasDetails::Legacy {
                gas_estimate,
                gas_price: fee.gas_price.clone().unwrap_or_else(default_gas_price),
            },
        }
    }

    pub fn gas_type(&self) -> GasType {
        match self {
            GasDetails::Legacy { .. } => GasType::Legacy,
            GasDetails::Eip1559 { .. } => GasType::Eip1559,
        }
    }

    pub fn gas_estimate(&self) -> &Amount {
        match self {
            GasDetails::Legacy { gas_estimate, .. } | GasDetails::Eip1559 { gas_estimate, .. } => {
                gas_estimate
            }
        }
    }

    /// Overall batch minimum gas price: `gasPrice` or `maxFeePerGas`
    pub fn min_gas_price(&self) -> &Amount {
        match self {
            GasDetails::Legacy { gas_price, .. } => gas_price,
            GasDetails::Eip1559 {
                max_fee_per_gas, ..
            } => max_fee_per_gas,
        }
    }
}

/// `estimate * (100 + buffer_percent) / 100`
pub fn buffered_gas_limit(estimate: &Amount, buffer_percent: u32) -> Amount {
    estimate * BigUint::from(100 + buffer_percent) / BigUint::from(100u32)
}
