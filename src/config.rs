// 7.0 config.rs: per-market risk settings in one place. margin limit, liquidation threshold,
// twap windows, fees, penalty. 7.1 has environment presets, 7.2 validation.

use crate::types::Bps;
use serde::{Deserialize, Serialize};

/** 7.1: trading fee in bps of the traded amount, and the cut of it that feeds insurance */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    pub trade_fee: Bps,
    pub insurance_share: Bps,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            trade_fee: Bps(30),         // 0.3%
            insurance_share: Bps(3_333), // a third to insurance, rest to treasury
        }
    }
}

// Which amount a price limit is checked against when the received asset is taxed on buy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxOrdering {
    // limit applies to what actually lands after buy tax
    #[default]
    NetOfTax,
    // limit applies to the pair's quote; buy tax comes off afterwards
    GrossOfTax,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    // Worst-view ratio an open or add-margin must leave behind
    pub margin_limit: Bps,
    // Worst-view ratio under which anyone may liquidate
    pub liquidate_threshold: Bps,
    // Seconds covered by the short ("cAvg") and long ("hAvg") averages
    pub price_window_short: u64,
    pub price_window_long: u64,
    // Max spot deviation from the short average tolerated on open
    pub max_price_deviation: Bps,
    pub fees: FeeConfig,
    // Share of positive liquidation proceeds kept by the insurance fund
    pub liquidation_penalty: Bps,
    pub tax_ordering: TaxOrdering,
    // Hard cap on retained oracle samples
    pub max_observations: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            margin_limit: Bps(3_000),
            liquidate_threshold: Bps(2_000),
            price_window_short: 60,
            price_window_long: 3_600,
            max_price_deviation: Bps(1_000),
            fees: FeeConfig::default(),
            liquidation_penalty: Bps(200),
            tax_ordering: TaxOrdering::NetOfTax,
            max_observations: 256,
        }
    }
}

impl MarketConfig {
    // Looser limits for test deployments
    pub fn testnet() -> Self {
        Self {
            margin_limit: Bps(2_000),
            liquidate_threshold: Bps(1_000),
            price_window_short: 30,
            price_window_long: 600,
            max_price_deviation: Bps(2_000),
            ..Self::default()
        }
    }

    // Wider buffers and longer windows
    pub fn mainnet_conservative() -> Self {
        Self {
            margin_limit: Bps(5_000),
            liquidate_threshold: Bps(2_500),
            price_window_short: 300,
            price_window_long: 7_200,
            max_price_deviation: Bps(500),
            liquidation_penalty: Bps(300),
            ..Self::default()
        }
    }

    /** 7.2: internal consistency. a market is never listed with an invalid config */
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.liquidate_threshold >= self.margin_limit {
            return Err(ConfigError::InvalidMargin {
                reason: format!(
                    "liquidate threshold {} must be below margin limit {}",
                    self.liquidate_threshold, self.margin_limit
                ),
            });
        }

        if self.price_window_short == 0 || self.price_window_short > self.price_window_long {
            return Err(ConfigError::InvalidWindow {
                reason: "need 0 < short window <= long window".to_string(),
            });
        }

        for (name, bps) in [
            ("max_price_deviation", self.max_price_deviation),
            ("trade_fee", self.fees.trade_fee),
            ("insurance_share", self.fees.insurance_share),
            ("liquidation_penalty", self.liquidation_penalty),
        ] {
            if !bps.is_valid() {
                return Err(ConfigError::InvalidFees {
                    reason: format!("{name} of {bps} exceeds 10000bps"),
                });
            }
        }

        if self.max_observations < 2 {
            return Err(ConfigError::InvalidWindow {
                reason: "oracle needs at least 2 retained samples".to_string(),
            });
        }

        // thinned to capacity, samples sit about long / (capacity - 1) apart
        let spacing = self
            .price_window_long
            .div_ceil((self.max_observations - 1) as u64);
        if spacing > self.price_window_short {
            return Err(ConfigError::InvalidWindow {
                reason: format!(
                    "{} samples over {}s are {}s apart, wider than the {}s short window",
                    self.max_observations, self.price_window_long, spacing, self.price_window_short
                ),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid margin settings: {reason}")]
    InvalidMargin { reason: String },
    #[error("invalid price window: {reason}")]
    InvalidWindow { reason: String },
    #[error("invalid fee settings: {reason}")]
    InvalidFees { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> MarketConfig {
        match self {
            Environment::Development => MarketConfig::default(),
            Environment::Testnet => MarketConfig::testnet(),
            Environment::Mainnet => MarketConfig::mainnet_conservative(),
        }
    }
}
