//! Margin ratio calculation.
//!
//! A position's margin ratio is its equity over its debt, both valued in the
//! borrowed asset, in basis points:
//!
//! ```text
//! ratio = (value_of_held(price) - borrowed) * 10_000 / borrowed
//! ```
//!
//! It is computed once per oracle view and never stored. Callers get all three
//! ratios and must pick one with an explicit combinator; open and liquidation
//! checks both use the worst of the three.

use crate::math::mul_div;
use crate::oracle::PriceViews;
use crate::position::Position;
use crate::types::{Amount, Bps, Direction, Price, BPS_SCALE};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarginRatio(pub u64);

impl MarginRatio {
    pub const ZERO: MarginRatio = MarginRatio(0);
    /// nothing borrowed, nothing to liquidate
    pub const UNLEVERED: MarginRatio = MarginRatio(u64::MAX);

    pub fn bps(&self) -> u64 {
        self.0
    }

    pub fn is_below(&self, limit: Bps) -> bool {
        self.0 < limit.0 as u64
    }

    pub fn as_fraction(&self) -> Decimal {
        Decimal::new(self.0.min(i64::MAX as u64) as i64, 4)
    }
}

impl fmt::Display for MarginRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::UNLEVERED {
            write!(f, "unlevered")
        } else {
            write!(f, "{}bps", self.0)
        }
    }
}

/// One margin ratio per oracle view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginRatios {
    pub current: MarginRatio,
    pub c_avg: MarginRatio,
    pub h_avg: MarginRatio,
}

impl MarginRatios {
    /// Most liquidation-favoring view.
    pub fn worst(&self) -> MarginRatio {
        self.current.min(self.c_avg).min(self.h_avg)
    }

    pub fn best(&self) -> MarginRatio {
        self.current.max(self.c_avg).max(self.h_avg)
    }
}

/// Value of `held` in the borrowed asset at `price` (token1 per token0).
/// a zero price makes token1 holdings unbounded in token0 terms.
pub fn held_value(direction: Direction, held: Amount, price: Price) -> Amount {
    let value = match direction {
        Direction::Long0 => price.apply(held),
        Direction::Short0 => price.apply_inverse(held),
    };
    value.unwrap_or(Amount::MAX)
}

pub fn margin_ratio(direction: Direction, position: &Position, price: Price) -> MarginRatio {
    if position.borrowed == 0 {
        return MarginRatio::UNLEVERED;
    }
    let value = held_value(direction, position.held, price);
    if value <= position.borrowed {
        return MarginRatio::ZERO;
    }
    let ratio = mul_div(value - position.borrowed, BPS_SCALE, position.borrowed).unwrap_or(u128::MAX);
    MarginRatio(ratio.min(u64::MAX as u128 - 1) as u64)
}

pub fn margin_ratios(direction: Direction, position: &Position, views: &PriceViews) -> MarginRatios {
    MarginRatios {
        current: margin_ratio(direction, position, views.current),
        c_avg: margin_ratio(direction, position, views.avg_short),
        h_avg: margin_ratio(direction, position, views.avg_long),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginStatus {
    /// worst view at or above the margin limit: may add exposure
    Healthy,
    /// between liquidation threshold and margin limit
    Warning,
    Liquidatable,
}

pub fn evaluate_margin_status(ratios: &MarginRatios, margin_limit: Bps, liquidate_threshold: Bps) -> MarginStatus {
    let worst = ratios.worst();
    if worst.is_below(liquidate_threshold) {
        MarginStatus::Liquidatable
    } else if worst.is_below(margin_limit) {
        MarginStatus::Warning
    } else {
        MarginStatus::Healthy
    }
}
