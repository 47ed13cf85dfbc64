// 1.0: all the primitives live here. ids, token sides, directions, prices, bps, timestamps.
// each is a newtype so the compiler catches mixups between a price and an amount.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token quantity in base units. 1e18 = one whole 18-decimal token.
pub type Amount = u128;

/// Fixed-point scale shared by every `Price`.
pub const PRICE_SCALE: u128 = 1_000_000_000_000_000_000;

/// Denominator for every basis-point quantity.
pub const BPS_SCALE: u128 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraderId(pub u64);

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pair#{}", self.0)
    }
}

impl fmt::Display for TraderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trader#{}", self.0)
    }
}

/// Holders of token balances inside a market's venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Address {
    Trader(TraderId),
    /// custody of the margin engine: held assets, insurance, fees
    Engine,
    /// the AMM pair contract
    Pair,
    /// lending pool for the given asset side
    Pool(TokenSide),
    /// where transfer taxes end up
    TaxCollector,
}

// 1.1: the two assets of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TokenSide {
    Token0,
    Token1,
}

impl TokenSide {
    pub fn opposite(&self) -> Self {
        match self {
            TokenSide::Token0 => TokenSide::Token1,
            TokenSide::Token1 => TokenSide::Token0,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            TokenSide::Token0 => 0,
            TokenSide::Token1 => 1,
        }
    }
}

// 1.2: Long0 = hold token0 bought with borrowed token1. Short0 = hold token1 bought with borrowed token0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    Long0,
    Short0,
}

impl Direction {
    pub fn held_side(&self) -> TokenSide {
        match self {
            Direction::Long0 => TokenSide::Token0,
            Direction::Short0 => TokenSide::Token1,
        }
    }

    /// Side of the borrowed asset. deposits are denominated in it too.
    pub fn borrow_side(&self) -> TokenSide {
        self.held_side().opposite()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long0 => write!(f, "long0"),
            Direction::Short0 => write!(f, "short0"),
        }
    }
}

// 1.3: fixed-point price, PRICE_SCALE = 1.0. oracle views quote token1 per token0;
// price limits quote output asset per unit of input asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(pub u128);

impl Price {
    pub const ZERO: Price = Price(0);
    pub const ONE: Price = Price(PRICE_SCALE);

    pub fn raw(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Price of `numerator` units per `denominator` unit.
    pub fn from_ratio(numerator: Amount, denominator: Amount) -> Option<Self> {
        crate::math::mul_div(numerator, PRICE_SCALE, denominator).map(Price)
    }

    /// `amount * self`, floored.
    pub fn apply(&self, amount: Amount) -> Option<Amount> {
        crate::math::mul_div(amount, self.0, PRICE_SCALE)
    }

    /// `amount / self`, floored. None for a zero price.
    pub fn apply_inverse(&self, amount: Amount) -> Option<Amount> {
        crate::math::mul_div(amount, PRICE_SCALE, self.0)
    }

    pub fn to_decimal(&self) -> Decimal {
        amount_to_decimal(self.0, 18)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

// 1.4: basis points. 100 bps = 1%.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bps(pub u32);

impl Bps {
    pub const ZERO: Bps = Bps(0);
    pub const FULL: Bps = Bps(10_000);

    pub fn new(bps: u32) -> Self {
        Self(bps)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// `amount * bps / 10_000`, floored.
    pub fn of(&self, amount: Amount) -> Amount {
        crate::math::mul_div(amount, self.0 as u128, BPS_SCALE).unwrap_or(Amount::MAX)
    }

    pub fn is_valid(&self) -> bool {
        self.0 <= 10_000
    }

    pub fn as_fraction(&self) -> Decimal {
        Decimal::new(self.0 as i64, 4)
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

// 1.5: seconds since epoch. the engine runs on a logical clock, now() is for the sim binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp().max(0) as u64)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn plus(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    pub fn elapsed_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Human-readable view of a base-unit amount, for logs and the sim binary only.
pub fn amount_to_decimal(amount: Amount, decimals: u32) -> Decimal {
    i128::try_from(amount)
        .ok()
        .and_then(|v| Decimal::try_from_i128_with_scale(v, decimals).ok())
        .unwrap_or(Decimal::MAX)
}
