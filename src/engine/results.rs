// 8.0.2: requests, result types and errors for engine operations.

use crate::config::ConfigError;
use crate::liquidation::InsufficientInsurance;
use crate::margin::{MarginRatio, MarginRatios};
use crate::oracle::PriceViews;
use crate::position::Position;
use crate::types::{Amount, Bps, Direction, PairId, TraderId};
use crate::venue::VenueError;

/// Parameters of an open. `min_held` bounds how little of the held asset the
/// swap may deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenRequest {
    pub trader: TraderId,
    pub direction: Direction,
    pub deposit: Amount,
    pub borrow: Amount,
    pub min_held: Amount,
}

impl OpenRequest {
    pub fn new(trader: TraderId, direction: Direction, deposit: Amount, borrow: Amount) -> Self {
        Self {
            trader,
            direction,
            deposit,
            borrow,
            min_held: 0,
        }
    }

    pub fn with_min_held(mut self, min_held: Amount) -> Self {
        self.min_held = min_held;
        self
    }
}

#[derive(Debug, Clone)]
pub struct OpenResult {
    pub deposit_received: Amount,
    pub borrowed: Amount,
    pub fee: Amount,
    pub held_received: Amount,
    pub position: Position,
    pub ratios: MarginRatios,
}

#[derive(Debug, Clone)]
pub struct CloseResult {
    pub close_amount: Amount,
    pub fee: Amount,
    /// borrowed asset that reached custody from the swap
    pub received: Amount,
    pub repaid: Amount,
    pub deposit_return: Amount,
    /// what the trader's balance actually gained
    pub trader_received: Amount,
    pub position: Position,
}

#[derive(Debug, Clone)]
pub struct LiquidationResult {
    pub close_amount: Amount,
    pub received: Amount,
    pub repaid: Amount,
    pub penalty: Amount,
    pub deposit_return: Amount,
    pub trader_received: Amount,
    /// set when the insurance fund could not absorb the whole shortfall
    pub insufficient_insurance: Option<InsufficientInsurance>,
    pub still_liquidatable: bool,
    pub position: Position,
}

#[derive(Debug, Clone)]
pub struct MarginAddedResult {
    pub received: Amount,
    pub position: Position,
    pub ratios: MarginRatios,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Market {0} not found")]
    InvalidMarket(PairId),

    #[error("Operation would leave a position with no held asset")]
    ZeroPosition,

    #[error("Amount must be non-zero")]
    ZeroAmount,

    #[error("Margin ratio {ratio} below limit {limit}")]
    BelowMarginLimit { ratio: MarginRatio, limit: Bps },

    #[error("Position not liquidatable: worst ratio {ratio}, threshold {threshold}")]
    NotLiquidatable { ratio: MarginRatio, threshold: Bps },

    #[error("Slippage exceeded: got {realized}, limit requires {min_out}")]
    SlippageExceeded { realized: Amount, min_out: Amount },

    #[error("No open {direction} position for {trader}")]
    PositionNotFound { trader: TraderId, direction: Direction },

    #[error("Close amount {amount} invalid for held {held}")]
    InvalidCloseAmount { amount: Amount, held: Amount },

    #[error("Proceeds {received} do not cover debt share {repay_due}")]
    InsufficientProceeds { received: Amount, repay_due: Amount },

    #[error("Spot deviates {deviation}bps from short average, max {max}")]
    PriceDeviation { deviation: u128, max: Bps },

    #[error("Margin {amount} exceeds outstanding debt {borrowed}")]
    MarginExceedsDebt { amount: Amount, borrowed: Amount },

    #[error("Arithmetic overflow")]
    MathOverflow,

    #[error("Venue error: {0}")]
    Venue(#[from] VenueError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Per-side books of a market, for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketSnapshot {
    pub views: PriceViews,
    pub open_positions: usize,
    pub insurance: [Amount; 2],
    pub treasury: [Amount; 2],
    pub bad_debt: [Amount; 2],
}
