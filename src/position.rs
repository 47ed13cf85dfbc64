// 3.0: leveraged position ("trade") bookkeeping. one record per trader and direction in a market.
// 3.1 merges an additional open into the record, 3.2 reduces it proportionally on close/liquidation.

use crate::math::{mul_div, pro_rata};
use crate::types::{Amount, Direction, Price, Timestamp, TraderId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey {
    pub trader: TraderId,
    pub direction: Direction,
}

impl PositionKey {
    pub fn new(trader: TraderId, direction: Direction) -> Self {
        Self { trader, direction }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// held asset actually in custody, post-tax
    pub held: Amount,
    /// debt to the lending pool, in the borrowed asset
    pub borrowed: Amount,
    /// trader collateral, in the borrowed asset, post-tax
    pub deposit: Amount,
    /// held-weighted spot price (token1 per token0) at the fills. informational;
    /// margin is always recomputed from live oracle views
    pub entry_price: Price,
    pub opened_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Position {
    pub fn empty(now: Timestamp) -> Self {
        Self {
            held: 0,
            borrowed: 0,
            deposit: 0,
            entry_price: Price::ZERO,
            opened_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.held > 0
    }
}

/// What one open adds to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub held: Amount,
    pub borrowed: Amount,
    pub deposit: Amount,
    pub price: Price,
}

// 3.1: additive open. amounts sum; entry price is the held-weighted average.
// a record left at zero by a full close starts fresh.
pub fn merge_fill(position: &Position, fill: &Fill, now: Timestamp) -> Option<Position> {
    if !position.is_open() {
        return Some(Position {
            held: fill.held,
            borrowed: fill.borrowed,
            deposit: fill.deposit,
            entry_price: fill.price,
            opened_at: now,
            updated_at: now,
        });
    }

    let held = position.held.checked_add(fill.held)?;
    let weighted = mul_div(position.entry_price.raw(), position.held, held)?
        .checked_add(mul_div(fill.price.raw(), fill.held, held)?)?;

    Some(Position {
        held,
        borrowed: position.borrowed.checked_add(fill.borrowed)?,
        deposit: position.deposit.checked_add(fill.deposit)?,
        entry_price: Price(weighted),
        opened_at: position.opened_at,
        updated_at: now,
    })
}

/// Slice of a position taken out by a close of `held` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reduction {
    pub held: Amount,
    pub borrowed: Amount,
    pub deposit: Amount,
    pub is_full: bool,
}

// 3.2: proportional reduction. debt and deposit shares round down, so the
// remaining debt never rounds away early; closing all of `held` takes all of
// both exactly, so no debt outlives its collateral.
pub fn reduction_for(position: &Position, close_amount: Amount) -> Option<Reduction> {
    if close_amount == 0 || close_amount > position.held {
        return None;
    }
    Some(Reduction {
        held: close_amount,
        borrowed: pro_rata(position.borrowed, close_amount, position.held)?,
        deposit: pro_rata(position.deposit, close_amount, position.held)?,
        is_full: close_amount == position.held,
    })
}

pub fn apply_reduction(position: &Position, reduction: &Reduction, now: Timestamp) -> Position {
    if reduction.is_full {
        return Position {
            entry_price: Price::ZERO,
            updated_at: now,
            ..Position::empty(position.opened_at)
        };
    }
    Position {
        held: position.held - reduction.held,
        borrowed: position.borrowed - reduction.borrowed,
        deposit: position.deposit - reduction.deposit,
        updated_at: now,
        ..*position
    }
}
