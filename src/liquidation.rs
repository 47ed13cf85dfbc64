//! Liquidation conditions, proceeds settlement and the insurance fund.
//!
//! A position is liquidatable when its worst-view margin ratio drops under the
//! market's liquidation threshold. The forced close splits what the swap
//! recovered against the pro-rata debt: a surplus pays a penalty into the
//! insurance fund and the rest back to the trader; a shortfall is drawn from
//! the insurance fund, and whatever the fund can not cover becomes bad debt.
//! Liquidation always completes.

use crate::margin::MarginRatios;
use crate::position::Position;
use crate::types::{Amount, Bps, TokenSide};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationStatus {
    Healthy,
    Liquidatable,
    /// nothing left to liquidate
    Closed,
}

pub fn liquidation_status(position: &Position, ratios: &MarginRatios, threshold: Bps) -> LiquidationStatus {
    if !position.is_open() {
        LiquidationStatus::Closed
    } else if ratios.worst().is_below(threshold) {
        LiquidationStatus::Liquidatable
    } else {
        LiquidationStatus::Healthy
    }
}

/// Recorded, not raised: the fund could not absorb a whole shortfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsufficientInsurance {
    pub side: TokenSide,
    pub shortfall: Amount,
    pub covered: Amount,
    pub uncovered: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Settlement {
    /// swap recovered at least the debt share
    Surplus {
        proceeds: Amount,
        penalty: Amount,
        deposit_return: Amount,
    },
    /// swap recovered less than the debt share
    Shortfall {
        shortfall: Amount,
        covered: Amount,
        uncovered: Amount,
    },
}

impl Settlement {
    pub fn deposit_return(&self) -> Amount {
        match self {
            Settlement::Surplus { deposit_return, .. } => *deposit_return,
            Settlement::Shortfall { .. } => 0,
        }
    }

    pub fn penalty(&self) -> Amount {
        match self {
            Settlement::Surplus { penalty, .. } => *penalty,
            Settlement::Shortfall { .. } => 0,
        }
    }
}

pub fn settle_proceeds(
    received: Amount,
    repay_due: Amount,
    penalty_rate: Bps,
    fund_balance: Amount,
) -> Settlement {
    if received >= repay_due {
        let proceeds = received - repay_due;
        let penalty = penalty_rate.of(proceeds);
        Settlement::Surplus {
            proceeds,
            penalty,
            deposit_return: proceeds - penalty,
        }
    } else {
        let shortfall = repay_due - received;
        let covered = shortfall.min(fund_balance);
        Settlement::Shortfall {
            shortfall,
            covered,
            uncovered: shortfall - covered,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsuranceFund {
    pub balance: Amount,
    pub total_deposits: Amount,
    pub total_payouts: Amount,
}

impl InsuranceFund {
    pub fn new(initial_balance: Amount) -> Self {
        Self {
            balance: initial_balance,
            total_deposits: initial_balance,
            total_payouts: 0,
        }
    }

    pub fn deposit(&mut self, amount: Amount) {
        self.balance = self.balance.saturating_add(amount);
        self.total_deposits = self.total_deposits.saturating_add(amount);
    }

    /// Pays out at most the current balance and returns what was paid.
    pub fn cover_shortfall(&mut self, amount: Amount) -> Amount {
        let covered = amount.min(self.balance);
        self.balance -= covered;
        self.total_payouts = self.total_payouts.saturating_add(covered);
        covered
    }
}
