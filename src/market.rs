//! Market state.
//!
//! One market per AMM pair: its venue, its price oracle, the positions opened
//! against it and the per-side insurance, treasury and bad-debt books. The
//! engine locks a market for the whole of an operation and works on this
//! struct directly.

use crate::config::MarketConfig;
use crate::liquidation::InsuranceFund;
use crate::margin::{margin_ratios, MarginRatios};
use crate::oracle::{PriceOracle, PriceViews};
use crate::position::{Position, PositionKey};
use crate::tax::{Reconciled, TaxEstimator, TransferContext};
use crate::types::{Address, Amount, PairId, Timestamp, TokenSide, TraderId};
use crate::venue::{Venue, VenueError};
use std::collections::HashMap;

/// Outcome of one swap out of engine custody.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapFill {
    pub amount_in: Amount,
    /// what the pair sent, before buy tax
    pub gross_out: Amount,
    /// what engine custody actually gained
    pub received: Amount,
}

#[derive(Debug, Clone)]
pub struct MarketState<V> {
    pub id: PairId,
    pub config: MarketConfig,
    pub venue: V,
    pub oracle: PriceOracle,
    pub estimator: TaxEstimator,
    pub positions: HashMap<PositionKey, Position>,
    /// indexed by `TokenSide::index`
    pub insurance: [InsuranceFund; 2],
    pub treasury: [Amount; 2],
    pub bad_debt: [Amount; 2],
    pub listed_at: Timestamp,
}

impl<V: Venue> MarketState<V> {
    pub fn new(id: PairId, config: MarketConfig, venue: V, now: Timestamp) -> Self {
        let oracle = PriceOracle::new(
            config.price_window_short,
            config.price_window_long,
            config.max_observations,
        );
        Self {
            id,
            config,
            venue,
            oracle,
            estimator: TaxEstimator::new(),
            positions: HashMap::new(),
            insurance: [InsuranceFund::default(), InsuranceFund::default()],
            treasury: [0, 0],
            bad_debt: [0, 0],
            listed_at: now,
        }
    }

    /// The record for `key`, or an empty one dated `now`.
    pub fn position_or_empty(&self, key: &PositionKey, now: Timestamp) -> Position {
        self.positions
            .get(key)
            .copied()
            .unwrap_or_else(|| Position::empty(now))
    }

    pub fn views(&self) -> Result<PriceViews, VenueError> {
        self.oracle.observe(&self.venue)
    }

    pub fn ratios(&self, key: &PositionKey, position: &Position) -> Result<MarginRatios, VenueError> {
        Ok(margin_ratios(key.direction, position, &self.views()?))
    }

    pub fn insurance(&self, side: TokenSide) -> &InsuranceFund {
        &self.insurance[side.index()]
    }

    pub fn insurance_mut(&mut self, side: TokenSide) -> &mut InsuranceFund {
        &mut self.insurance[side.index()]
    }

    /// Splits a trade fee between the side's insurance fund and treasury.
    /// Returns the insurance part.
    pub fn book_fee(&mut self, side: TokenSide, fee: Amount) -> Amount {
        let to_insurance = self.config.fees.insurance_share.of(fee).min(fee);
        self.insurance[side.index()].deposit(to_insurance);
        self.treasury[side.index()] = self.treasury[side.index()].saturating_add(fee - to_insurance);
        to_insurance
    }

    /// Pull `amount` of `side` from a trader into engine custody.
    pub fn pull_from(&mut self, trader: TraderId, side: TokenSide, amount: Amount) -> Result<Reconciled, VenueError> {
        self.pull_from_address(Address::Trader(trader), side, amount)
    }

    pub fn pull_from_address(&mut self, from: Address, side: TokenSide, amount: Amount) -> Result<Reconciled, VenueError> {
        self.estimator
            .transfer(&mut self.venue, side, from, Address::Engine, amount)
    }

    /// Pay `amount` of `side` out of engine custody. measured at the recipient.
    pub fn pay_out(&mut self, trader: TraderId, side: TokenSide, amount: Amount) -> Result<Reconciled, VenueError> {
        if amount == 0 {
            return Ok(Reconciled { nominal: 0, received: 0 });
        }
        self.estimator
            .transfer(&mut self.venue, side, Address::Engine, Address::Trader(trader), amount)
    }

    /// Borrow from the pool of `side` into engine custody.
    pub fn borrow(&mut self, side: TokenSide, amount: Amount) -> Result<Reconciled, VenueError> {
        let before = self.venue.balance_of(side, Address::Engine);
        self.venue.borrow(side, Address::Engine, amount)?;
        let after = self.venue.balance_of(side, Address::Engine);
        Ok(self
            .estimator
            .reconcile(side, TransferContext::WalletTransfer, amount, before, after))
    }

    /// Swap `amount_in` of `asset_in` out of custody; the output is measured
    /// as custody's balance delta.
    pub fn swap_from_custody(
        &mut self,
        asset_in: TokenSide,
        amount_in: Amount,
        min_out: Amount,
        now: Timestamp,
    ) -> Result<SwapFill, VenueError> {
        let asset_out = asset_in.opposite();
        let before = self.venue.balance_of(asset_out, Address::Engine);
        let gross_out = self
            .venue
            .swap(Address::Engine, asset_in, amount_in, min_out, now)?;
        let after = self.venue.balance_of(asset_out, Address::Engine);
        let reconciled = self
            .estimator
            .reconcile(asset_out, TransferContext::PoolBuy, gross_out, before, after);
        Ok(SwapFill {
            amount_in,
            gross_out,
            received: reconciled.received,
        })
    }

    pub fn open_positions(&self) -> impl Iterator<Item = (&PositionKey, &Position)> {
        self.positions.iter().filter(|(_, p)| p.is_open())
    }
}
