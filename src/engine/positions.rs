//! Position operations: open, close, add margin, insurance top-up.
//!
//! Every amount booked here comes from a measured balance delta. The nominal
//! amounts in a request only say what to send.

use super::core::Engine;
use super::results::{CloseResult, EngineError, MarginAddedResult, OpenRequest, OpenResult};
use crate::config::TaxOrdering;
use crate::events::{
    EventPayload, InsuranceChange, InsuranceUpdatedEvent, MarginAddedEvent, PositionClosedEvent,
    PositionOpenedEvent,
};
use crate::margin::margin_ratios;
use crate::market::{MarketState, SwapFill};
use crate::math::deviation_bps;
use crate::position::{apply_reduction, merge_fill, reduction_for, Fill, PositionKey};
use crate::types::{Address, Amount, Direction, PairId, Price, Timestamp, TokenSide, TraderId};
use crate::venue::{Venue, VenueError};
use tracing::{info, warn};

impl<V: Venue> Engine<V> {
    /// Open, or add to, a leveraged position.
    #[tracing::instrument(skip_all, fields(pair = %pair, trader = %request.trader, direction = %request.direction))]
    pub fn open(&self, pair: PairId, request: OpenRequest) -> Result<OpenResult, EngineError> {
        if request.deposit.checked_add(request.borrow).ok_or(EngineError::MathOverflow)? == 0 {
            return Err(EngineError::ZeroPosition);
        }

        self.transact(pair, |market, now, events| {
            let direction = request.direction;
            let borrow_side = direction.borrow_side();
            let key = PositionKey::new(request.trader, direction);

            check_price_agreement(market)?;

            // 1. collateral and loan into custody
            let deposit_received = if request.deposit > 0 {
                market.pull_from(request.trader, borrow_side, request.deposit)?.received
            } else {
                0
            };
            let borrow_received = if request.borrow > 0 {
                market.borrow(borrow_side, request.borrow)?.received
            } else {
                0
            };

            // 2. trade fee off the top, in the borrowed asset
            let total = deposit_received
                .checked_add(borrow_received)
                .ok_or(EngineError::MathOverflow)?;
            let fee = market.config.fees.trade_fee.of(total).min(total);
            book_fee(market, pair, borrow_side, fee, events);
            let swap_in = total - fee;
            if swap_in == 0 {
                return Err(EngineError::ZeroPosition);
            }

            // 3. buy the held asset
            let fill = swap_with_limit(market, borrow_side, swap_in, request.min_held, now)?;
            if fill.received == 0 {
                return Err(EngineError::ZeroPosition);
            }

            let price = fill_price(direction, swap_in, fill.received);
            let current = market.position_or_empty(&key, now);
            let position = merge_fill(
                &current,
                &Fill {
                    held: fill.received,
                    borrowed: request.borrow,
                    deposit: deposit_received,
                    price,
                },
                now,
            )
            .ok_or(EngineError::MathOverflow)?;

            // 4. the merged position must clear the margin limit on every view
            let ratios = margin_ratios(direction, &position, &market.views()?);
            if ratios.worst().is_below(market.config.margin_limit) {
                warn!(ratio = %ratios.worst(), limit = %market.config.margin_limit, "open rejected below margin limit");
                return Err(EngineError::BelowMarginLimit {
                    ratio: ratios.worst(),
                    limit: market.config.margin_limit,
                });
            }

            market.positions.insert(key, position);

            info!(
                held = fill.received,
                borrowed = request.borrow,
                deposit = deposit_received,
                fee,
                ratio = %ratios.worst(),
                "position opened"
            );
            events.push(EventPayload::PositionOpened(PositionOpenedEvent {
                pair,
                trader: request.trader,
                direction,
                deposit: deposit_received,
                borrowed: request.borrow,
                held: fill.received,
                fee,
                position,
            }));

            Ok(OpenResult {
                deposit_received,
                borrowed: request.borrow,
                fee,
                held_received: fill.received,
                position,
                ratios,
            })
        })
    }

    /// Close `close_amount` of held. `price_limit` is the minimum borrowed asset
    /// per unit of held sold; `Price::ZERO` disables it.
    #[tracing::instrument(skip_all, fields(pair = %pair, trader = %trader, direction = %direction))]
    pub fn close(
        &self,
        pair: PairId,
        trader: TraderId,
        direction: Direction,
        close_amount: Amount,
        price_limit: Price,
    ) -> Result<CloseResult, EngineError> {
        self.transact(pair, |market, now, events| {
            let key = PositionKey::new(trader, direction);
            let held_side = direction.held_side();
            let borrow_side = direction.borrow_side();

            let position = market
                .positions
                .get(&key)
                .copied()
                .filter(|p| p.is_open())
                .ok_or(EngineError::PositionNotFound { trader, direction })?;
            let reduction = reduction_for(&position, close_amount).ok_or(EngineError::InvalidCloseAmount {
                amount: close_amount,
                held: position.held,
            })?;

            // fee in the held asset, kept in custody
            let fee = market.config.fees.trade_fee.of(close_amount).min(close_amount);
            book_fee(market, pair, held_side, fee, events);
            let sell = close_amount - fee;

            let min_out = price_limit.apply(sell).ok_or(EngineError::MathOverflow)?;
            let fill = swap_with_limit(market, held_side, sell, min_out, now)?;

            let repay_due = reduction.borrowed;
            if fill.received < repay_due {
                return Err(EngineError::InsufficientProceeds {
                    received: fill.received,
                    repay_due,
                });
            }
            if repay_due > 0 {
                market.venue.repay(borrow_side, Address::Engine, repay_due)?;
            }
            let deposit_return = fill.received - repay_due;
            let paid = market.pay_out(trader, borrow_side, deposit_return)?;

            let remaining = apply_reduction(&position, &reduction, now);
            market.positions.insert(key, remaining);

            info!(
                close_amount,
                received = fill.received,
                repaid = repay_due,
                deposit_return,
                full = reduction.is_full,
                "position closed"
            );
            events.push(EventPayload::PositionClosed(PositionClosedEvent {
                pair,
                trader,
                direction,
                close_amount,
                received: fill.received,
                repaid: repay_due,
                deposit_return,
                fee,
                fully_closed: reduction.is_full,
            }));

            Ok(CloseResult {
                close_amount,
                fee,
                received: fill.received,
                repaid: repay_due,
                deposit_return,
                trader_received: paid.received,
                position: remaining,
            })
        })
    }

    /// Pay down debt with fresh collateral in the borrowed asset.
    #[tracing::instrument(skip_all, fields(pair = %pair, trader = %trader, direction = %direction))]
    pub fn add_margin(
        &self,
        pair: PairId,
        trader: TraderId,
        direction: Direction,
        amount: Amount,
    ) -> Result<MarginAddedResult, EngineError> {
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }

        self.transact(pair, |market, now, events| {
            let key = PositionKey::new(trader, direction);
            let borrow_side = direction.borrow_side();

            let position = market
                .positions
                .get(&key)
                .copied()
                .filter(|p| p.is_open())
                .ok_or(EngineError::PositionNotFound { trader, direction })?;
            if amount > position.borrowed {
                return Err(EngineError::MarginExceedsDebt {
                    amount,
                    borrowed: position.borrowed,
                });
            }

            let received = market.pull_from(trader, borrow_side, amount)?.received;
            if received == 0 {
                return Err(EngineError::ZeroAmount);
            }
            market.venue.repay(borrow_side, Address::Engine, received)?;

            let mut updated = position;
            updated.borrowed -= received;
            updated.deposit = updated.deposit.checked_add(received).ok_or(EngineError::MathOverflow)?;
            updated.updated_at = now;

            let ratios = margin_ratios(direction, &updated, &market.views()?);
            if ratios.worst().is_below(market.config.margin_limit) {
                return Err(EngineError::BelowMarginLimit {
                    ratio: ratios.worst(),
                    limit: market.config.margin_limit,
                });
            }
            market.positions.insert(key, updated);

            info!(amount, received, ratio = %ratios.worst(), "margin added");
            events.push(EventPayload::MarginAdded(MarginAddedEvent {
                pair,
                trader,
                direction,
                amount,
                received,
                position: updated,
            }));

            Ok(MarginAddedResult {
                received,
                position: updated,
                ratios,
            })
        })
    }

    /// Top up one side's insurance fund with tokens held by `from`.
    pub fn fund_insurance(&self, pair: PairId, side: TokenSide, from: Address, amount: Amount) -> Result<Amount, EngineError> {
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        self.transact(pair, |market, _now, events| {
            let received = market.pull_from_address(from, side, amount)?.received;
            let fund = market.insurance_mut(side);
            fund.deposit(received);
            info!(%pair, ?side, received, balance = fund.balance, "insurance funded");
            events.push(EventPayload::InsuranceUpdated(InsuranceUpdatedEvent {
                pair,
                side,
                change: InsuranceChange::TopUp { from },
                amount: received,
                balance: fund.balance,
            }));
            Ok(received)
        })
    }
}

/// Spot must agree with the short-window average before exposure grows.
/// A cold oracle has no average to compare with and passes.
fn check_price_agreement<V: Venue>(market: &MarketState<V>) -> Result<(), EngineError> {
    if !market.oracle.is_warm() {
        return Ok(());
    }
    let views = market.views()?;
    let deviation = deviation_bps(views.current.raw(), views.avg_short.raw()).unwrap_or(u128::MAX);
    let max = market.config.max_price_deviation;
    if deviation > max.0 as u128 {
        warn!(deviation, %max, "spot disagrees with short average");
        return Err(EngineError::PriceDeviation { deviation, max });
    }
    Ok(())
}

pub(super) fn book_fee<V: Venue>(
    market: &mut MarketState<V>,
    pair: PairId,
    side: TokenSide,
    fee: Amount,
    events: &mut Vec<EventPayload>,
) {
    if fee == 0 {
        return;
    }
    let to_insurance = market.book_fee(side, fee);
    if to_insurance > 0 {
        events.push(EventPayload::InsuranceUpdated(InsuranceUpdatedEvent {
            pair,
            side,
            change: InsuranceChange::TradeFee,
            amount: to_insurance,
            balance: market.insurance(side).balance,
        }));
    }
}

/// Swap out of custody and hold the output to `min_out`, measured on the
/// side of the tax the market's ordering names.
pub(super) fn swap_with_limit<V: Venue>(
    market: &mut MarketState<V>,
    asset_in: TokenSide,
    amount_in: Amount,
    min_out: Amount,
    now: Timestamp,
) -> Result<SwapFill, EngineError> {
    let fill = match market.swap_from_custody(asset_in, amount_in, min_out, now) {
        Ok(fill) => fill,
        Err(VenueError::InsufficientOutput { amount_out, min_out }) => {
            return Err(EngineError::SlippageExceeded {
                realized: amount_out,
                min_out,
            })
        }
        Err(err) => return Err(err.into()),
    };
    let realized = match market.config.tax_ordering {
        TaxOrdering::NetOfTax => fill.received,
        TaxOrdering::GrossOfTax => fill.gross_out,
    };
    if realized < min_out {
        return Err(EngineError::SlippageExceeded { realized, min_out });
    }
    Ok(fill)
}

/// Token1 per token0 paid on one fill.
fn fill_price(direction: Direction, spent: Amount, held: Amount) -> Price {
    let price = match direction {
        Direction::Long0 => Price::from_ratio(spent, held),
        Direction::Short0 => Price::from_ratio(held, spent),
    };
    price.unwrap_or(Price::ZERO)
}
