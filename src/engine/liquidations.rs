//! Liquidation execution.

use super::core::Engine;
use super::positions::swap_with_limit;
use super::results::{EngineError, LiquidationResult};
use crate::events::{BadDebtEvent, EventPayload, InsuranceChange, InsuranceUpdatedEvent, LiquidatedEvent};
use crate::liquidation::{settle_proceeds, InsufficientInsurance, Settlement};
use crate::margin::margin_ratios;
use crate::position::{apply_reduction, reduction_for, PositionKey};
use crate::types::{Address, Amount, Direction, PairId, Price, TraderId};
use crate::venue::Venue;
use tracing::{info, warn};

impl<V: Venue> Engine<V> {
    /// Force-close `close_amount` of an underwater position. Permissionless;
    /// the liquidator is recorded but not paid.
    #[tracing::instrument(skip_all, fields(pair = %pair, trader = %trader, direction = %direction, liquidator = %liquidator))]
    pub fn liquidate(
        &self,
        liquidator: TraderId,
        pair: PairId,
        trader: TraderId,
        direction: Direction,
        close_amount: Amount,
        price_limit: Price,
    ) -> Result<LiquidationResult, EngineError> {
        self.transact(pair, |market, now, events| {
            let key = PositionKey::new(trader, direction);
            let held_side = direction.held_side();
            let borrow_side = direction.borrow_side();
            let threshold = market.config.liquidate_threshold;

            // 1. worst view under the threshold. a closed record is never liquidatable
            let position = market.position_or_empty(&key, now);
            let ratios = margin_ratios(direction, &position, &market.views()?);
            if !position.is_open() || !ratios.worst().is_below(threshold) {
                return Err(EngineError::NotLiquidatable {
                    ratio: ratios.worst(),
                    threshold,
                });
            }
            let reduction = reduction_for(&position, close_amount).ok_or(EngineError::InvalidCloseAmount {
                amount: close_amount,
                held: position.held,
            })?;

            // 2. sell the slice, no trade fee
            let min_out = price_limit.apply(reduction.held).ok_or(EngineError::MathOverflow)?;
            let fill = swap_with_limit(market, held_side, reduction.held, min_out, now)?;

            // 3. settle against the pro-rata debt
            let repay_due = reduction.borrowed;
            let settlement = settle_proceeds(
                fill.received,
                repay_due,
                market.config.liquidation_penalty,
                market.insurance(borrow_side).balance,
            );

            let mut shortfall_record = None;
            let repaid = match settlement {
                Settlement::Surplus { penalty, .. } => {
                    if repay_due > 0 {
                        market.venue.repay(borrow_side, Address::Engine, repay_due)?;
                    }
                    if penalty > 0 {
                        let fund = market.insurance_mut(borrow_side);
                        fund.deposit(penalty);
                        events.push(EventPayload::InsuranceUpdated(InsuranceUpdatedEvent {
                            pair,
                            side: borrow_side,
                            change: InsuranceChange::LiquidationPenalty,
                            amount: penalty,
                            balance: fund.balance,
                        }));
                    }
                    repay_due
                }
                Settlement::Shortfall { shortfall, .. } => {
                    let covered = market.insurance_mut(borrow_side).cover_shortfall(shortfall);
                    let uncovered = shortfall - covered;
                    let repaid = fill.received + covered;
                    if repaid > 0 {
                        market.venue.repay(borrow_side, Address::Engine, repaid)?;
                    }
                    if covered > 0 {
                        events.push(EventPayload::InsuranceUpdated(InsuranceUpdatedEvent {
                            pair,
                            side: borrow_side,
                            change: InsuranceChange::ShortfallCovered,
                            amount: covered,
                            balance: market.insurance(borrow_side).balance,
                        }));
                    }
                    if uncovered > 0 {
                        market.venue.write_off(borrow_side, Address::Engine, uncovered)?;
                        let side_debt = &mut market.bad_debt[borrow_side.index()];
                        *side_debt = side_debt.saturating_add(uncovered);

                        let record = InsufficientInsurance {
                            side: borrow_side,
                            shortfall,
                            covered,
                            uncovered,
                        };
                        warn!(shortfall, covered, uncovered, side = ?borrow_side, "insurance insufficient, bad debt written off");
                        events.push(EventPayload::BadDebt(BadDebtEvent {
                            pair,
                            trader,
                            direction,
                            record,
                        }));
                        shortfall_record = Some(record);
                    }
                    repaid
                }
            };

            let deposit_return = settlement.deposit_return();
            let paid = market.pay_out(trader, borrow_side, deposit_return)?;

            // 4. shrink the record and re-check what is left
            let remaining = apply_reduction(&position, &reduction, now);
            market.positions.insert(key, remaining);
            let still_liquidatable = remaining.is_open()
                && margin_ratios(direction, &remaining, &market.views()?)
                    .worst()
                    .is_below(threshold);

            info!(
                close_amount,
                received = fill.received,
                repaid,
                penalty = settlement.penalty(),
                deposit_return,
                still_liquidatable,
                "position liquidated"
            );
            events.push(EventPayload::Liquidated(LiquidatedEvent {
                pair,
                trader,
                direction,
                liquidator,
                close_amount,
                received: fill.received,
                repaid,
                penalty: settlement.penalty(),
                deposit_return,
                fully_closed: reduction.is_full,
            }));

            Ok(LiquidationResult {
                close_amount,
                received: fill.received,
                repaid,
                penalty: settlement.penalty(),
                deposit_return,
                trader_received: paid.received,
                insufficient_insurance: shortfall_record,
                still_liquidatable,
                position: remaining,
            })
        })
    }

    /// Liquidate every open position of `pair` that is under the threshold, in
    /// full and without a price limit. Failures are skipped and reported.
    pub fn liquidate_all(&self, liquidator: TraderId, pair: PairId) -> Result<Vec<(PositionKey, Result<LiquidationResult, EngineError>)>, EngineError> {
        let candidates: Vec<_> = self
            .positions(pair)?
            .into_iter()
            .filter(|(key, _)| {
                self.is_liquidatable(pair, key.trader, key.direction)
                    .unwrap_or(false)
            })
            .collect();

        Ok(candidates
            .into_iter()
            .map(|(key, position)| {
                let result = self.liquidate(liquidator, pair, key.trader, key.direction, position.held, Price::ZERO);
                (key, result)
            })
            .collect())
    }
}
