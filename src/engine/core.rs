// 8.0 engine/core.rs: main engine. holds all markets, the logical clock and the audit log.
// every mutating operation runs through transact(): the market stays locked for the whole
// operation and a failed operation restores the market to its entry checkpoint.

use super::config::EngineConfig;
use super::results::{EngineError, MarketSnapshot};
use crate::config::MarketConfig;
use crate::events::{Event, EventLog, EventPayload, MarketListedEvent};
use crate::liquidation::{liquidation_status, InsuranceFund, LiquidationStatus};
use crate::margin::{evaluate_margin_status, MarginRatios, MarginStatus};
use crate::market::MarketState;
use crate::oracle::PriceViews;
use crate::position::{Position, PositionKey};
use crate::tax::TransferContext;
use crate::types::{Amount, Direction, PairId, Timestamp, TokenSide, TraderId};
use crate::venue::Venue;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub(super) type MarketHandle<V> = Arc<Mutex<MarketState<V>>>;

/** 8.1: main engine struct. markets are locked one at a time, never two at once */
pub struct Engine<V: Venue> {
    pub(super) config: EngineConfig,
    pub(super) markets: RwLock<HashMap<PairId, MarketHandle<V>>>,
    pub(super) clock: RwLock<Timestamp>,
    pub(super) log: Mutex<EventLog>,
}

impl<V: Venue> Engine<V> {
    pub fn new(config: EngineConfig) -> Self {
        let log = EventLog::new(config.max_events);
        Self {
            config,
            markets: RwLock::new(HashMap::new()),
            clock: RwLock::new(Timestamp(0)),
            log: Mutex::new(log),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_time(&self, timestamp: Timestamp) {
        *self.clock.write() = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        *self.clock.read()
    }

    pub fn advance_time(&self, secs: u64) {
        let mut clock = self.clock.write();
        *clock = clock.plus(secs);
    }

    /// Register a market over `venue`. Pair ids are handed out in listing order.
    pub fn list_market(&self, config: MarketConfig, venue: V) -> Result<PairId, EngineError> {
        config.validate()?;
        let now = self.time();

        let pair = {
            let mut markets = self.markets.write();
            let pair = PairId(markets.len() as u32 + 1);
            let state = MarketState::new(pair, config.clone(), venue, now);
            markets.insert(pair, Arc::new(Mutex::new(state)));
            pair
        };

        info!(%pair, margin_limit = %config.margin_limit, threshold = %config.liquidate_threshold, "market listed");
        self.emit_event(now, EventPayload::MarketListed(MarketListedEvent { pair, config }));
        Ok(pair)
    }

    pub fn market_ids(&self) -> Vec<PairId> {
        let mut ids: Vec<_> = self.markets.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub(super) fn market(&self, pair: PairId) -> Result<MarketHandle<V>, EngineError> {
        self.markets
            .read()
            .get(&pair)
            .cloned()
            .ok_or(EngineError::InvalidMarket(pair))
    }

    /// Run `op` against the locked market. On error the market (venue included)
    /// is restored to its state at entry and nothing is logged.
    pub(super) fn transact<T>(
        &self,
        pair: PairId,
        op: impl FnOnce(&mut MarketState<V>, Timestamp, &mut Vec<EventPayload>) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let handle = self.market(pair)?;
        let mut market = handle.lock();
        let now = self.time();
        let checkpoint = market.clone();
        let mut pending = Vec::new();

        match op(&mut *market, now, &mut pending) {
            Ok(out) => {
                // still under the market lock so per-market event order matches commit order
                for payload in pending {
                    self.emit_event(now, payload);
                }
                Ok(out)
            }
            Err(err) => {
                *market = checkpoint;
                debug!(%pair, error = %err, "operation rolled back");
                Err(err)
            }
        }
    }

    /// Read-only access to a locked market.
    pub(super) fn inspect<T>(
        &self,
        pair: PairId,
        f: impl FnOnce(&MarketState<V>) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let handle = self.market(pair)?;
        let market = handle.lock();
        f(&*market)
    }

    /// Direct access to a market's venue, outside any engine operation.
    /// Used to move reserves, mint balances or change token taxes.
    pub fn with_venue<T>(&self, pair: PairId, f: impl FnOnce(&mut V) -> T) -> Result<T, EngineError> {
        let handle = self.market(pair)?;
        let mut market = handle.lock();
        Ok(f(&mut market.venue))
    }

    // queries

    pub fn market_config(&self, pair: PairId) -> Result<MarketConfig, EngineError> {
        self.inspect(pair, |m| Ok(m.config.clone()))
    }

    pub fn position(&self, pair: PairId, trader: TraderId, direction: Direction) -> Result<Option<Position>, EngineError> {
        let key = PositionKey::new(trader, direction);
        self.inspect(pair, |m| Ok(m.positions.get(&key).copied()))
    }

    /// Open positions of a market, ordered by key.
    pub fn positions(&self, pair: PairId) -> Result<Vec<(PositionKey, Position)>, EngineError> {
        self.inspect(pair, |m| {
            let mut open: Vec<_> = m.open_positions().map(|(k, p)| (*k, *p)).collect();
            open.sort_by_key(|(k, _)| *k);
            Ok(open)
        })
    }

    pub fn margin_ratio(&self, pair: PairId, trader: TraderId, direction: Direction) -> Result<MarginRatios, EngineError> {
        let key = PositionKey::new(trader, direction);
        self.inspect(pair, |m| {
            let position = m
                .positions
                .get(&key)
                .ok_or(EngineError::PositionNotFound { trader, direction })?;
            Ok(m.ratios(&key, position)?)
        })
    }

    /// Where the worst view sits against the market's margin limit and
    /// liquidation threshold.
    pub fn margin_status(&self, pair: PairId, trader: TraderId, direction: Direction) -> Result<MarginStatus, EngineError> {
        let ratios = self.margin_ratio(pair, trader, direction)?;
        let config = self.market_config(pair)?;
        Ok(evaluate_margin_status(&ratios, config.margin_limit, config.liquidate_threshold))
    }

    pub fn liquidation_status(&self, pair: PairId, trader: TraderId, direction: Direction) -> Result<LiquidationStatus, EngineError> {
        let key = PositionKey::new(trader, direction);
        self.inspect(pair, |m| {
            let Some(position) = m.positions.get(&key).filter(|p| p.is_open()) else {
                return Ok(LiquidationStatus::Closed);
            };
            let ratios = m.ratios(&key, position)?;
            Ok(liquidation_status(position, &ratios, m.config.liquidate_threshold))
        })
    }

    pub fn is_liquidatable(&self, pair: PairId, trader: TraderId, direction: Direction) -> Result<bool, EngineError> {
        Ok(self.liquidation_status(pair, trader, direction)? == LiquidationStatus::Liquidatable)
    }

    pub fn observe(&self, pair: PairId) -> Result<PriceViews, EngineError> {
        self.inspect(pair, |m| Ok(m.views()?))
    }

    pub fn insurance(&self, pair: PairId, side: TokenSide) -> Result<InsuranceFund, EngineError> {
        self.inspect(pair, |m| Ok(m.insurance(side).clone()))
    }

    pub fn bad_debt(&self, pair: PairId, side: TokenSide) -> Result<Amount, EngineError> {
        self.inspect(pair, |m| Ok(m.bad_debt[side.index()]))
    }

    /// Advisory: what a transfer of `nominal` is expected to deliver, at the
    /// rate the last measured transfer in this context showed.
    pub fn estimate_received(
        &self,
        pair: PairId,
        side: TokenSide,
        context: TransferContext,
        nominal: Amount,
    ) -> Result<Amount, EngineError> {
        self.inspect(pair, |m| Ok(m.estimator.estimate_received(side, context, nominal)))
    }

    pub fn treasury(&self, pair: PairId, side: TokenSide) -> Result<Amount, EngineError> {
        self.inspect(pair, |m| Ok(m.treasury[side.index()]))
    }

    pub fn snapshot(&self, pair: PairId) -> Result<MarketSnapshot, EngineError> {
        self.inspect(pair, |m| {
            Ok(MarketSnapshot {
                views: m.views()?,
                open_positions: m.open_positions().count(),
                insurance: [m.insurance[0].balance, m.insurance[1].balance],
                treasury: m.treasury,
                bad_debt: m.bad_debt,
            })
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.lock().events().to_vec()
    }

    pub fn recent_events(&self, count: usize) -> Vec<Event> {
        self.log.lock().recent(count).to_vec()
    }

    pub(super) fn emit_event(&self, timestamp: Timestamp, payload: EventPayload) {
        self.log.lock().emit(timestamp, payload);
    }
}

impl<V: Venue> Default for Engine<V> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
