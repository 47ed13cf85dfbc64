// 11.0: every committed state change produces an event. used for audit trails and for
// notifying external systems. a rolled-back operation leaves no event behind.

use crate::config::MarketConfig;
use crate::liquidation::InsufficientInsurance;
use crate::position::Position;
use crate::types::{Address, Amount, Direction, PairId, Timestamp, TokenSide, TraderId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    // Market events
    MarketListed(MarketListedEvent),
    PriceSampled(PriceSampledEvent),

    // Position events
    PositionOpened(PositionOpenedEvent),
    MarginAdded(MarginAddedEvent),
    PositionClosed(PositionClosedEvent),

    // Risk events
    Liquidated(LiquidatedEvent),
    InsuranceUpdated(InsuranceUpdatedEvent),
    BadDebt(BadDebtEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketListedEvent {
    pub pair: PairId,
    pub config: MarketConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSampledEvent {
    pub pair: PairId,
    pub cumulative: u128,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    pub pair: PairId,
    pub trader: TraderId,
    pub direction: Direction,
    /// reconciled amounts of this fill
    pub deposit: Amount,
    pub borrowed: Amount,
    pub held: Amount,
    pub fee: Amount,
    /// position after the merge
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginAddedEvent {
    pub pair: PairId,
    pub trader: TraderId,
    pub direction: Direction,
    pub amount: Amount,
    pub received: Amount,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub pair: PairId,
    pub trader: TraderId,
    pub direction: Direction,
    pub close_amount: Amount,
    pub received: Amount,
    pub repaid: Amount,
    pub deposit_return: Amount,
    pub fee: Amount,
    pub fully_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidatedEvent {
    pub pair: PairId,
    pub trader: TraderId,
    pub direction: Direction,
    pub liquidator: TraderId,
    pub close_amount: Amount,
    pub received: Amount,
    pub repaid: Amount,
    pub penalty: Amount,
    pub deposit_return: Amount,
    pub fully_closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsuranceChange {
    /// insurance share of a trade fee
    TradeFee,
    LiquidationPenalty,
    TopUp { from: Address },
    ShortfallCovered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsuranceUpdatedEvent {
    pub pair: PairId,
    pub side: TokenSide,
    pub change: InsuranceChange,
    pub amount: Amount,
    pub balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadDebtEvent {
    pub pair: PairId,
    pub trader: TraderId,
    pub direction: Direction,
    pub record: InsufficientInsurance,
}

/// Bounded in-memory log. once full, the oldest events are drained first.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<Event>,
    next_id: u64,
    max_events: usize,
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Vec::new(),
            next_id: 1,
            max_events,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn emit(&mut self, timestamp: Timestamp, payload: EventPayload) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.events.push(Event::new(id, timestamp, payload));

        if self.events.len() > self.max_events {
            let drain_count = self.events.len() - self.max_events;
            self.events.drain(0..drain_count);
        }
        id
    }
}
