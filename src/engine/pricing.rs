//! Price sampling.

use super::core::Engine;
use super::results::EngineError;
use crate::events::{EventPayload, PriceSampledEvent};
use crate::types::PairId;
use crate::venue::Venue;
use tracing::debug;

impl<V: Venue> Engine<V> {
    /// Sample the pair's cumulative price at the engine clock. Callable by
    /// anyone; a sample at or before the last one is a no-op returning false.
    pub fn update_price(&self, pair: PairId) -> Result<bool, EngineError> {
        self.transact(pair, |market, now, events| {
            let appended = market.oracle.update_price(&market.venue, now);
            if appended {
                let cumulative = market
                    .oracle
                    .last_sample()
                    .map(|o| o.cumulative)
                    .unwrap_or_default();
                debug!(%pair, cumulative, at = now.as_secs(), "price sampled");
                events.push(EventPayload::PriceSampled(PriceSampledEvent { pair, cumulative }));
            }
            Ok(appended)
        })
    }

    /// Sample every listed market.
    pub fn update_prices(&self) -> Vec<(PairId, Result<bool, EngineError>)> {
        self.market_ids()
            .into_iter()
            .map(|pair| (pair, self.update_price(pair)))
            .collect()
    }
}
