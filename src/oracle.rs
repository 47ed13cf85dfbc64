// 2.0: cumulative-price oracle. three views of one pair: spot, short twap, long twap.
// a single spot read can be pushed around inside one block (flash swap, act, swap back).
// callers compare all three views and act on the worst, so short distortions buy little.

use crate::types::{Price, Timestamp};
use crate::venue::{AmmPair, VenueError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One sample of the pair's price-0 accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: Timestamp,
    pub cumulative: u128,
}

/// The three price views, token1 per token0. pick with an explicit combinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceViews {
    pub current: Price,
    /// "cAvg": average over the short window
    pub avg_short: Price,
    /// "hAvg": average over the long window
    pub avg_long: Price,
}

impl PriceViews {
    /// Same price in all three views. what a cold oracle reports.
    pub fn flat(price: Price) -> Self {
        Self {
            current: price,
            avg_short: price,
            avg_long: price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceOracle {
    short_window: u64,
    long_window: u64,
    capacity: usize,
    observations: VecDeque<Observation>,
}

impl PriceOracle {
    pub fn new(short_window: u64, long_window: u64, capacity: usize) -> Self {
        Self {
            short_window,
            long_window,
            capacity: capacity.max(2),
            observations: VecDeque::new(),
        }
    }

    pub fn observations(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    pub fn last_sample(&self) -> Option<Observation> {
        self.observations.back().copied()
    }

    /// Append a sample. a timestamp at or before the last one is a no-op.
    pub fn record(&mut self, timestamp: Timestamp, cumulative: u128) -> bool {
        if let Some(last) = self.observations.back() {
            if timestamp <= last.timestamp {
                return false;
            }
        }
        self.observations.push_back(Observation { timestamp, cumulative });
        self.prune();
        true
    }

    /// Sample the pair's accumulator as of `now`.
    pub fn update_price<P: AmmPair + ?Sized>(&mut self, pair: &P, now: Timestamp) -> bool {
        self.record(now, pair.cumulative_price(now))
    }

    /// Spot from live reserves plus both window averages. a window without two
    /// qualifying samples falls back to spot.
    pub fn observe<P: AmmPair + ?Sized>(&self, pair: &P) -> Result<PriceViews, VenueError> {
        let reserves = pair.reserves();
        if reserves.reserve0 == 0 || reserves.reserve1 == 0 {
            return Err(VenueError::NoLiquidity);
        }
        let current = Price::from_ratio(reserves.reserve1, reserves.reserve0).ok_or(VenueError::Overflow)?;
        Ok(PriceViews {
            current,
            avg_short: self.window_average(self.short_window).unwrap_or(current),
            avg_long: self.window_average(self.long_window).unwrap_or(current),
        })
    }

    /// True when at least one window has a real average behind it.
    pub fn is_warm(&self) -> bool {
        self.window_average(self.short_window).is_some()
    }

    /// Average between the newest sample and the newest one at least `window`
    /// seconds older than it.
    pub fn window_average(&self, window: u64) -> Option<Price> {
        let end = self.observations.back()?;
        let start = self
            .observations
            .iter()
            .rev()
            .skip(1)
            .find(|o| end.timestamp.elapsed_since(o.timestamp) >= window)?;
        let elapsed = end.timestamp.elapsed_since(start.timestamp) as u128;
        if elapsed == 0 {
            return None;
        }
        Some(Price(end.cumulative.wrapping_sub(start.cumulative) / elapsed))
    }

    // drop everything older than the start sample of the long window, then
    // thin the interior down to capacity. the oldest and newest samples are
    // never evicted, so sampling faster than capacity allows can not push the
    // long window's start out of the buffer.
    fn prune(&mut self) {
        if let Some(end) = self.observations.back().copied() {
            let anchor = self
                .observations
                .iter()
                .rposition(|o| end.timestamp.elapsed_since(o.timestamp) >= self.long_window);
            if let Some(anchor) = anchor {
                self.observations.drain(..anchor);
            }
        }
        while self.observations.len() > self.capacity {
            match self.densest_interior() {
                Some(index) => {
                    self.observations.remove(index);
                }
                None => break,
            }
        }
    }

    // interior sample whose removal opens the smallest gap
    fn densest_interior(&self) -> Option<usize> {
        (1..self.observations.len().saturating_sub(1)).min_by_key(|&i| {
            self.observations[i + 1]
                .timestamp
                .elapsed_since(self.observations[i - 1].timestamp)
        })
    }
}
