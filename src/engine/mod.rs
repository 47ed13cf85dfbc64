// 8.0: core margin engine. coordinates opens, closes, margin top-ups, price sampling
// and liquidations across markets. deterministic; the only outside world is the venue.

mod config;
mod core;
mod liquidations;
mod positions;
mod pricing;
mod results;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{
    CloseResult, EngineError, LiquidationResult, MarginAddedResult, MarketSnapshot, OpenRequest, OpenResult,
};
