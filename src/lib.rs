// lev-core: leveraged margin trading over an AMM pair and two lending pools.
// risk-first: every check reads three price views and acts on the worst one.
// all ledger math is integer; every token is treated as possibly fee-on-transfer.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: PairId, TraderId, Direction, Price, Bps, Timestamp
//   1.6  math.rs: 256-bit mul_div, pro-rata shares
//   2.x  oracle.rs: cumulative-price oracle, current / short / long views
//   3.x  position.rs: position record, additive merge, proportional reduction
//   4.x  margin.rs: margin ratio per view, margin status
//   5.x  tax.rs: transfer-tax estimation and balance-delta reconciliation
//   6.x  liquidation.rs: liquidation status, proceeds settlement, insurance fund
//   7.x  config.rs: market risk params, fees, env presets
//   8.x  engine/: core engine: opens, closes, margin, pricing, liquidations
//   9.x  venue.rs: token / lending pool / AMM pair traits
//   9.1  sim.rs: in-memory venue with tax tokens (used by tests and the sim)
//   11.x events.rs: state transition events for audit
//   12.x market.rs: per-pair runtime state and custody moves

// core modules
pub mod engine;
pub mod events;
pub mod liquidation;
pub mod margin;
pub mod market;
pub mod math;
pub mod oracle;
pub mod position;
pub mod types;

// token and venue modules
pub mod config;
pub mod sim;
pub mod tax;
pub mod venue;

// re exports for convenience
pub use config::*;
pub use engine::*;
pub use events::*;
pub use liquidation::*;
pub use margin::*;
pub use market::*;
pub use oracle::*;
pub use position::*;
pub use sim::*;
pub use tax::*;
pub use types::*;
pub use venue::*;
