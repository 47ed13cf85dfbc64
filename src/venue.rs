// 9.0 venue.rs: what the engine needs from the outside world. tokens, lending pools, the AMM pair.
// the engine never trusts a nominal amount coming back from these; every receipt is measured
// as a balance delta (see tax.rs). sim.rs has the in-memory implementations.

use crate::types::{Address, Amount, Timestamp, TokenSide};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VenueError {
    #[error("{holder:?} holds {available} of {token:?}, needs {required}")]
    InsufficientBalance {
        token: TokenSide,
        holder: Address,
        available: Amount,
        required: Amount,
    },

    #[error("lending pool {asset:?} has {cash} cash, borrow of {requested} refused")]
    PoolIlliquid {
        asset: TokenSide,
        cash: Amount,
        requested: Amount,
    },

    #[error("repayment to {asset:?} pool arrived short: sent {sent}, received {received}")]
    RepaymentShort {
        asset: TokenSide,
        sent: Amount,
        received: Amount,
    },

    #[error("repayment of {amount} exceeds outstanding debt {outstanding}")]
    RepayExceedsDebt { amount: Amount, outstanding: Amount },

    #[error("swap output {amount_out} below minimum {min_out}")]
    InsufficientOutput { amount_out: Amount, min_out: Amount },

    #[error("pair has no liquidity")]
    NoLiquidity,

    #[error("arithmetic overflow in venue")]
    Overflow,
}

/// Reserves of the AMM pair as of its last update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserves {
    pub reserve0: Amount,
    pub reserve1: Amount,
    pub last_update: Timestamp,
}

/// Balances of both pair assets. every token is treated as possibly taxed.
pub trait TokenLedger {
    fn balance_of(&self, token: TokenSide, account: Address) -> Amount;

    fn transfer(
        &mut self,
        token: TokenSide,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), VenueError>;
}

/// Lending pools supplying borrowed capital, one per asset side.
pub trait LendingPool {
    /// Lend `amount` of `asset` to `borrower`. the full amount is recorded as
    /// debt; what actually arrives must be measured by the caller.
    fn borrow(&mut self, asset: TokenSide, borrower: Address, amount: Amount) -> Result<Amount, VenueError>;

    /// Pull `amount` from `borrower` and credit it against its debt. a short
    /// arrival is an error, never a partial credit.
    fn repay(&mut self, asset: TokenSide, borrower: Address, amount: Amount) -> Result<(), VenueError>;

    /// Forgive debt that can not be recovered.
    fn write_off(&mut self, asset: TokenSide, borrower: Address, amount: Amount) -> Result<(), VenueError>;

    fn borrow_balance(&self, asset: TokenSide, borrower: Address) -> Amount;

    /// Idle cash the pool can still lend.
    fn cash(&self, asset: TokenSide) -> Amount;
}

/// Constant-function AMM pair over token0/token1.
pub trait AmmPair {
    fn reserves(&self) -> Reserves;

    /// Running sum of (token1 per token0, PRICE_SCALE) * seconds, extended
    /// counterfactually up to `now`. wraps on overflow.
    fn cumulative_price(&self, now: Timestamp) -> u128;

    /// Swap whatever `trader` sends of `asset_in`. the pair prices the input it
    /// actually receives and returns the output it sends before any transfer tax.
    fn swap(
        &mut self,
        trader: Address,
        asset_in: TokenSide,
        amount_in: Amount,
        min_out: Amount,
        now: Timestamp,
    ) -> Result<Amount, VenueError>;
}

/// Everything a market needs from its venue. Clone lets the engine checkpoint
/// a market and roll back a failed operation as a unit.
pub trait Venue: TokenLedger + LendingPool + AmmPair + Clone + Send {}

impl<T: TokenLedger + LendingPool + AmmPair + Clone + Send> Venue for T {}
