//! Transfer-tax estimation and reconciliation.
//!
//! Any token may keep part of a transfer for itself, and the cut can differ for
//! buys from the pair, sells into the pair and plain wallet moves. Rates can
//! also change between a quote and its execution. So the ledger only ever books
//! what a balance delta says arrived; the estimate here is advisory and exists
//! for pre-trade limits.

use crate::types::{Address, Amount, Bps, TokenSide, BPS_SCALE};
use crate::venue::{TokenLedger, VenueError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferContext {
    /// pair -> anyone
    PoolBuy,
    /// anyone -> pair
    PoolSell,
    WalletTransfer,
}

impl TransferContext {
    pub fn classify(from: Address, to: Address) -> Self {
        if from == Address::Pair {
            TransferContext::PoolBuy
        } else if to == Address::Pair {
            TransferContext::PoolSell
        } else {
            TransferContext::WalletTransfer
        }
    }
}

/// Result of one measured transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub nominal: Amount,
    pub received: Amount,
}

impl Reconciled {
    pub fn leaked(&self) -> Amount {
        self.nominal.saturating_sub(self.received)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaxEstimator {
    /// last observed retained fraction per token and context
    retained: HashMap<(TokenSide, TransferContext), Bps>,
}

impl TaxEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the estimate for a token whose schedule is known up front.
    pub fn with_hint(mut self, token: TokenSide, context: TransferContext, tax: Bps) -> Self {
        self.retained
            .insert((token, context), Bps(Bps::FULL.0.saturating_sub(tax.0)));
        self
    }

    /// Fraction of a transfer expected to arrive. untaxed until observed otherwise.
    pub fn retained_fraction(&self, token: TokenSide, context: TransferContext) -> Bps {
        self.retained
            .get(&(token, context))
            .copied()
            .unwrap_or(Bps::FULL)
    }

    pub fn estimate_received(&self, token: TokenSide, context: TransferContext, nominal: Amount) -> Amount {
        self.retained_fraction(token, context).of(nominal)
    }

    /// Amount that actually arrived, from the holder's balance before and after.
    /// Also refreshes the estimate for this token and context.
    pub fn reconcile(
        &mut self,
        token: TokenSide,
        context: TransferContext,
        nominal: Amount,
        balance_before: Amount,
        balance_after: Amount,
    ) -> Reconciled {
        let received = balance_after.saturating_sub(balance_before);
        if nominal > 0 {
            let retained = crate::math::mul_div(received, BPS_SCALE, nominal)
                .unwrap_or(BPS_SCALE)
                .min(BPS_SCALE) as u32;
            self.retained.insert((token, context), Bps(retained));
        }
        if received != nominal {
            debug!(?token, ?context, nominal, received, "transfer taxed");
        }
        Reconciled { nominal, received }
    }

    /// Run `action` and measure what `holder` gained of `token` across it.
    pub fn measure<L, T>(
        &mut self,
        ledger: &mut L,
        token: TokenSide,
        holder: Address,
        context: TransferContext,
        nominal: Amount,
        action: impl FnOnce(&mut L) -> Result<T, VenueError>,
    ) -> Result<(T, Reconciled), VenueError>
    where
        L: TokenLedger,
    {
        let before = ledger.balance_of(token, holder);
        let out = action(ledger)?;
        let after = ledger.balance_of(token, holder);
        Ok((out, self.reconcile(token, context, nominal, before, after)))
    }

    /// Plain transfer, measured at the recipient.
    pub fn transfer<L: TokenLedger>(
        &mut self,
        ledger: &mut L,
        token: TokenSide,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<Reconciled, VenueError> {
        let context = TransferContext::classify(from, to);
        let ((), reconciled) = self.measure(ledger, token, to, context, amount, |l| {
            l.transfer(token, from, to, amount)
        })?;
        Ok(reconciled)
    }
}
