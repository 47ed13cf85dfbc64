// 9.1 sim.rs: in-memory venue. tax-bearing tokens, a uniswap-v2 style pair, simple lending pools.
// used by the tests and the sim binary; anything implementing venue::Venue can replace it.

use crate::math::mul_div;
use crate::tax::TransferContext;
use crate::types::{Address, Amount, Bps, Price, Timestamp, TokenSide, BPS_SCALE};
use crate::venue::{AmmPair, LendingPool, Reserves, TokenLedger, VenueError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Tax charged per transfer context. owner-adjustable at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxSchedule {
    pub buy: Bps,
    pub sell: Bps,
    pub wallet: Bps,
}

impl TaxSchedule {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn buy_only(rate: Bps) -> Self {
        Self { buy: rate, ..Self::default() }
    }

    pub fn sell_only(rate: Bps) -> Self {
        Self { sell: rate, ..Self::default() }
    }

    pub fn buy_and_sell(buy: Bps, sell: Bps) -> Self {
        Self { buy, sell, wallet: Bps::ZERO }
    }

    pub fn with_wallet(mut self, rate: Bps) -> Self {
        self.wallet = rate;
        self
    }

    pub fn rate(&self, context: TransferContext) -> Bps {
        match context {
            TransferContext::PoolBuy => self.buy,
            TransferContext::PoolSell => self.sell,
            TransferContext::WalletTransfer => self.wallet,
        }
    }
}

/// Fee-on-transfer token. the tax goes to `Address::TaxCollector`.
#[derive(Debug, Clone, Default)]
pub struct TaxToken {
    balances: HashMap<Address, Amount>,
    schedule: TaxSchedule,
    exempt: HashSet<Address>,
}

impl TaxToken {
    pub fn new(schedule: TaxSchedule) -> Self {
        Self {
            schedule,
            ..Self::default()
        }
    }

    pub fn schedule(&self) -> TaxSchedule {
        self.schedule
    }

    pub fn set_schedule(&mut self, schedule: TaxSchedule) {
        self.schedule = schedule;
    }

    /// Transfers from or to an exempt address are never taxed.
    pub fn exempt(&mut self, address: Address) {
        self.exempt.insert(address);
    }

    pub fn remove_exemption(&mut self, address: Address) {
        self.exempt.remove(&address);
    }

    pub fn mint(&mut self, to: Address, amount: Amount) {
        *self.balances.entry(to).or_default() += amount;
    }

    pub fn burn(&mut self, from: Address, amount: Amount) {
        let balance = self.balances.entry(from).or_default();
        *balance = balance.saturating_sub(amount);
    }

    pub fn balance_of(&self, account: Address) -> Amount {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    pub fn tax_on(&self, from: Address, to: Address, amount: Amount) -> Amount {
        if self.exempt.contains(&from) || self.exempt.contains(&to) {
            return 0;
        }
        self.schedule.rate(TransferContext::classify(from, to)).of(amount)
    }

    /// What `to` would receive, without moving anything.
    pub fn preview(&self, from: Address, to: Address, amount: Amount) -> Amount {
        amount - self.tax_on(from, to, amount).min(amount)
    }

    pub fn transfer(
        &mut self,
        side: TokenSide,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), VenueError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(VenueError::InsufficientBalance {
                token: side,
                holder: from,
                available,
                required: amount,
            });
        }
        let tax = self.tax_on(from, to, amount).min(amount);
        *self.balances.entry(from).or_default() -= amount;
        *self.balances.entry(to).or_default() += amount - tax;
        if tax > 0 {
            *self.balances.entry(Address::TaxCollector).or_default() += tax;
        }
        Ok(())
    }
}

/// Constant-product pricing and the price-0 accumulator. balances live in the tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantProductPair {
    reserves: [Amount; 2],
    fee: Bps,
    price0_cumulative: u128,
    last_update: Timestamp,
}

impl ConstantProductPair {
    pub fn new(fee: Bps, now: Timestamp) -> Self {
        Self {
            reserves: [0, 0],
            fee,
            price0_cumulative: 0,
            last_update: now,
        }
    }

    pub fn spot_price(&self) -> Option<Price> {
        Price::from_ratio(self.reserves[1], self.reserves[0])
    }

    /// Output for `amount_in` against the current reserves, after the LP fee.
    pub fn quote(&self, asset_in: TokenSide, amount_in: Amount) -> Result<Amount, VenueError> {
        let reserve_in = self.reserves[asset_in.index()];
        let reserve_out = self.reserves[asset_in.opposite().index()];
        if reserve_in == 0 || reserve_out == 0 {
            return Err(VenueError::NoLiquidity);
        }
        let in_with_fee = amount_in
            .checked_mul(BPS_SCALE - self.fee.0 as u128)
            .ok_or(VenueError::Overflow)?;
        let denominator = reserve_in
            .checked_mul(BPS_SCALE)
            .and_then(|r| r.checked_add(in_with_fee))
            .ok_or(VenueError::Overflow)?;
        mul_div(in_with_fee, reserve_out, denominator).ok_or(VenueError::Overflow)
    }

    pub fn cumulative_at(&self, now: Timestamp) -> u128 {
        let elapsed = now.elapsed_since(self.last_update) as u128;
        match self.spot_price() {
            Some(price) if elapsed > 0 => self
                .price0_cumulative
                .wrapping_add(price.raw().wrapping_mul(elapsed)),
            _ => self.price0_cumulative,
        }
    }

    /// Fold the elapsed time into the accumulator at the old reserves, then move them.
    fn update(&mut self, reserve0: Amount, reserve1: Amount, now: Timestamp) {
        if now > self.last_update {
            self.price0_cumulative = self.cumulative_at(now);
            self.last_update = now;
        }
        self.reserves = [reserve0, reserve1];
    }
}

/// Debt book of one lending pool; its cash is its token balance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimLendingPool {
    debts: HashMap<Address, Amount>,
    pub total_borrowed: Amount,
    pub total_repaid: Amount,
    pub total_written_off: Amount,
}

impl SimLendingPool {
    pub fn debt_of(&self, borrower: Address) -> Amount {
        self.debts.get(&borrower).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct SimVenue {
    tokens: [TaxToken; 2],
    pair: ConstantProductPair,
    pools: [SimLendingPool; 2],
}

impl SimVenue {
    /// Pair seeded with the given reserves, 0.3% LP fee, untaxed tokens, empty pools.
    pub fn new(reserve0: Amount, reserve1: Amount, now: Timestamp) -> Self {
        let mut tokens = [TaxToken::default(), TaxToken::default()];
        for (token, side) in tokens.iter_mut().zip([TokenSide::Token0, TokenSide::Token1]) {
            token.exempt(Address::Pool(side));
        }
        tokens[0].mint(Address::Pair, reserve0);
        tokens[1].mint(Address::Pair, reserve1);

        let mut pair = ConstantProductPair::new(Bps(30), now);
        pair.update(reserve0, reserve1, now);

        Self {
            tokens,
            pair,
            pools: [SimLendingPool::default(), SimLendingPool::default()],
        }
    }

    pub fn with_pool_cash(mut self, side: TokenSide, amount: Amount) -> Self {
        self.tokens[side.index()].mint(Address::Pool(side), amount);
        self
    }

    pub fn with_tax(mut self, side: TokenSide, schedule: TaxSchedule) -> Self {
        self.set_tax(side, schedule);
        self
    }

    pub fn set_tax(&mut self, side: TokenSide, schedule: TaxSchedule) {
        self.tokens[side.index()].set_schedule(schedule);
    }

    pub fn token(&self, side: TokenSide) -> &TaxToken {
        &self.tokens[side.index()]
    }

    pub fn token_mut(&mut self, side: TokenSide) -> &mut TaxToken {
        &mut self.tokens[side.index()]
    }

    pub fn pool(&self, side: TokenSide) -> &SimLendingPool {
        &self.pools[side.index()]
    }

    pub fn pair(&self) -> &ConstantProductPair {
        &self.pair
    }

    pub fn mint(&mut self, side: TokenSide, to: Address, amount: Amount) {
        self.tokens[side.index()].mint(to, amount);
    }

    /// Force the pair to new reserves (a donation plus sync, or a skim). the
    /// accumulator is folded at the old price first, so TWAPs see the move
    /// only from `now` on.
    pub fn set_reserves(&mut self, reserve0: Amount, reserve1: Amount, now: Timestamp) {
        for (side, target) in [(TokenSide::Token0, reserve0), (TokenSide::Token1, reserve1)] {
            let token = &mut self.tokens[side.index()];
            let current = token.balance_of(Address::Pair);
            if target > current {
                token.mint(Address::Pair, target - current);
            } else {
                token.burn(Address::Pair, current - target);
            }
        }
        self.pair.update(reserve0, reserve1, now);
    }

    fn sync_pair(&mut self, now: Timestamp) {
        let reserve0 = self.tokens[0].balance_of(Address::Pair);
        let reserve1 = self.tokens[1].balance_of(Address::Pair);
        self.pair.update(reserve0, reserve1, now);
    }
}

impl TokenLedger for SimVenue {
    fn balance_of(&self, token: TokenSide, account: Address) -> Amount {
        self.tokens[token.index()].balance_of(account)
    }

    fn transfer(
        &mut self,
        token: TokenSide,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), VenueError> {
        self.tokens[token.index()].transfer(token, from, to, amount)
    }
}

impl LendingPool for SimVenue {
    fn borrow(&mut self, asset: TokenSide, borrower: Address, amount: Amount) -> Result<Amount, VenueError> {
        let cash = self.cash(asset);
        if cash < amount {
            return Err(VenueError::PoolIlliquid {
                asset,
                cash,
                requested: amount,
            });
        }
        self.tokens[asset.index()].transfer(asset, Address::Pool(asset), borrower, amount)?;
        let pool = &mut self.pools[asset.index()];
        *pool.debts.entry(borrower).or_default() += amount;
        pool.total_borrowed += amount;
        Ok(amount)
    }

    fn repay(&mut self, asset: TokenSide, borrower: Address, amount: Amount) -> Result<(), VenueError> {
        let outstanding = self.pools[asset.index()].debt_of(borrower);
        if amount > outstanding {
            return Err(VenueError::RepayExceedsDebt { amount, outstanding });
        }
        let token = &mut self.tokens[asset.index()];
        let arriving = token.preview(borrower, Address::Pool(asset), amount);
        if arriving < amount {
            return Err(VenueError::RepaymentShort {
                asset,
                sent: amount,
                received: arriving,
            });
        }
        token.transfer(asset, borrower, Address::Pool(asset), amount)?;
        let pool = &mut self.pools[asset.index()];
        *pool.debts.entry(borrower).or_default() -= amount;
        pool.total_repaid += amount;
        Ok(())
    }

    fn write_off(&mut self, asset: TokenSide, borrower: Address, amount: Amount) -> Result<(), VenueError> {
        let pool = &mut self.pools[asset.index()];
        let outstanding = pool.debt_of(borrower);
        if amount > outstanding {
            return Err(VenueError::RepayExceedsDebt { amount, outstanding });
        }
        *pool.debts.entry(borrower).or_default() -= amount;
        pool.total_written_off += amount;
        Ok(())
    }

    fn borrow_balance(&self, asset: TokenSide, borrower: Address) -> Amount {
        self.pools[asset.index()].debt_of(borrower)
    }

    fn cash(&self, asset: TokenSide) -> Amount {
        self.tokens[asset.index()].balance_of(Address::Pool(asset))
    }
}

impl AmmPair for SimVenue {
    fn reserves(&self) -> Reserves {
        Reserves {
            reserve0: self.pair.reserves[0],
            reserve1: self.pair.reserves[1],
            last_update: self.pair.last_update,
        }
    }

    fn cumulative_price(&self, now: Timestamp) -> u128 {
        self.pair.cumulative_at(now)
    }

    fn swap(
        &mut self,
        trader: Address,
        asset_in: TokenSide,
        amount_in: Amount,
        min_out: Amount,
        now: Timestamp,
    ) -> Result<Amount, VenueError> {
        let asset_out = asset_in.opposite();
        // price what the pair will actually receive after sell tax
        let arriving = self.tokens[asset_in.index()].preview(trader, Address::Pair, amount_in);
        let amount_out = self.pair.quote(asset_in, arriving)?;
        if amount_out < min_out {
            return Err(VenueError::InsufficientOutput { amount_out, min_out });
        }
        if amount_out >= self.pair.reserves[asset_out.index()] {
            return Err(VenueError::NoLiquidity);
        }
        self.tokens[asset_in.index()].transfer(asset_in, trader, Address::Pair, amount_in)?;
        self.tokens[asset_out.index()].transfer(asset_out, Address::Pair, trader, amount_out)?;
        self.sync_pair(now);
        Ok(amount_out)
    }
}
