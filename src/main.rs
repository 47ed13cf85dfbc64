//! Leveraged Margin Engine Simulation.
//!
//! Walks the engine through its lifecycle on an in-memory venue: opens and
//! closes, a price crash with liquidation, a shortfall that exhausts the
//! insurance fund, fee-on-transfer tokens, and a manipulated spot price.

use lev_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const E18: Amount = 1_000_000_000_000_000_000;
const ALICE: TraderId = TraderId(1);
const BOB: TraderId = TraderId(2);
const KEEPER: TraderId = TraderId(99);

fn main() {
    println!("Leveraged Margin Engine Simulation");
    println!("AMM Pair, Two Lending Pools, Worst-of-Three Pricing\n");

    let scenarios: [(&str, fn() -> Result<(), EngineError>); 5] = [
        ("round trip", scenario_1_round_trip),
        ("liquidation", scenario_2_liquidation),
        ("bad debt", scenario_3_bad_debt),
        ("tax token", scenario_4_tax_token),
        ("manipulated spot", scenario_5_manipulated_spot),
    ];
    for (name, scenario) in scenarios {
        if let Err(e) = scenario() {
            eprintln!("  scenario '{}' failed: {}", name, e);
            std::process::exit(1);
        }
    }

    println!("\nAll simulations completed successfully.");
}

fn tokens(amount: Amount) -> Decimal {
    amount_to_decimal(amount, 18)
}

fn percent(ratio: MarginRatio) -> Decimal {
    if ratio == MarginRatio::UNLEVERED {
        return Decimal::MAX;
    }
    ratio.as_fraction() * dec!(100)
}

/// 10/10 pair with 10 of each asset in the pools, Alice and Bob funded.
fn setup(venue: SimVenue) -> Result<(Engine<SimVenue>, PairId), EngineError> {
    let engine = Engine::new(EngineConfig::default());
    let mut venue = venue
        .with_pool_cash(TokenSide::Token0, 10 * E18)
        .with_pool_cash(TokenSide::Token1, 10 * E18);
    for trader in [ALICE, BOB] {
        venue.mint(TokenSide::Token0, Address::Trader(trader), E18);
        venue.mint(TokenSide::Token1, Address::Trader(trader), E18);
    }
    let pair = engine.list_market(MarketConfig::default(), venue)?;
    Ok((engine, pair))
}

fn default_venue() -> SimVenue {
    SimVenue::new(10 * E18, 10 * E18, Timestamp(0))
}

fn print_ratios(label: &str, ratios: &MarginRatios) {
    println!(
        "  {}: current {}%, short avg {}%, long avg {}% (worst {}%)",
        label,
        percent(ratios.current),
        percent(ratios.c_avg),
        percent(ratios.h_avg),
        percent(ratios.worst())
    );
}

/// 2x long and back out at an unchanged price.
fn scenario_1_round_trip() -> Result<(), EngineError> {
    println!("Scenario 1: Open and Close\n");

    let (engine, pair) = setup(default_venue())?;
    let open = engine.open(pair, OpenRequest::new(ALICE, Direction::Long0, E18 / 1_000, E18 / 1_000))?;

    println!("  Alice deposits {} token1 and borrows {} token1", tokens(open.deposit_received), tokens(open.borrowed));
    println!("  Fee: {} token1, bought {} token0", tokens(open.fee), tokens(open.held_received));
    println!("  Entry price: {}", open.position.entry_price.to_decimal());
    print_ratios("Margin", &open.ratios);

    let close = engine.close(pair, ALICE, Direction::Long0, open.held_received, Price::ZERO)?;
    println!("\n  Alice closes: sold for {} token1, repaid {}", tokens(close.received), tokens(close.repaid));
    println!("  Returned to Alice: {} token1", tokens(close.deposit_return));
    println!(
        "  Insurance: {} token0 / {} token1\n",
        tokens(engine.insurance(pair, TokenSide::Token0)?.balance),
        tokens(engine.insurance(pair, TokenSide::Token1)?.balance)
    );
    Ok(())
}

/// A 45% drop pushes a 2x long under the threshold; a keeper closes it.
fn scenario_2_liquidation() -> Result<(), EngineError> {
    println!("Scenario 2: Price Crash and Liquidation\n");

    let (engine, pair) = setup(default_venue())?;
    engine.open(pair, OpenRequest::new(ALICE, Direction::Long0, E18 / 1_000, E18 / 1_000))?;
    engine.open(pair, OpenRequest::new(BOB, Direction::Long0, E18 / 1_000, E18 / 4_000))?;
    println!("  Alice opens 2x long, Bob opens 1.25x long");

    engine.with_venue(pair, |v| v.set_reserves(10 * E18, 55 * E18 / 10, Timestamp(0)))?;
    println!("  Spot falls to {}", engine.observe(pair)?.current.to_decimal());
    print_ratios("Alice", &engine.margin_ratio(pair, ALICE, Direction::Long0)?);
    print_ratios("Bob", &engine.margin_ratio(pair, BOB, Direction::Long0)?);

    for (key, result) in engine.liquidate_all(KEEPER, pair)? {
        let result = result?;
        println!(
            "\n  Liquidated trader {}: sold {} token0 for {} token1",
            key.trader,
            tokens(result.close_amount),
            tokens(result.received)
        );
        println!(
            "  Repaid {}, penalty {}, returned {}",
            tokens(result.repaid),
            tokens(result.penalty),
            tokens(result.deposit_return)
        );
    }
    println!("\n  Alice after the sweep: {:?}", engine.liquidation_status(pair, ALICE, Direction::Long0)?);
    println!("  Bob after the sweep: {:?}\n", engine.liquidation_status(pair, BOB, Direction::Long0)?);
    Ok(())
}

/// A crash deep enough that proceeds cannot repay the pool.
fn scenario_3_bad_debt() -> Result<(), EngineError> {
    println!("Scenario 3: Shortfall and Bad Debt\n");

    let (engine, pair) = setup(default_venue())?;
    let open = engine.open(pair, OpenRequest::new(ALICE, Direction::Long0, E18 / 1_000, E18 / 1_000))?;
    println!("  Insurance before: {} token1", tokens(engine.insurance(pair, TokenSide::Token1)?.balance));

    engine.with_venue(pair, |v| v.set_reserves(10 * E18, 4 * E18 / 10, Timestamp(0)))?;
    let result = engine.liquidate(KEEPER, pair, ALICE, Direction::Long0, open.held_received, Price::ZERO)?;
    println!("  Liquidation received {} token1 against {} owed", tokens(result.received), tokens(open.borrowed));

    if let Some(record) = result.insufficient_insurance {
        println!(
            "  Shortfall {}: insurance covered {}, {} written off",
            tokens(record.shortfall),
            tokens(record.covered),
            tokens(record.uncovered)
        );
    }
    println!("  Bad debt on token1: {}\n", tokens(engine.bad_debt(pair, TokenSide::Token1)?));
    Ok(())
}

/// token0 taxes buys and sells 5%; the books only hold what arrived.
fn scenario_4_tax_token() -> Result<(), EngineError> {
    println!("Scenario 4: Fee-on-Transfer Token\n");

    let venue = default_venue().with_tax(TokenSide::Token0, TaxSchedule::buy_and_sell(Bps(500), Bps(500)));
    let (engine, pair) = setup(venue)?;
    let open = engine.open(pair, OpenRequest::new(ALICE, Direction::Long0, E18 / 1_000, E18 / 1_000))?;
    println!("  Alice's long books {} token0 after the buy tax", tokens(open.held_received));
    print_ratios("Margin", &open.ratios);

    let close = engine.close(pair, ALICE, Direction::Long0, open.held_received, Price::ZERO)?;
    println!("  Close nets {} token1 after the sell tax", tokens(close.received));
    println!("  Returned to Alice: {} token1", tokens(close.deposit_return));

    let collected = engine.with_venue(pair, |v| v.balance_of(TokenSide::Token0, Address::TaxCollector))?;
    println!("  Tax collector holds {} token0\n", tokens(collected));
    Ok(())
}

/// Spot is pumped back after a minute at a low price. the short average
/// still sees the low and the position stays liquidatable.
fn scenario_5_manipulated_spot() -> Result<(), EngineError> {
    println!("Scenario 5: Manipulated Spot Price\n");

    let (engine, pair) = setup(default_venue())?;
    engine.update_price(pair)?;
    engine.advance_time(60);
    engine.update_price(pair)?;
    engine.open(pair, OpenRequest::new(ALICE, Direction::Long0, E18 / 1_000, E18 / 1_000))?;

    let now = engine.time();
    engine.with_venue(pair, |v| v.set_reserves(10 * E18, 55 * E18 / 10, now))?;
    engine.advance_time(60);
    engine.update_price(pair)?;
    let now = engine.time();
    engine.with_venue(pair, |v| v.set_reserves(10 * E18, 10 * E18, now))?;

    let views = engine.observe(pair)?;
    println!(
        "  Views: current {}, short avg {}, long avg {}",
        views.current.to_decimal(),
        views.avg_short.to_decimal(),
        views.avg_long.to_decimal()
    );
    print_ratios("Alice", &engine.margin_ratio(pair, ALICE, Direction::Long0)?);
    println!("  Liquidatable: {}", engine.is_liquidatable(pair, ALICE, Direction::Long0)?);

    let err = engine.open(pair, OpenRequest::new(BOB, Direction::Long0, E18 / 1_000, E18 / 1_000));
    if let Err(e) = err {
        println!("  Bob's open rejected: {}", e);
    }
    Ok(())
}
