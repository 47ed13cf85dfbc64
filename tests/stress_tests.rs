//! Stress tests
//!
//! These tests simulate extreme market conditions to verify the engine remains
//! solvent and behaves correctly under stress.

use lev_core::*;

const E18: Amount = 1_000_000_000_000_000_000;
const KEEPER: TraderId = TraderId(10_000);

fn market(engine: &Engine<SimVenue>, traders: &[TraderId]) -> PairId {
    let mut venue = SimVenue::new(10 * E18, 10 * E18, engine.time())
        .with_pool_cash(TokenSide::Token0, 100 * E18)
        .with_pool_cash(TokenSide::Token1, 100 * E18);
    for trader in traders {
        venue.mint(TokenSide::Token0, Address::Trader(*trader), E18);
        venue.mint(TokenSide::Token1, Address::Trader(*trader), E18);
    }
    engine.list_market(MarketConfig::default(), venue).unwrap()
}

/// Custody, pool debt and the bad debt ledger all agree with open positions.
fn assert_solvent(engine: &Engine<SimVenue>, pair: PairId) {
    let positions = engine.positions(pair).unwrap();
    for side in [TokenSide::Token0, TokenSide::Token1] {
        let held: Amount = positions
            .iter()
            .filter(|(key, _)| key.direction.held_side() == side)
            .map(|(_, p)| p.held)
            .sum();
        let borrowed: Amount = positions
            .iter()
            .filter(|(key, _)| key.direction.borrow_side() == side)
            .map(|(_, p)| p.borrowed)
            .sum();
        let books = engine.insurance(pair, side).unwrap().balance + engine.treasury(pair, side).unwrap();
        let bad_debt = engine.bad_debt(pair, side).unwrap();

        engine
            .with_venue(pair, |v| {
                assert_eq!(v.balance_of(side, Address::Engine), held + books, "custody on {:?}", side);
                assert_eq!(v.borrow_balance(side, Address::Engine), borrowed, "debt on {:?}", side);
                assert_eq!(v.pool(side).total_written_off, bad_debt, "write-offs on {:?}", side);
            })
            .unwrap();
    }
}

/// Sweep until nothing is under the threshold. liquidations move the price,
/// so one sweep can expose positions the previous one did not see.
fn liquidate_until_healthy(engine: &Engine<SimVenue>, pair: PairId) -> usize {
    let mut liquidated = 0;
    for _ in 0..16 {
        let results = engine.liquidate_all(KEEPER, pair).unwrap();
        if results.is_empty() {
            return liquidated;
        }
        for (key, result) in results {
            let result = result.unwrap_or_else(|e| panic!("{:?} failed: {}", key, e));
            assert!(!result.position.is_open());
            assert!(!result.still_liquidatable);
            liquidated += 1;
        }
    }
    panic!("liquidation sweeps never settled");
}

fn move_price(engine: &Engine<SimVenue>, pair: PairId, num: u128, den: u128) {
    let now = engine.time();
    engine
        .with_venue(pair, |v| {
            let r = v.reserves();
            v.set_reserves(r.reserve0, r.reserve1 * num / den, now)
        })
        .unwrap();
}

/// Tests rapid price movements and cascading liquidations.
mod cascade_tests {
    use super::*;

    #[test]
    fn liquidation_cascade_stays_solvent() {
        let engine = Engine::new(EngineConfig::default());
        let traders: Vec<_> = (1..=10).map(TraderId).collect();
        let pair = market(&engine, &traders);

        // increasingly levered longs, 1.5x up to ~2.85x
        for (i, trader) in traders.iter().enumerate() {
            let deposit = 10_000_000_000_000_000;
            let borrow = deposit * (50 + 15 * i as u128) / 100;
            engine
                .open(pair, OpenRequest::new(*trader, Direction::Long0, deposit, borrow))
                .unwrap();
        }
        assert_eq!(engine.positions(pair).unwrap().len(), 10);
        assert_solvent(&engine, pair);

        let mut liquidated = 0;
        let mut open_counts = Vec::new();
        for _ in 0..7 {
            move_price(&engine, pair, 85, 100);
            liquidated += liquidate_until_healthy(&engine, pair);
            assert_solvent(&engine, pair);
            open_counts.push(engine.positions(pair).unwrap().len());
        }

        // the most levered go first and nobody survives a 68% drop
        assert!(open_counts.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(liquidated, 10);
        assert!(engine.positions(pair).unwrap().is_empty());
    }

    #[test]
    fn both_sides_through_a_whipsaw() {
        let engine = Engine::new(EngineConfig::default());
        let traders: Vec<_> = (1..=8).map(TraderId).collect();
        let pair = market(&engine, &traders);

        for (i, trader) in traders.iter().enumerate() {
            let direction = if i % 2 == 0 { Direction::Long0 } else { Direction::Short0 };
            let deposit = 5_000_000_000_000_000 * (1 + i as u128 % 3);
            engine
                .open(pair, OpenRequest::new(*trader, direction, deposit, deposit))
                .unwrap();
        }
        assert_solvent(&engine, pair);

        for (num, den) in [(7, 10), (20, 10), (4, 10), (30, 10), (1, 2)] {
            move_price(&engine, pair, num, den);
            liquidate_until_healthy(&engine, pair);
            assert_solvent(&engine, pair);

            // whoever survived is still above the threshold
            for (key, _) in engine.positions(pair).unwrap() {
                assert!(!engine.is_liquidatable(pair, key.trader, key.direction).unwrap());
            }
        }
    }

    #[test]
    fn partial_liquidations_report_what_is_left() {
        let engine = Engine::new(EngineConfig::default());
        let alice = TraderId(1);
        let pair = market(&engine, &[alice]);
        engine
            .open(pair, OpenRequest::new(alice, Direction::Long0, 100_000_000_000_000_000, 100_000_000_000_000_000))
            .unwrap();
        move_price(&engine, pair, 58, 100);

        for _ in 0..3 {
            let position = engine.position(pair, alice, Direction::Long0).unwrap().unwrap();
            let result = engine
                .liquidate(KEEPER, pair, alice, Direction::Long0, position.held / 4, Price::ZERO)
                .unwrap();
            assert_eq!(result.position.held, position.held - position.held / 4);
            assert_eq!(
                result.still_liquidatable,
                engine.is_liquidatable(pair, alice, Direction::Long0).unwrap()
            );
            assert_solvent(&engine, pair);
        }

        // proportional cuts do not lift the ratio, so the remainder goes too
        let position = engine.position(pair, alice, Direction::Long0).unwrap().unwrap();
        let result = engine
            .liquidate(KEEPER, pair, alice, Direction::Long0, position.held, Price::ZERO)
            .unwrap();
        assert!(!result.position.is_open());
        assert_solvent(&engine, pair);
    }
}

/// Tests many traders hammering one market.
mod churn_tests {
    use super::*;

    #[test]
    fn open_close_churn_keeps_books_exact() {
        let engine = Engine::new(EngineConfig::default());
        let traders: Vec<_> = (1..=20).map(TraderId).collect();
        let pair = market(&engine, &traders);

        for round in 0..5u128 {
            for (i, trader) in traders.iter().enumerate() {
                let direction = if (i as u128 + round) % 2 == 0 { Direction::Long0 } else { Direction::Short0 };
                let deposit = 1_000_000_000_000_000 + i as u128 * 10_000_000_000_000;
                engine
                    .open(pair, OpenRequest::new(*trader, direction, deposit, deposit / 2))
                    .unwrap();
            }
            assert_solvent(&engine, pair);

            for (key, position) in engine.positions(pair).unwrap() {
                let amount = if key.trader.0 % 3 == 0 { position.held } else { position.held / 2 };
                engine
                    .close(pair, key.trader, key.direction, amount, Price::ZERO)
                    .unwrap();
            }
            assert_solvent(&engine, pair);
        }

        // fees only ever accumulate
        let snapshot = engine.snapshot(pair).unwrap();
        assert!(snapshot.treasury.iter().all(|t| *t > 0));
        assert!(snapshot.insurance.iter().all(|b| *b > 0));
        assert_eq!(snapshot.bad_debt, [0, 0]);
    }

    #[test]
    fn event_log_stays_bounded() {
        let engine = Engine::new(EngineConfig { max_events: 16 });
        let traders: Vec<_> = (1..=10).map(TraderId).collect();
        let pair = market(&engine, &traders);

        for trader in &traders {
            let held = engine
                .open(pair, OpenRequest::new(*trader, Direction::Long0, 1_000_000_000_000_000, 0))
                .unwrap()
                .held_received;
            engine
                .close(pair, *trader, Direction::Long0, held, Price::ZERO)
                .unwrap();
        }

        let events = engine.events();
        assert_eq!(events.len(), 16);
        assert!(events.windows(2).all(|w| w[1].id.0 == w[0].id.0 + 1));
        assert!(matches!(
            events.last().map(|e| &e.payload),
            Some(EventPayload::PositionClosed(_))
        ));
        assert_eq!(engine.recent_events(3).len(), 3);
    }
}

/// Tests the oracle over long runs of samples.
mod oracle_tests {
    use super::*;

    #[test]
    fn averages_converge_to_a_held_price() {
        let engine = Engine::new(EngineConfig::default());
        let pair = market(&engine, &[]);
        engine.update_price(pair).unwrap();

        move_price(&engine, pair, 2, 1);
        for _ in 0..62 {
            engine.advance_time(60);
            for (_, sampled) in engine.update_prices() {
                assert!(sampled.unwrap());
            }
        }

        let views = engine.observe(pair).unwrap();
        let two = Price(2 * PRICE_SCALE);
        assert_eq!(views, PriceViews::flat(two));
    }

    #[test]
    fn markets_sample_in_lockstep() {
        let engine = Engine::new(EngineConfig::default());
        let pairs: Vec<_> = (0..3).map(|_| market(&engine, &[])).collect();

        for _ in 0..600 {
            engine.advance_time(13);
            let sampled = engine.update_prices();
            assert_eq!(sampled.len(), pairs.len());
            assert!(sampled.iter().all(|(_, r)| r == &Ok(true)));
        }
        for pair in pairs {
            let views = engine.observe(pair).unwrap();
            assert_eq!(views, PriceViews::flat(Price::ONE));
        }
    }

    #[test]
    fn fast_sampling_keeps_the_long_average() {
        let engine = Engine::new(EngineConfig::default());
        let pair = market(&engine, &[]);

        // 400 samples ten seconds apart overflow the 256-sample buffer
        for _ in 0..400 {
            engine.advance_time(10);
            engine.update_price(pair).unwrap();
        }
        move_price(&engine, pair, 4, 1);

        let views = engine.observe(pair).unwrap();
        assert_eq!(views.current, Price(4 * PRICE_SCALE));
        assert_eq!(views.avg_short, Price::ONE);
        assert_eq!(views.avg_long, Price::ONE);
    }
}
