//! Solvency invariant tests.
//!
//! These tests verify invariants that must hold for the lending pools to be
//! made whole, or for any loss to be accounted, under all conditions.

use lev_core::*;
use proptest::prelude::*;

const E18: Amount = 1_000_000_000_000_000_000;
const KEEPER: TraderId = TraderId(999);

fn market_with_traders(traders: &[TraderId]) -> (Engine<SimVenue>, PairId) {
    let engine = Engine::new(EngineConfig::default());
    let mut venue = SimVenue::new(10 * E18, 10 * E18, Timestamp(0))
        .with_pool_cash(TokenSide::Token0, 10 * E18)
        .with_pool_cash(TokenSide::Token1, 10 * E18);
    for trader in traders {
        venue.mint(TokenSide::Token0, Address::Trader(*trader), E18);
        venue.mint(TokenSide::Token1, Address::Trader(*trader), E18);
    }
    venue.mint(TokenSide::Token1, Address::Trader(KEEPER), E18);
    let pair = engine.list_market(MarketConfig::default(), venue).unwrap();
    (engine, pair)
}

fn engine_debt(engine: &Engine<SimVenue>, pair: PairId, side: TokenSide) -> Amount {
    engine
        .with_venue(pair, |v| v.borrow_balance(side, Address::Engine))
        .unwrap()
}

fn recorded_debt(engine: &Engine<SimVenue>, pair: PairId, side: TokenSide) -> Amount {
    engine
        .positions(pair)
        .unwrap()
        .iter()
        .filter(|(key, _)| key.direction.borrow_side() == side)
        .map(|(_, p)| p.borrowed)
        .sum()
}

proptest! {
    /// Pool debt always equals the debt recorded on open positions, whatever
    /// the crash depth. shortfalls are either covered or written off.
    #[test]
    fn pool_debt_matches_positions_after_liquidations(
        deposits in proptest::collection::vec(1_000u128..50_000u128, 1..6),
        crash_reserve1 in 2u128..9u128,
        insurance_topup in 0u128..5_000u128,
    ) {
        let traders: Vec<_> = (1..=deposits.len() as u64).map(TraderId).collect();
        let (engine, pair) = market_with_traders(&traders);
        if insurance_topup > 0 {
            engine
                .fund_insurance(pair, TokenSide::Token1, Address::Trader(KEEPER), insurance_topup * 1_000_000_000_000)
                .unwrap();
        }

        for (trader, deposit) in traders.iter().zip(&deposits) {
            let amount = deposit * 1_000_000_000_000;
            engine.open(pair, OpenRequest::new(*trader, Direction::Long0, amount, amount)).unwrap();
        }
        prop_assert_eq!(engine_debt(&engine, pair, TokenSide::Token1), recorded_debt(&engine, pair, TokenSide::Token1));

        engine
            .with_venue(pair, |v| {
                let r0 = v.reserves().reserve0;
                v.set_reserves(r0, crash_reserve1 * E18 / 10, Timestamp(0))
            })
            .unwrap();

        let results = engine.liquidate_all(KEEPER, pair).unwrap();
        for (_, result) in &results {
            prop_assert!(result.is_ok(), "liquidation must always complete: {:?}", result);
        }

        prop_assert_eq!(engine_debt(&engine, pair, TokenSide::Token1), recorded_debt(&engine, pair, TokenSide::Token1));
        let fund = engine.insurance(pair, TokenSide::Token1).unwrap();
        prop_assert_eq!(fund.balance, fund.total_deposits - fund.total_payouts);
        let written_off = engine.with_venue(pair, |v| v.pool(TokenSide::Token1).total_written_off).unwrap();
        prop_assert_eq!(written_off, engine.bad_debt(pair, TokenSide::Token1).unwrap());
    }
}

#[test]
fn liquidation_is_idempotent_on_closed_position() {
    let alice = TraderId(1);
    let (engine, pair) = market_with_traders(&[alice]);
    let held = engine
        .open(pair, OpenRequest::new(alice, Direction::Long0, 1_000_000_000_000_000, 1_000_000_000_000_000))
        .unwrap()
        .held_received;
    engine
        .with_venue(pair, |v| v.set_reserves(10 * E18, 5_500_000_000_000_000_000, Timestamp(0)))
        .unwrap();

    engine.liquidate(KEEPER, pair, alice, Direction::Long0, held, Price::ZERO).unwrap();
    let fund = engine.insurance(pair, TokenSide::Token1).unwrap();
    let events = engine.events().len();

    for _ in 0..3 {
        let err = engine
            .liquidate(KEEPER, pair, alice, Direction::Long0, held, Price::ZERO)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotLiquidatable { .. }));
    }
    assert_eq!(engine.insurance(pair, TokenSide::Token1).unwrap(), fund);
    assert_eq!(engine.events().len(), events);
}

#[test]
fn unknown_position_is_not_liquidatable() {
    let (engine, pair) = market_with_traders(&[]);
    let err = engine
        .liquidate(KEEPER, pair, TraderId(5), Direction::Short0, 1, Price::ZERO)
        .unwrap_err();
    assert!(matches!(err, EngineError::NotLiquidatable { .. }));
    assert!(!engine.is_liquidatable(pair, TraderId(5), Direction::Short0).unwrap());
}

#[test]
fn funded_insurance_absorbs_the_whole_shortfall() {
    let alice = TraderId(1);
    let (engine, pair) = market_with_traders(&[alice]);
    engine
        .fund_insurance(pair, TokenSide::Token1, Address::Trader(KEEPER), E18)
        .unwrap();
    let held = engine
        .open(pair, OpenRequest::new(alice, Direction::Long0, 1_000_000_000_000_000, 1_000_000_000_000_000))
        .unwrap()
        .held_received;
    engine
        .with_venue(pair, |v| v.set_reserves(10 * E18, 400_000_000_000_000_000, Timestamp(0)))
        .unwrap();

    let result = engine
        .liquidate(KEEPER, pair, alice, Direction::Long0, held, Price::ZERO)
        .unwrap();
    assert!(result.insufficient_insurance.is_none());
    assert_eq!(result.repaid, 1_000_000_000_000_000);
    assert_eq!(engine.bad_debt(pair, TokenSide::Token1).unwrap(), 0);

    let fund = engine.insurance(pair, TokenSide::Token1).unwrap();
    // top-up + open fee share - shortfall
    assert_eq!(fund.balance, E18 + 1_999_800_000_000 - 920_749_305_255_991);
    assert_eq!(engine_debt(&engine, pair, TokenSide::Token1), 0);
}

#[test]
fn empty_fund_clamps_at_zero() {
    let alice = TraderId(1);
    let config = MarketConfig {
        fees: FeeConfig {
            trade_fee: Bps::ZERO,
            insurance_share: Bps::ZERO,
        },
        ..MarketConfig::default()
    };
    let engine = Engine::new(EngineConfig::default());
    let mut venue = SimVenue::new(10 * E18, 10 * E18, Timestamp(0)).with_pool_cash(TokenSide::Token1, 10 * E18);
    venue.mint(TokenSide::Token1, Address::Trader(alice), E18);
    let pair = engine.list_market(config, venue).unwrap();

    let held = engine
        .open(pair, OpenRequest::new(alice, Direction::Long0, 1_000_000_000_000_000, 1_000_000_000_000_000))
        .unwrap()
        .held_received;
    engine
        .with_venue(pair, |v| v.set_reserves(10 * E18, E18 / 10, Timestamp(0)))
        .unwrap();
    let result = engine
        .liquidate(KEEPER, pair, alice, Direction::Long0, held, Price::ZERO)
        .unwrap();

    let record = result.insufficient_insurance.unwrap();
    assert_eq!(record.covered, 0);
    assert_eq!(record.uncovered, record.shortfall);
    assert_eq!(engine.insurance(pair, TokenSide::Token1).unwrap().balance, 0);
    assert_eq!(engine.bad_debt(pair, TokenSide::Token1).unwrap(), record.uncovered);
    assert_eq!(engine_debt(&engine, pair, TokenSide::Token1), 0);
}

#[test]
fn trader_close_cannot_draw_on_insurance() {
    let alice = TraderId(1);
    let (engine, pair) = market_with_traders(&[alice]);
    engine
        .fund_insurance(pair, TokenSide::Token1, Address::Trader(KEEPER), E18)
        .unwrap();
    let held = engine
        .open(pair, OpenRequest::new(alice, Direction::Long0, 1_000_000_000_000_000, 1_000_000_000_000_000))
        .unwrap()
        .held_received;
    engine
        .with_venue(pair, |v| v.set_reserves(10 * E18, 400_000_000_000_000_000, Timestamp(0)))
        .unwrap();

    let fund = engine.insurance(pair, TokenSide::Token1).unwrap();
    let err = engine
        .close(pair, alice, Direction::Long0, held, Price::ZERO)
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientProceeds { .. }));
    assert_eq!(engine.insurance(pair, TokenSide::Token1).unwrap(), fund);
    assert_eq!(engine.position(pair, alice, Direction::Long0).unwrap().unwrap().held, held);
}

#[test]
fn add_margin_pays_down_debt() {
    let alice = TraderId(1);
    let (engine, pair) = market_with_traders(&[alice]);
    let open = engine
        .open(pair, OpenRequest::new(alice, Direction::Long0, 1_000_000_000_000_000, 1_000_000_000_000_000))
        .unwrap();

    let added = engine
        .add_margin(pair, alice, Direction::Long0, 400_000_000_000_000)
        .unwrap();
    assert_eq!(added.received, 400_000_000_000_000);
    assert_eq!(added.position.borrowed, 600_000_000_000_000);
    assert_eq!(added.position.deposit, 1_400_000_000_000_000);
    assert_eq!(added.position.held, open.held_received);
    assert!(added.ratios.worst() > open.ratios.worst());
    assert_eq!(engine_debt(&engine, pair, TokenSide::Token1), 600_000_000_000_000);

    let err = engine
        .add_margin(pair, alice, Direction::Long0, 600_000_000_000_001)
        .unwrap_err();
    assert!(matches!(err, EngineError::MarginExceedsDebt { .. }));
    assert_eq!(
        engine.add_margin(pair, alice, Direction::Short0, 1).unwrap_err(),
        EngineError::PositionNotFound {
            trader: alice,
            direction: Direction::Short0
        }
    );
}

#[test]
fn add_margin_cannot_rescue_below_limit() {
    let alice = TraderId(1);
    let (engine, pair) = market_with_traders(&[alice]);
    engine
        .open(pair, OpenRequest::new(alice, Direction::Long0, 1_000_000_000_000_000, 1_000_000_000_000_000))
        .unwrap();
    engine
        .with_venue(pair, |v| v.set_reserves(10 * E18, 5_500_000_000_000_000_000, Timestamp(0)))
        .unwrap();

    let err = engine
        .add_margin(pair, alice, Direction::Long0, 1_000_000_000_000)
        .unwrap_err();
    assert!(matches!(err, EngineError::BelowMarginLimit { .. }));
    assert_eq!(engine_debt(&engine, pair, TokenSide::Token1), 1_000_000_000_000_000);
}

#[test]
fn failed_operations_leave_no_trace() {
    let alice = TraderId(1);
    let (engine, pair) = market_with_traders(&[alice]);
    let events = engine.events().len();

    // over-borrowed: fails the margin limit after the swap already ran
    let err = engine
        .open(pair, OpenRequest::new(alice, Direction::Long0, 100_000_000_000_000, 1_000_000_000_000_000))
        .unwrap_err();
    assert!(matches!(err, EngineError::BelowMarginLimit { .. }));

    assert_eq!(engine.events().len(), events);
    assert!(engine.position(pair, alice, Direction::Long0).unwrap().is_none());
    assert_eq!(engine.treasury(pair, TokenSide::Token1).unwrap(), 0);
    engine
        .with_venue(pair, |v| {
            assert_eq!(v.reserves().reserve0, 10 * E18);
            assert_eq!(v.reserves().reserve1, 10 * E18);
            assert_eq!(v.balance_of(TokenSide::Token1, Address::Trader(alice)), E18);
            assert_eq!(v.borrow_balance(TokenSide::Token1, Address::Engine), 0);
        })
        .unwrap();
}

#[test]
fn invalid_requests_are_rejected() {
    let alice = TraderId(1);
    let (engine, pair) = market_with_traders(&[alice]);

    assert_eq!(
        engine.open(pair, OpenRequest::new(alice, Direction::Long0, 0, 0)).unwrap_err(),
        EngineError::ZeroPosition
    );
    assert_eq!(
        engine
            .open(PairId(42), OpenRequest::new(alice, Direction::Long0, 1, 1))
            .unwrap_err(),
        EngineError::InvalidMarket(PairId(42))
    );

    let held = engine
        .open(pair, OpenRequest::new(alice, Direction::Long0, 1_000_000_000_000_000, 0))
        .unwrap()
        .held_received;
    assert!(matches!(
        engine.close(pair, alice, Direction::Long0, held + 1, Price::ZERO),
        Err(EngineError::InvalidCloseAmount { .. })
    ));
    assert!(matches!(
        engine.close(pair, alice, Direction::Long0, 0, Price::ZERO),
        Err(EngineError::InvalidCloseAmount { .. })
    ));
    assert!(matches!(
        engine.close(pair, alice, Direction::Short0, 1, Price::ZERO),
        Err(EngineError::PositionNotFound { .. })
    ));
}

#[test]
fn invalid_config_is_never_listed() {
    let engine: Engine<SimVenue> = Engine::new(EngineConfig::default());
    let config = MarketConfig {
        liquidate_threshold: Bps(5_000),
        ..MarketConfig::default()
    };
    let err = engine
        .list_market(config, SimVenue::new(E18, E18, Timestamp(0)))
        .unwrap_err();
    assert!(matches!(err, EngineError::Config(ConfigError::InvalidMargin { .. })));
    assert!(engine.market_ids().is_empty());
}

#[test]
fn markets_trade_in_parallel() {
    let traders: Vec<_> = (1..=4).map(TraderId).collect();
    let engine = Engine::new(EngineConfig::default());
    let pairs: Vec<_> = (0..2)
        .map(|_| {
            let mut venue = SimVenue::new(10 * E18, 10 * E18, Timestamp(0)).with_pool_cash(TokenSide::Token1, 10 * E18);
            for trader in &traders {
                venue.mint(TokenSide::Token1, Address::Trader(*trader), E18);
            }
            engine.list_market(MarketConfig::default(), venue).unwrap()
        })
        .collect();

    std::thread::scope(|s| {
        for &pair in &pairs {
            for &trader in &traders {
                let engine = &engine;
                s.spawn(move || {
                    engine
                        .open(pair, OpenRequest::new(trader, Direction::Long0, 1_000_000_000_000_000, 1_000_000_000_000_000))
                        .unwrap();
                });
            }
        }
    });

    for &pair in &pairs {
        assert_eq!(engine.positions(pair).unwrap().len(), traders.len());
        assert_eq!(engine_debt(&engine, pair, TokenSide::Token1), 4_000_000_000_000_000);
    }
    let opened = engine
        .events()
        .iter()
        .filter(|e| matches!(e.payload, EventPayload::PositionOpened(_)))
        .count();
    assert_eq!(opened, 8);
}
