//! End-to-end strategy scenarios through the public API

use chrono::{DateTime, Duration, TimeZone, Utc};

use pump_short::backtest::BacktestRunner;
use pump_short::config::{Config, RiskConfig};
use pump_short::error::DataError;
use pump_short::market::Snapshot;
use pump_short::position::{AccountState, ExitReason, RiskBlock};
use pump_short::strategy::{PumpStatus, StrategyEngine, SymbolPhase, TickOutcome};
use pump_short::trading::{GatewayRequest, SimulatedGateway};

const PUMP_AND_STALL: [f64; 6] = [100.0, 100.0, 126.0, 130.0, 128.0, 120.0];

fn ts(step: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::minutes(step * 15)
}

fn path(symbol: &str, prices: &[f64]) -> Vec<Snapshot> {
    prices
        .iter()
        .enumerate()
        .map(|(i, p)| Snapshot::new(symbol, ts(i as i64), *p, 10.0))
        .collect()
}

fn tight_exits() -> Config {
    Config {
        risk: RiskConfig {
            stop_loss_pct: 3.0,
            take_profit_pct: 2.0,
            taker_fee_pct: 0.0,
            ..RiskConfig::default()
        },
        ..Config::default()
    }
}

fn engine(config: &Config) -> StrategyEngine<SimulatedGateway> {
    StrategyEngine::new(config, AccountState::new(1000.0), SimulatedGateway::new()).unwrap()
}

#[test]
fn pump_flagged_then_short_on_stall() {
    let config = Config::default();
    let mut engine = engine(&config);

    let mut outcomes = Vec::new();
    for snapshot in path("PEPEUSDT", &PUMP_AND_STALL) {
        outcomes.push(engine.on_tick(&snapshot).unwrap());
        if snapshot.price == 126.0 {
            let state = engine.pump_state("PEPEUSDT").unwrap();
            assert_eq!(state.pumped_since, Some(snapshot.timestamp));
            assert!(matches!(engine.phase("PEPEUSDT"), SymbolPhase::Pumped { .. }));
        }
    }

    assert!(outcomes[..5].iter().all(|o| matches!(o, TickOutcome::Idle)));
    let TickOutcome::Opened(position) = &outcomes[5] else {
        panic!("expected a short at 120, got {:?}", outcomes[5]);
    };
    assert_eq!(position.entry_price, 120.0);
    assert_eq!(position.symbol, "PEPEUSDT");
    // Default 4% of 1000 equity
    assert!((position.notional - 40.0).abs() < 1e-9);
    assert!((position.stop_loss_price - 480.0).abs() < 1e-9);
    assert!((position.take_profit_price - 72.0).abs() < 1e-9);

    assert!(matches!(
        engine.gateway().requests(),
        [GatewayRequest::Short(order)] if order.symbol == "PEPEUSDT"
    ));
}

#[test]
fn stop_loss_closes_at_tick_price() {
    let mut engine = engine(&tight_exits());
    for snapshot in path("PEPEUSDT", &PUMP_AND_STALL) {
        engine.on_tick(&snapshot).unwrap();
    }
    let position = engine.account().position("PEPEUSDT").unwrap().clone();
    assert!((position.stop_loss_price - 123.6).abs() < 1e-9);

    let outcome = engine
        .on_tick(&Snapshot::new("PEPEUSDT", ts(6), 124.0, 10.0))
        .unwrap();
    let TickOutcome::Exited(trade) = outcome else {
        panic!("expected stop loss, got {outcome:?}");
    };
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert_eq!(trade.exit_price, 124.0);
    assert!((trade.pnl_pct - (-3.333)).abs() < 1e-3);
    assert!(engine.account().open_positions.is_empty());
    assert!(engine.account().equity < 1000.0);
}

#[test]
fn take_profit_closes() {
    let mut engine = engine(&tight_exits());
    for snapshot in path("PEPEUSDT", &PUMP_AND_STALL) {
        engine.on_tick(&snapshot).unwrap();
    }
    let outcome = engine
        .on_tick(&Snapshot::new("PEPEUSDT", ts(6), 117.0, 10.0))
        .unwrap();
    assert!(matches!(
        outcome,
        TickOutcome::Exited(ref trade) if trade.exit_reason == ExitReason::TakeProfit && trade.pnl_pct > 0.0
    ));
}

#[test]
fn concurrency_cap_rejects_second_symbol_same_tick() {
    let mut config = tight_exits();
    config.risk.max_concurrent_positions = 1;

    // Interleave two identical paths: A before B on every timestamp
    let mut history = Vec::new();
    for (a, b) in path("AUSDT", &PUMP_AND_STALL)
        .into_iter()
        .zip(path("BUSDT", &PUMP_AND_STALL))
    {
        history.push(a);
        history.push(b);
    }

    let mut engine = engine(&config);
    let outcomes: Vec<TickOutcome> = history
        .iter()
        .map(|s| engine.on_tick(s).unwrap())
        .collect();

    assert!(matches!(outcomes[10], TickOutcome::Opened(ref p) if p.symbol == "AUSDT"));
    match &outcomes[11] {
        TickOutcome::Rejected { signal, block } => {
            assert_eq!(signal.symbol, "BUSDT");
            assert_eq!(*block, RiskBlock::MaxPositionsReached { current: 1, max: 1 });
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(engine.account().open_count(), 1);

    // Same through the backtest, which keeps input order for equal timestamps
    let report = BacktestRunner::new(config).unwrap().run(history).unwrap();
    assert_eq!(report.counters.positions_opened, 1);
    assert_eq!(report.counters.signals_rejected, 1);
    assert_eq!(report.trades.len(), 1);
    assert_eq!(report.trades[0].symbol, "AUSDT");
}

#[test]
fn single_point_is_not_pumped() {
    let mut engine = engine(&Config::default());
    let outcome = engine
        .on_tick(&Snapshot::new("NEWUSDT", ts(0), 5.0, 1.0))
        .unwrap();
    assert_eq!(outcome, TickOutcome::Idle);
    assert!(engine.pump_state("NEWUSDT").unwrap().pct_change().is_none());
    assert_eq!(engine.phase("NEWUSDT"), SymbolPhase::NotPumped);
}

#[test]
fn duplicate_timestamp_rejected_without_state_change() {
    let mut engine = engine(&Config::default());
    engine
        .on_tick(&Snapshot::new("AUSDT", ts(0), 100.0, 1.0))
        .unwrap();

    // A huge duplicate would flag a pump if it were accepted
    let outcome = engine
        .on_tick(&Snapshot::new("AUSDT", ts(0), 500.0, 1.0))
        .unwrap();
    assert!(matches!(
        outcome,
        TickOutcome::Dropped(DataError::DuplicateTimestamp { .. })
    ));
    let state = engine.pump_state("AUSDT").unwrap();
    assert_eq!(state.window.len(), 1);
    assert!(state.pumped_since.is_none());
}

#[test]
fn momentum_rule_alone_can_signal() {
    let mut config = tight_exits();
    config.stall.retrace_enabled = false;
    config.stall.momentum_lookback_ticks = 1;
    let mut engine = engine(&config);

    let outcomes: Vec<TickOutcome> = path("AUSDT", &[100.0, 130.0, 140.0, 139.0])
        .iter()
        .map(|s| engine.on_tick(s).unwrap())
        .collect();
    assert!(matches!(outcomes[3], TickOutcome::Opened(ref p) if p.entry_price == 139.0));
}

#[test]
fn new_episode_can_signal_again() {
    let mut config = tight_exits();
    config.risk.cooldown_minutes = 0;
    let mut engine = engine(&config);

    // First episode: short at 120, stopped out at 124
    let mut prices = PUMP_AND_STALL.to_vec();
    prices.push(124.0);
    // Calm down, then a second, higher pump that stalls
    prices.extend([110.0, 110.0, 160.0, 165.0, 162.0, 155.0]);

    let outcomes: Vec<TickOutcome> = path("AUSDT", &prices)
        .iter()
        .map(|s| engine.on_tick(s).unwrap())
        .collect();

    let opened: Vec<usize> = outcomes
        .iter()
        .enumerate()
        .filter(|(_, o)| matches!(o, TickOutcome::Opened(_)))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(opened.len(), 2);
    assert_eq!(opened[0], 5);
    assert!(matches!(outcomes[6], TickOutcome::Exited(_)));
}

#[test]
fn detector_reports_episode_end() {
    let mut detector = pump_short::strategy::PumpDetector::new(&Config::default().pump);
    let statuses: Vec<PumpStatus> = path("AUSDT", &PUMP_AND_STALL)
        .iter()
        .map(|s| detector.update(s))
        .collect();
    assert!(matches!(statuses[0], PumpStatus::Insufficient));
    assert!(matches!(statuses[2], PumpStatus::Pumped { onset: true, .. }));
    assert!(matches!(statuses[5], PumpStatus::EpisodeEnded { .. }));
}
