//! CLI command implementations

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::backtest::BacktestRunner;
use crate::config::Config;
use crate::live::LiveRunner;
use crate::market::{self, ChannelFeed};
use crate::position::StateStore;
use crate::trading::SimulatedGateway;

/// Replay history files and print the report
pub async fn backtest(
    config: &Config,
    inputs: &[PathBuf],
    trades_out: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let mut history = Vec::new();
    for path in inputs {
        let snapshots = market::load_history_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
        history.extend(snapshots);
    }
    info!("Loaded {} snapshots from {} files", history.len(), inputs.len());

    let runner = BacktestRunner::new(config.clone())?;
    let report = runner.run(history)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary());
    }

    if let Some(path) = trades_out {
        report.write_trades(&path)?;
        info!("Wrote {} trades to {}", report.trades.len(), path.display());
    }

    Ok(())
}

/// Stream a history file through the live loop with the simulated gateway
pub async fn paper(config: &Config, input: PathBuf) -> Result<()> {
    warn!("Paper mode: orders go to the simulated gateway");

    let store = StateStore::open(&config.persistence.state_dir).await?;
    let mut runner = LiveRunner::restore(config, store, |account| {
        SimulatedGateway::with_open_symbols(account.open_positions.keys().cloned())
    })
    .await?;

    let (tx, mut feed) = ChannelFeed::new(config.live.channel_capacity);
    let producer = tokio::spawn(async move { market::stream_history_file(input, tx).await });

    let token = runner.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current tick");
            token.cancel();
        }
    });

    let stats = runner.run(&mut feed).await?;
    // Unblocks the producer if the run stopped before the file ended
    drop(feed);

    match producer.await {
        Ok(Ok(sent)) => info!("Streamed {} snapshots", sent),
        Ok(Err(e)) => {
            error!("History stream failed: {}", e);
            return Err(e.into());
        }
        Err(e) => return Err(anyhow::anyhow!("History stream task failed: {}", e)),
    }

    let account = runner.engine().account();
    println!("\n=== PAPER RUN ===\n");
    println!("Ticks: {} ({} dropped)", stats.ticks, stats.dropped);
    println!(
        "Opened: {}  Closed: {}  Rejected: {}",
        stats.opened, stats.closed, stats.rejected
    );
    println!(
        "Equity: {:.2} ({:+.2}%), {} open positions",
        account.equity,
        account.return_pct(),
        account.open_count()
    );

    Ok(())
}

/// Show the last persisted account snapshot
pub async fn status(config: &Config) -> Result<()> {
    let store = StateStore::open(&config.persistence.state_dir).await?;

    let Some(account) = store.load_account().await? else {
        println!("No saved state in {}", store.dir().display());
        return Ok(());
    };

    println!("\n=== ACCOUNT STATUS ===\n");
    println!(
        "Equity: {:.2} (initial {:.2}, {:+.2}%)",
        account.equity,
        account.initial_equity,
        account.return_pct()
    );
    println!(
        "Realized P&L: {:+.2} (fees {:.2}), drawdown {:.2}%",
        account.realized_pnl,
        account.fees_paid,
        account.drawdown_pct()
    );
    println!(
        "Trades: {} (win rate {:.1}%)",
        account.closed_trades,
        account.win_rate() * 100.0
    );
    if let Some(updated) = account.updated_at {
        println!("Last update: {}", updated.to_rfc3339());
    }

    println!("\n=== OPEN POSITIONS ===\n");
    if account.open_positions.is_empty() {
        println!("No open positions.");
    }
    for position in account.open_positions.values() {
        println!(
            "{:<14} entry {:<12} last {:<12} {:+7.2}%  SL {:.6}  TP {:.6}  {} ticks",
            position.symbol,
            position.entry_price,
            position.last_price,
            position.unrealized_pnl_pct(),
            position.stop_loss_price,
            position.take_profit_price,
            position.ticks_held
        );
    }

    Ok(())
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.summary());
    Ok(())
}
