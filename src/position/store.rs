//! Durable state for live and paper runs
//!
//! - `trades.jsonl`: append-only journal of closed trades
//! - `account.json`: latest account snapshot, replaced atomically

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::account::AccountState;
use super::manager::Trade;
use crate::error::{Error, Result};

const TRADES_FILE: &str = "trades.jsonl";
const ACCOUNT_FILE: &str = "account.json";

/// File-backed state store rooted at a directory
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Open a store, creating the directory if needed
    pub async fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::PositionPersistence(format!("{}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn trades_path(&self) -> PathBuf {
        self.dir.join(TRADES_FILE)
    }

    pub fn account_path(&self) -> PathBuf {
        self.dir.join(ACCOUNT_FILE)
    }

    /// Append one closed trade to the journal
    pub async fn append_trade(&self, trade: &Trade) -> Result<()> {
        let mut line = serde_json::to_string(trade)
            .map_err(|e| Error::PositionPersistence(e.to_string()))?;
        line.push('\n');

        let path = self.trades_path();
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Error::PositionPersistence(format!("{}: {}", path.display(), e)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::PositionPersistence(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| Error::PositionPersistence(e.to_string()))?;

        debug!("Journaled {} trade", trade.symbol);
        Ok(())
    }

    /// Replace the account snapshot (write to a temp file, then rename)
    pub async fn save_account(&self, account: &AccountState) -> Result<()> {
        let data = serde_json::to_string_pretty(account)
            .map_err(|e| Error::PositionPersistence(e.to_string()))?;

        let path = self.account_path();
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| Error::PositionPersistence(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::PositionPersistence(format!("{}: {}", path.display(), e)))?;

        debug!(
            "Saved account ({} open positions) to {}",
            account.open_count(),
            path.display()
        );
        Ok(())
    }

    /// Load the account snapshot; `None` when nothing was saved yet
    pub async fn load_account(&self) -> Result<Option<AccountState>> {
        let path = self.account_path();
        if !path.exists() {
            return Ok(None);
        }

        let data = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::PositionPersistence(format!("{}: {}", path.display(), e)))?;
        let account: AccountState = serde_json::from_str(&data)
            .map_err(|e| Error::PositionPersistence(format!("{}: {}", path.display(), e)))?;

        info!(
            "Loaded account from {}: equity {:.2}, {} open positions",
            path.display(),
            account.equity,
            account.open_count()
        );
        Ok(Some(account))
    }

    /// Read the whole trade journal
    pub async fn load_trades(&self) -> Result<Vec<Trade>> {
        let path = self.trades_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let data = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::PositionPersistence(format!("{}: {}", path.display(), e)))?;

        data.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line).map_err(|e| {
                    Error::PositionPersistence(format!(
                        "{} line {}: {}",
                        path.display(),
                        idx + 1,
                        e
                    ))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::manager::{ExitReason, Position};
    use crate::trading::OrderId;
    use chrono::{TimeZone, Utc};

    fn trade(symbol: &str) -> Trade {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        Trade {
            symbol: symbol.to_string(),
            order_id: OrderId("sim-000001".into()),
            entry_price: 120.0,
            exit_price: 124.0,
            entry_fill: 120.0,
            exit_fill: 124.0,
            entry_time: t,
            exit_time: t,
            size: 1.0,
            notional: 120.0,
            pnl_pct: -3.3333,
            pnl: -4.0,
            fees: 0.0,
            slippage: 0.0,
            exit_reason: ExitReason::StopLoss,
            ticks_held: 1,
            mfe_pct: 0.0,
            mae_pct: 3.3333,
        }
    }

    #[tokio::test]
    async fn test_missing_account_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state")).await.unwrap();
        assert!(store.load_account().await.unwrap().is_none());
        assert!(store.load_trades().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_account_roundtrip_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).await.unwrap();

        let mut account = AccountState::new(1000.0);
        store.save_account(&account).await.unwrap();

        let t = Utc.with_ymd_and_hms(2024, 3, 1, 1, 0, 0).unwrap();
        account.open_positions.insert(
            "A".into(),
            Position {
                symbol: "A".into(),
                order_id: OrderId("sim-000002".into()),
                entry_price: 2.0,
                entry_fill: 2.0,
                entry_time: t,
                size: 20.0,
                notional: 40.0,
                stop_loss_price: 8.0,
                take_profit_price: 1.2,
                ticks_held: 3,
                last_price: 1.9,
                last_update: t,
                low_price: 1.9,
                high_price: 2.1,
            },
        );
        store.save_account(&account).await.unwrap();

        let loaded = store.load_account().await.unwrap().unwrap();
        assert_eq!(loaded, account);
        assert!(!store.account_path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_trade_journal_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).await.unwrap();
        store.append_trade(&trade("A")).await.unwrap();
        store.append_trade(&trade("B")).await.unwrap();

        let trades = store.load_trades().await.unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[1].symbol, "B");
        assert_eq!(trades[0].exit_reason, ExitReason::StopLoss);
    }

    #[tokio::test]
    async fn test_corrupt_account_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).await.unwrap();
        std::fs::write(store.account_path(), "{not json").unwrap();
        assert!(matches!(
            store.load_account().await,
            Err(Error::PositionPersistence(_))
        ));
    }
}
