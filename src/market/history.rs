//! Historical snapshot loading (JSON Lines)
//!
//! One snapshot per line:
//! `{"symbol":"PEPEUSDT","timestamp":"2024-03-01T00:15:00Z","price":0.5,"volume":1200.0}`

use std::io::BufRead;
use std::path::Path;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::Snapshot;
use crate::error::{Error, Result};

/// Parse snapshots from a reader; `origin` names the source in errors
pub fn load_history<R: BufRead>(reader: R, origin: &str) -> Result<Vec<Snapshot>> {
    let mut snapshots = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if let Some(snapshot) = parse_line(&line, origin, idx + 1)? {
            snapshots.push(snapshot);
        }
    }

    debug!("Parsed {} snapshots from {}", snapshots.len(), origin);
    Ok(snapshots)
}

/// Load every snapshot in a JSONL file
pub fn load_history_file<P: AsRef<Path>>(path: P) -> Result<Vec<Snapshot>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|e| Error::Io(format!("Cannot open {}: {}", path.display(), e)))?;

    let snapshots = load_history(std::io::BufReader::new(file), &path.display().to_string())?;
    info!("Loaded {} snapshots from {}", snapshots.len(), path.display());
    Ok(snapshots)
}

/// Stream a JSONL file into a channel, line by line
///
/// Returns the number of snapshots sent. Stops early if the receiver is gone.
pub async fn stream_history_file<P: AsRef<Path>>(
    path: P,
    tx: mpsc::Sender<Snapshot>,
) -> Result<usize> {
    let path = path.as_ref();
    let origin = path.display().to_string();
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::Io(format!("Cannot open {}: {}", origin, e)))?;

    let mut lines = tokio::io::BufReader::new(file).lines();
    let mut line_no = 0;
    let mut sent = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let Some(snapshot) = parse_line(&line, &origin, line_no)? else {
            continue;
        };
        if tx.send(snapshot).await.is_err() {
            debug!("Snapshot receiver closed after {} lines", line_no);
            break;
        }
        sent += 1;
    }

    Ok(sent)
}

fn parse_line(line: &str, origin: &str, line_no: usize) -> Result<Option<Snapshot>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| Error::HistoryParse {
            path: origin.to_string(),
            line: line_no,
            reason: e.to_string(),
        })
}
