//! Snapshot feeds for live mode
//!
//! Waiting on the feed is the only suspension point of a live run. Once a
//! snapshot is handed over, the engine processes it to completion.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use super::Snapshot;

/// Source of snapshots; `None` means end of stream
#[async_trait]
pub trait SnapshotFeed: Send {
    async fn next_snapshot(&mut self) -> Option<Snapshot>;
}

/// Feed backed by a bounded tokio channel
pub struct ChannelFeed {
    rx: mpsc::Receiver<Snapshot>,
}

impl ChannelFeed {
    /// Create a feed plus the sender an exchange adapter pushes into
    pub fn new(capacity: usize) -> (mpsc::Sender<Snapshot>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl SnapshotFeed for ChannelFeed {
    async fn next_snapshot(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }
}

/// Adapter over any `Stream` of snapshots
pub struct StreamFeed<S> {
    stream: S,
}

impl<S> StreamFeed<S>
where
    S: Stream<Item = Snapshot> + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<S> SnapshotFeed for StreamFeed<S>
where
    S: Stream<Item = Snapshot> + Unpin + Send,
{
    async fn next_snapshot(&mut self) -> Option<Snapshot> {
        self.stream.next().await
    }
}
