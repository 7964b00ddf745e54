// ── Snapshot subscriptions ──

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::store::EngineSnapshot;

/// A subscription to the engine's published state.
///
/// Provides both point-in-time access and change notification via
/// `changed()` or by converting to a `Stream`.
pub struct SnapshotStream {
    current: Arc<EngineSnapshot>,
    receiver: watch::Receiver<Arc<EngineSnapshot>>,
}

impl SnapshotStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<EngineSnapshot>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &Arc<EngineSnapshot> {
        &self.current
    }

    /// The latest published snapshot.
    pub fn latest(&self) -> Arc<EngineSnapshot> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next publish. `None` once the engine is dropped.
    pub async fn changed(&mut self) -> Option<Arc<EngineSnapshot>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    pub fn into_stream(self) -> SnapshotWatchStream {
        SnapshotWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding every published snapshot, starting with the
/// current one.
pub struct SnapshotWatchStream {
    inner: WatchStream<Arc<EngineSnapshot>>,
}

impl Stream for SnapshotWatchStream {
    type Item = Arc<EngineSnapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
