use std::future::Future;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tandem_types::events::ChangeEvent;

use crate::error::Result;
use crate::notifier::Notifier;

/// Snapshots buffered per subscription before the watcher waits on the consumer.
const SNAPSHOT_BUFFER: usize = 16;

/// A live query owned by the caller.
///
/// Emits a full snapshot when created and again after every relevant
/// change. Several changes arriving together collapse into one snapshot.
/// The watch task stops on `close()` or when the handle is dropped.
pub struct Subscription<T> {
    rx: mpsc::Receiver<Result<T>>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> Subscription<T> {
    /// Start watching. `filter` picks the changes that matter and `load`
    /// re-reads the snapshot. Must be called from within a Tokio runtime.
    pub(crate) fn spawn<F, L, Fut>(notifier: &Notifier, label: String, filter: F, load: L) -> Self
    where
        F: Fn(&ChangeEvent) -> bool + Send + 'static,
        L: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        // Subscribe before the first load so no change slips between them.
        let mut events = notifier.subscribe();
        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            debug!(%label, "subscription opened");

            if tx.send(load().await).await.is_err() {
                return;
            }

            loop {
                let relevant = tokio::select! {
                    _ = token.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(event) => filter(&event),
                        Err(RecvError::Lagged(n)) => {
                            warn!(%label, "subscription lagged by {} changes, reloading", n);
                            true
                        }
                        Err(RecvError::Closed) => break,
                    },
                };
                if !relevant {
                    continue;
                }

                // Drain whatever else is queued; one reload covers it all.
                loop {
                    match events.try_recv() {
                        Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                        Err(_) => break,
                    }
                }

                let snapshot = tokio::select! {
                    _ = token.cancelled() => break,
                    snapshot = load() => snapshot,
                };
                if tx.send(snapshot).await.is_err() {
                    break;
                }
            }

            debug!(%label, "subscription closed");
        });

        Self { rx, cancel }
    }
}

impl<T> Subscription<T> {
    /// Next snapshot. `None` once the subscription is closed and drained.
    pub async fn next(&mut self) -> Option<Result<T>> {
        self.rx.recv().await
    }

    /// Stop the watch task. Snapshots already buffered can still be read.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
