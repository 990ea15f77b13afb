use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use tandem_types::events::ChangeEvent;

const DEFAULT_CAPACITY: usize = 1024;

/// Fans store changes out to every live subscription.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

struct NotifierInner {
    /// Every subscriber sees every change and filters for itself
    tx: broadcast::Sender<ChangeEvent>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(NotifierInner { tx }),
        }
    }

    /// Subscribe to raw change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.tx.subscribe()
    }

    /// Publish a change. Having no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        trace!(?event, "publishing change");
        let _ = self.inner.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.tx.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
