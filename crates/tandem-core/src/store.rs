use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use tandem_db::Database;

use crate::error::{CoreError, Result};

/// Async handle over the SQLite store. Every call runs on the blocking
/// pool so the runtime never waits on a database lock.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }

    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| CoreError::Persistence(anyhow::anyhow!("spawn_blocking join error: {}", e)))?
            .map_err(CoreError::Persistence)
    }
}

static LAST_STAMP_MICROS: AtomicI64 = AtomicI64::new(0);

/// Wall-clock time, strictly increasing across calls in this process at
/// microsecond resolution.
pub(crate) fn now() -> DateTime<Utc> {
    let wall = Utc::now();
    let micros = wall.timestamp_micros();
    let prev = LAST_STAMP_MICROS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(micros.max(last + 1)))
        .unwrap_or(micros);
    DateTime::from_timestamp_micros(micros.max(prev + 1)).unwrap_or(wall)
}
