use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use sea_orm::DatabaseConnection;

/// Progress counters shared between the indexer task and the health endpoints.
/// Nothing here is authoritative; the database is.
#[derive(Debug, Default)]
pub struct IndexerProgress {
    last_indexed_block: AtomicU64,
    skipped_events: AtomicU64,
    consistency_warnings: AtomicU64,
    rollbacks: AtomicU64,
}

impl IndexerProgress {
    pub fn set_last_indexed_block(&self, block: u64) {
        self.last_indexed_block.store(block, Ordering::SeqCst);
    }

    pub fn record_batch(&self, skipped: u64, warnings: u64) {
        self.skipped_events.fetch_add(skipped, Ordering::Relaxed);
        self.consistency_warnings.fetch_add(warnings, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_indexed_block(&self) -> u64 {
        self.last_indexed_block.load(Ordering::SeqCst)
    }

    pub fn skipped_events(&self) -> u64 {
        self.skipped_events.load(Ordering::Relaxed)
    }

    pub fn consistency_warnings(&self) -> u64 {
        self.consistency_warnings.load(Ordering::Relaxed)
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub database: DatabaseConnection,
    pub progress: Arc<IndexerProgress>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(database: DatabaseConnection, progress: Arc<IndexerProgress>) -> Self {
        assert!(
            Arc::strong_count(&progress) >= 1,
            "Indexer progress must be shared"
        );
        Self {
            database,
            progress,
            start_time: Instant::now(),
        }
    }
}
