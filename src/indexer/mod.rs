use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::try_join_all;
use sea_orm::ActiveModelTrait;
use sea_orm::ActiveValue::Set;
use sea_orm::ColumnTrait;
use sea_orm::ConnectionTrait;
use sea_orm::DatabaseConnection;
use sea_orm::EntityTrait;
use sea_orm::IntoActiveModel;
use sea_orm::QueryFilter;
use sea_orm::QueryOrder;
use sea_orm::QuerySelect;
use sea_orm::TransactionTrait;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::IndexerConfig;
use crate::engine::rollback::rollback_from;
use crate::engine::{BatchReport, EventEngine, fixed_now};
use crate::entities::prelude::*;
use crate::entities::{indexed_block, indexer_checkpoint};
use crate::error::IndexError;
use crate::events::LogRecord;
use crate::retry::RetryHandler;
use crate::rpc::LogSource;
use crate::state::IndexerProgress;

const LOG_CHECKPOINT_ID: &str = "governance_logs";

pub struct ChainIndexer<S> {
    database: DatabaseConnection,
    source: S,
    engine: EventEngine,
    config: IndexerConfig,
    start_block: u64,
    progress: Arc<IndexerProgress>,
    retry: RetryHandler,
}

impl<S: LogSource> ChainIndexer<S> {
    pub fn new(
        database: DatabaseConnection,
        source: S,
        engine: EventEngine,
        config: IndexerConfig,
        start_block: u64,
        progress: Arc<IndexerProgress>,
    ) -> Self {
        assert!(config.batch_size > 0, "Indexer batch size must be positive");
        assert!(
            start_block <= i64::MAX as u64,
            "Start block exceeds storage bounds"
        );
        let retry = RetryHandler::new(config.max_retries, config.retry_base_delay_ms);
        Self {
            database,
            source,
            engine,
            config,
            start_block,
            progress,
            retry,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), IndexError> {
        info!(
            contracts = self.engine.registry().len(),
            start_block = self.start_block,
            "Starting governance log indexer"
        );
        if let Some(last) = load_checkpoint(&self.database).await? {
            self.progress.set_last_indexed_block(last);
        }
        let mut cursor = self.next_block().await?;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    match changed {
                        Ok(_) => {
                            if *shutdown.borrow() {
                                info!("Indexer shutdown signal received");
                                break;
                            }
                        }
                        Err(_) => {
                            warn!("Shutdown channel closed unexpectedly. Exiting indexer loop");
                            break;
                        }
                    }
                }
                _ = sleep(self.config.poll_interval()) => {
                    if let Err(err) = self.tick(&mut cursor, &shutdown).await {
                        error!(next_block = cursor, error = %err, "Indexer tick failed");
                    }
                }
            }
        }

        Ok(())
    }

    /// One poll: reorg check, then up to `max_ranges_per_tick` ranges of
    /// confirmed blocks. `cursor` only moves past committed ranges.
    async fn tick(&self, cursor: &mut u64, shutdown: &watch::Receiver<bool>) -> Result<(), IndexError> {
        if let Some(fork_block) = self.detect_reorg().await? {
            *cursor = self
                .retry
                .execute("rollback", || self.rewind(fork_block))
                .await?;
        }

        let head = self.source.latest_block().await?;
        let Some(safe_head) = head.checked_sub(self.config.confirmations) else {
            debug!(head, "Chain shorter than confirmation depth");
            return Ok(());
        };
        if *cursor > safe_head {
            debug!(next_block = *cursor, safe_head, "Indexer up to date");
            return Ok(());
        }

        let mut ranges = 0;
        while *cursor <= safe_head && ranges < self.config.max_ranges_per_tick {
            if *shutdown.borrow() {
                break;
            }
            let from = *cursor;
            let to = from
                .saturating_add(self.config.batch_size - 1)
                .min(safe_head);
            let report = self
                .retry
                .execute("index range", || self.index_range(from, to))
                .await?;

            self.progress.set_last_indexed_block(to);
            self.progress
                .record_batch(report.skipped, report.warnings.len() as u64);
            info!(
                from,
                to,
                applied = report.applied,
                duplicates = report.duplicates,
                skipped = report.skipped,
                warnings = report.warnings.len(),
                contributors = report.contributors,
                "Indexed block range"
            );
            *cursor = to + 1;
            ranges += 1;
        }
        Ok(())
    }

    /// Fetches every contract's logs for `from..=to`, applies them in one
    /// total order and advances the checkpoint in the same transaction.
    async fn index_range(&self, from: u64, to: u64) -> Result<BatchReport, IndexError> {
        assert!(from <= to, "Block range must not be inverted");
        // Read before the logs so a branch switch mid-fetch is caught by the
        // next reorg check instead of being recorded as canonical.
        let end_hash = self.source.block_hash(to).await?.ok_or_else(|| {
            IndexError::SourceUnavailable(format!("block {to} is not available yet"))
        })?;

        let fetches = self
            .engine
            .registry()
            .contracts()
            .map(|contract| self.source.fetch_logs(&contract.address, from, to));
        let mut logs: Vec<LogRecord> = try_join_all(fetches).await?.into_iter().flatten().collect();
        logs.sort_by_key(LogRecord::ordering_key);

        let hashes = observed_hashes(&logs, to, end_hash)?;

        let txn = self.database.begin().await?;
        let report = self.engine.apply_logs(&txn, &logs).await?;
        record_block_hashes(&txn, &hashes).await?;
        let horizon = to.saturating_sub(self.config.reorg_depth);
        IndexedBlock::delete_many()
            .filter(indexed_block::Column::BlockNumber.lt(horizon as i64))
            .exec(&txn)
            .await?;
        persist_checkpoint(&txn, Some(to)).await?;
        txn.commit().await?;
        Ok(report)
    }

    /// First block to replay: one above the highest stored block whose hash
    /// still matches the source. Hashes are only stored for some heights, so
    /// everything above the last match is suspect, including unrecorded
    /// blocks below the first mismatch.
    async fn detect_reorg(&self) -> Result<Option<u64>, IndexError> {
        let recorded = IndexedBlock::find()
            .order_by_desc(indexed_block::Column::BlockNumber)
            .limit(self.config.reorg_depth.max(1))
            .all(&self.database)
            .await?;
        let Some(newest) = recorded.first().map(|block| block.block_number as u64) else {
            return Ok(None);
        };

        for block in &recorded {
            let number = block.block_number as u64;
            let current = self.source.block_hash(number).await?;
            if current.as_deref() == Some(block.block_hash.as_str()) {
                return Ok((number != newest).then_some(number + 1));
            }
        }

        let fork_block = newest
            .saturating_sub(self.config.reorg_depth)
            .max(self.start_block);
        error!(
            fork_block,
            reorg_depth = self.config.reorg_depth,
            "No recorded block matches the source; replaying the whole reorg window"
        );
        Ok(Some(fork_block))
    }

    /// Deletes everything derived from `fork_block` onwards and rewinds the
    /// checkpoint, atomically. Returns the next block to index.
    async fn rewind(&self, fork_block: u64) -> Result<u64, IndexError> {
        let txn = self.database.begin().await?;
        let report = rollback_from(&txn, fork_block).await?;
        persist_checkpoint(&txn, fork_block.checked_sub(1)).await?;
        txn.commit().await?;

        self.progress.record_rollback();
        self.progress
            .set_last_indexed_block(fork_block.saturating_sub(1));
        warn!(
            fork_block,
            removed_rows = report.removed_rows,
            contributors = report.contributors,
            "Rolled back reorganized blocks"
        );
        Ok(fork_block.max(self.start_block))
    }

    async fn next_block(&self) -> Result<u64, IndexError> {
        let checkpoint = load_checkpoint(&self.database).await?;
        Ok(match checkpoint {
            Some(last) => (last + 1).max(self.start_block),
            None => self.start_block,
        })
    }
}

/// Block hashes carried by the logs plus the range end. Two hashes for one
/// height mean the source switched branches while being read.
fn observed_hashes(
    logs: &[LogRecord],
    to: u64,
    end_hash: String,
) -> Result<BTreeMap<u64, String>, IndexError> {
    let mut hashes = BTreeMap::from([(to, end_hash.to_ascii_lowercase())]);
    for log in logs {
        let Some(hash) = log.block_hash.as_deref() else {
            continue;
        };
        let hash = hash.to_ascii_lowercase();
        match hashes.get(&log.block_number) {
            Some(known) if *known != hash => {
                return Err(IndexError::SourceUnavailable(format!(
                    "block {} changed hash while fetching logs",
                    log.block_number
                )));
            }
            Some(_) => {}
            None => {
                hashes.insert(log.block_number, hash);
            }
        }
    }
    Ok(hashes)
}

async fn record_block_hashes<C: ConnectionTrait>(
    db: &C,
    hashes: &BTreeMap<u64, String>,
) -> Result<(), IndexError> {
    let now = fixed_now();
    for (number, hash) in hashes {
        let block_number = *number as i64;
        match IndexedBlock::find_by_id(block_number).one(db).await? {
            Some(existing) if existing.block_hash == *hash => {}
            Some(existing) => {
                let mut model = existing.into_active_model();
                model.block_hash = Set(hash.clone());
                model.recorded_at = Set(now);
                model.update(db).await?;
            }
            None => {
                indexed_block::ActiveModel {
                    block_number: Set(block_number),
                    block_hash: Set(hash.clone()),
                    recorded_at: Set(now),
                }
                .insert(db)
                .await?;
            }
        }
    }
    Ok(())
}

/// `None` when nothing has been committed yet (or everything was rolled back).
async fn load_checkpoint<C: ConnectionTrait>(db: &C) -> Result<Option<u64>, IndexError> {
    let record = IndexerCheckpoint::find_by_id(LOG_CHECKPOINT_ID.to_string())
        .one(db)
        .await?;
    Ok(record.and_then(|model| u64::try_from(model.last_block_number).ok()))
}

async fn persist_checkpoint<C: ConnectionTrait>(db: &C, block: Option<u64>) -> Result<(), IndexError> {
    let value = match block {
        Some(block) => {
            assert!(block <= i64::MAX as u64, "Checkpoint block exceeds i64 bounds");
            block as i64
        }
        None => -1,
    };

    let now = fixed_now();
    match IndexerCheckpoint::find_by_id(LOG_CHECKPOINT_ID.to_string())
        .one(db)
        .await?
    {
        Some(existing) => {
            let mut checkpoint = existing.into_active_model();
            checkpoint.last_block_number = Set(value);
            checkpoint.updated_at = Set(now);
            checkpoint.update(db).await?;
        }
        None => {
            indexer_checkpoint::ActiveModel {
                id: Set(LOG_CHECKPOINT_ID.to_string()),
                last_block_number: Set(value),
                updated_at: Set(now),
            }
            .insert(db)
            .await?;
        }
    }
    Ok(())
}
