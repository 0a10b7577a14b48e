//! Applies decoded governance events to the derived tables.
//!
//! Events are applied strictly in the order given. Every write is keyed by
//! the event id (`{transaction_hash}_{log_index}`), so re-delivering a batch
//! leaves the tables unchanged. Contributor rollups are recomputed once per
//! batch for every address the batch touched, inside the caller's
//! transaction.

pub mod contributor;
pub mod delegation;
pub mod ledger;
pub mod proposal;
pub mod rollback;

use std::collections::BTreeSet;

use chrono::Utc;
use sea_orm::ConnectionTrait;
use sea_orm::prelude::DateTimeWithTimeZone;
use tracing::{debug, warn};

use crate::address::is_zero_address;
use crate::error::{IndexError, PowerConsistencyWarning};
use crate::events::{ContractRegistry, DecodedLog, GovernanceEvent, LogRecord, decode_log};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The event id was already applied; nothing was written.
    Duplicate,
    /// Applied, but the voting power did not chain onto the previous record.
    Inconsistent(PowerConsistencyWarning),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub applied: u64,
    pub duplicates: u64,
    pub skipped: u64,
    pub ignored: u64,
    pub warnings: Vec<PowerConsistencyWarning>,
    pub contributors: u64,
}

/// Addresses whose contributor rollup must be recomputed. The zero address
/// never gets a contributor.
#[derive(Debug, Default, Clone)]
pub struct Touched(BTreeSet<String>);

impl Touched {
    pub fn insert(&mut self, address: &str) {
        if !is_zero_address(address) {
            self.0.insert(address.to_string());
        }
    }

    pub fn extend<'a>(&mut self, addresses: impl IntoIterator<Item = &'a str>) {
        for address in addresses {
            self.insert(address);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

pub struct EventEngine {
    registry: ContractRegistry,
}

impl EventEngine {
    pub fn new(registry: ContractRegistry) -> Self {
        assert!(!registry.is_empty(), "At least one contract must be configured");
        Self { registry }
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    /// Applies `logs` in order. Malformed events are logged and skipped;
    /// any other failure aborts the batch and the caller must roll back.
    pub async fn apply_logs<C: ConnectionTrait>(
        &self,
        db: &C,
        logs: &[LogRecord],
    ) -> Result<BatchReport, IndexError> {
        let mut report = BatchReport::default();
        let mut touched = Touched::default();

        for log in logs {
            match self.apply_log(db, log, &mut touched).await {
                Ok(None) => report.ignored += 1,
                Ok(Some(ApplyOutcome::Applied)) => report.applied += 1,
                Ok(Some(ApplyOutcome::Duplicate)) => report.duplicates += 1,
                Ok(Some(ApplyOutcome::Inconsistent(warning))) => {
                    warn!(
                        delegate = %warning.delegate,
                        event_id = %warning.event_id,
                        block = warning.block_number,
                        expected = %warning.expected_previous,
                        observed = %warning.observed_previous,
                        "Voting power consistency warning"
                    );
                    report.applied += 1;
                    report.warnings.push(warning);
                }
                Err(IndexError::MalformedEvent { event_id, reason }) => {
                    warn!(%event_id, %reason, block = log.block_number, "Skipping malformed event");
                    report.skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        report.contributors = contributor::recompute_all(db, &touched).await?;
        debug!(
            applied = report.applied,
            duplicates = report.duplicates,
            skipped = report.skipped,
            contributors = report.contributors,
            "Applied log batch"
        );
        Ok(report)
    }

    async fn apply_log<C: ConnectionTrait>(
        &self,
        db: &C,
        log: &LogRecord,
        touched: &mut Touched,
    ) -> Result<Option<ApplyOutcome>, IndexError> {
        let Some(DecodedLog { meta, event }) = decode_log(&self.registry, log)? else {
            return Ok(None);
        };

        let outcome = match &event {
            GovernanceEvent::Transfer(transfer) => {
                ledger::apply_transfer(db, &meta, transfer, touched).await?
            }
            GovernanceEvent::DelegateChanged(change) => {
                delegation::apply_delegate_changed(db, &meta, change, touched).await?
            }
            GovernanceEvent::DelegateVotesChanged(votes) => {
                ledger::apply_delegate_votes_changed(db, &meta, votes, touched).await?
            }
            GovernanceEvent::ProposalCreated(created) => {
                proposal::apply_proposal_created(db, &meta, created).await?
            }
            GovernanceEvent::VoteCast(vote) => {
                proposal::apply_vote_cast(db, &meta, vote, touched).await?
            }
        };
        debug!(
            kind = event.kind().name(),
            event_id = %meta.event_id(),
            outcome = ?outcome,
            "Applied event"
        );
        Ok(Some(outcome))
    }
}

pub(crate) fn fixed_now() -> DateTimeWithTimeZone {
    Utc::now().fixed_offset()
}
