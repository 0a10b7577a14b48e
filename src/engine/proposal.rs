use std::future::Future;

use alloy_primitives::U256;
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, IntoActiveModel};
use serde_json::json;
use tracing::info;

use super::{ApplyOutcome, Touched, fixed_now};
use crate::address::{encode_prefixed, normalize_address};
use crate::entities::prelude::*;
use crate::entities::{proposal, vote_cast};
use crate::error::IndexError;
use crate::events::{EventMeta, ProposalCreatedEvent, VoteCastEvent};

/// Storage key of a proposal: governors number their proposals independently.
pub fn proposal_key(contract: &str, proposal_id: &str) -> String {
    format!("{contract}_{proposal_id}")
}

/// Proposal as handed to a [`GovernorSink`]. `id` is the decimal proposal id
/// emitted by `contract`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProposal {
    pub id: String,
    pub contract: String,
    pub proposer: String,
    pub targets: Vec<String>,
    pub values: Vec<String>,
    pub signatures: Vec<String>,
    pub calldatas: Vec<String>,
    pub description: String,
    pub title: Option<String>,
    pub vote_start_timestamp: i64,
    pub vote_end_timestamp: i64,
    pub block_number: i64,
    pub block_timestamp: i64,
    pub transaction_hash: String,
}

impl NewProposal {
    pub fn key(&self) -> String {
        proposal_key(&self.contract, &self.id)
    }

    pub fn from_event(meta: &EventMeta, event: &ProposalCreatedEvent) -> Result<Self, IndexError> {
        let id = meta.event_id();
        let timestamp = |value, field: &str| {
            u256_to_i64(value)
                .ok_or_else(|| IndexError::malformed(&id, format!("{field} {value} overflows i64")))
        };
        let vote_start_timestamp = timestamp(event.vote_start, "vote start")?;
        let vote_end_timestamp = timestamp(event.vote_end, "vote end")?;

        Ok(Self {
            id: event.proposal_id.to_string(),
            contract: meta.contract.clone(),
            proposer: normalize_address(&event.proposer, &id)?,
            targets: event.targets.clone(),
            values: event.values.iter().map(ToString::to_string).collect(),
            signatures: event.signatures.clone(),
            calldatas: event.calldatas.iter().map(|data| encode_prefixed(data)).collect(),
            description: event.description.clone(),
            title: proposal_title(&event.description),
            vote_start_timestamp,
            vote_end_timestamp,
            block_number: meta.block_number,
            block_timestamp: meta.block_timestamp,
            transaction_hash: meta.transaction_hash.clone(),
        })
    }
}

/// First non-empty line of a description, without leading markdown `#`s.
pub fn proposal_title(description: &str) -> Option<String> {
    description
        .lines()
        .map(|line| line.trim().trim_start_matches('#').trim())
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// `Some(true)` forces a branch, `Some(false)` disables it, `None` keeps the
/// insert-or-update default.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub is_insert: Option<bool>,
    pub is_update: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted,
    Updated,
    Unchanged,
    /// Absent and inserting was disabled.
    Skipped,
}

/// Receiving end for governor proposal events.
pub trait GovernorSink {
    fn store_proposal_created(
        &self,
        proposal: &NewProposal,
        options: StoreOptions,
    ) -> impl Future<Output = Result<StoreOutcome, IndexError>> + Send;
}

pub struct ProposalTracker<'c, C> {
    db: &'c C,
}

impl<'c, C: ConnectionTrait> ProposalTracker<'c, C> {
    pub fn new(db: &'c C) -> Self {
        Self { db }
    }
}

impl<C: ConnectionTrait> GovernorSink for ProposalTracker<'_, C> {
    async fn store_proposal_created(
        &self,
        new: &NewProposal,
        options: StoreOptions,
    ) -> Result<StoreOutcome, IndexError> {
        let existing = Proposal::find_by_id(new.key()).one(self.db).await?;

        let Some(existing) = existing else {
            if options.is_update == Some(true) {
                return Err(IndexError::UnknownProposal {
                    proposal_id: new.id.clone(),
                });
            }
            if options.is_insert == Some(false) {
                return Ok(StoreOutcome::Skipped);
            }
            let now = fixed_now();
            proposal::ActiveModel {
                id: Set(new.key()),
                contract: Set(new.contract.clone()),
                proposal_id: Set(new.id.clone()),
                proposer: Set(new.proposer.clone()),
                targets: Set(json!(new.targets)),
                values: Set(json!(new.values)),
                signatures: Set(json!(new.signatures)),
                calldatas: Set(json!(new.calldatas)),
                description: Set(new.description.clone()),
                title: Set(new.title.clone()),
                vote_start_timestamp: Set(new.vote_start_timestamp),
                vote_end_timestamp: Set(new.vote_end_timestamp),
                block_number: Set(new.block_number),
                block_timestamp: Set(new.block_timestamp),
                transaction_hash: Set(new.transaction_hash.clone()),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(self.db)
            .await?;
            info!(proposal_id = %new.id, governor = %new.contract, proposer = %new.proposer, "Stored new proposal");
            return Ok(StoreOutcome::Inserted);
        };

        if options.is_insert == Some(true) {
            return Err(IndexError::DuplicateProposal {
                proposal_id: new.id.clone(),
            });
        }
        if options.is_update == Some(false) || !differs(&existing, new) {
            return Ok(StoreOutcome::Unchanged);
        }

        let mut row = existing.into_active_model();
        row.title = Set(new.title.clone());
        row.description = Set(new.description.clone());
        row.vote_start_timestamp = Set(new.vote_start_timestamp);
        row.vote_end_timestamp = Set(new.vote_end_timestamp);
        row.updated_at = Set(fixed_now());
        row.update(self.db).await?;
        info!(proposal_id = %new.id, governor = %new.contract, "Updated proposal");
        Ok(StoreOutcome::Updated)
    }
}

fn u256_to_i64(value: U256) -> Option<i64> {
    let limbs = value.as_limbs();
    if limbs[1..].iter().any(|limb| *limb != 0) {
        return None;
    }
    i64::try_from(limbs[0]).ok()
}

fn differs(existing: &proposal::Model, new: &NewProposal) -> bool {
    existing.title != new.title
        || existing.description != new.description
        || existing.vote_start_timestamp != new.vote_start_timestamp
        || existing.vote_end_timestamp != new.vote_end_timestamp
}

pub async fn apply_proposal_created<C: ConnectionTrait>(
    db: &C,
    meta: &EventMeta,
    event: &ProposalCreatedEvent,
) -> Result<ApplyOutcome, IndexError> {
    let new = NewProposal::from_event(meta, event)?;
    let outcome = ProposalTracker::new(db)
        .store_proposal_created(&new, StoreOptions::default())
        .await?;
    Ok(match outcome {
        StoreOutcome::Inserted | StoreOutcome::Updated => ApplyOutcome::Applied,
        StoreOutcome::Unchanged | StoreOutcome::Skipped => ApplyOutcome::Duplicate,
    })
}

pub async fn apply_vote_cast<C: ConnectionTrait>(
    db: &C,
    meta: &EventMeta,
    event: &VoteCastEvent,
    touched: &mut Touched,
) -> Result<ApplyOutcome, IndexError> {
    let id = meta.event_id();
    let voter = normalize_address(&event.voter, &id)?;

    if VoteCast::find_by_id(id.clone()).one(db).await?.is_some() {
        return Ok(ApplyOutcome::Duplicate);
    }

    vote_cast::ActiveModel {
        id: Set(id),
        contract: Set(meta.contract.clone()),
        voter: Set(voter.clone()),
        proposal_id: Set(event.proposal_id.to_string()),
        support: Set(i16::from(event.support)),
        weight: Set(event.weight.to_string()),
        reason: Set((!event.reason.is_empty()).then(|| event.reason.clone())),
        block_number: Set(meta.block_number),
        block_timestamp: Set(meta.block_timestamp),
        transaction_index: Set(meta.transaction_index),
        log_index: Set(meta.log_index),
        transaction_hash: Set(meta.transaction_hash.clone()),
    }
    .insert(db)
    .await?;

    touched.insert(&voter);
    Ok(ApplyOutcome::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, addr};

    fn proposal(id: &str, description: &str) -> NewProposal {
        NewProposal {
            id: id.to_string(),
            contract: testing::GOVERNOR.to_string(),
            proposer: addr(1),
            targets: vec![testing::TOKEN.to_string()],
            values: vec!["0".to_string()],
            signatures: vec![String::new()],
            calldatas: vec!["0x".to_string()],
            description: description.to_string(),
            title: proposal_title(description),
            vote_start_timestamp: 1_000,
            vote_end_timestamp: 2_000,
            block_number: 10,
            block_timestamp: 1_700_000_120,
            transaction_hash: testing::tx_hash(10, 0),
        }
    }

    #[test]
    fn title_is_first_non_empty_line() {
        let cases = [
            ("# Title\nbody", Some("Title")),
            ("\n\n  ## Spaced heading  \nbody", Some("Spaced heading")),
            ("Plain first line", Some("Plain first line")),
            ("#\n# Second", Some("Second")),
            ("   \n", None),
        ];
        for (description, expected) in cases {
            assert_eq!(proposal_title(description).as_deref(), expected, "{description:?}");
        }
    }

    #[tokio::test]
    async fn default_store_inserts_then_updates_then_settles() {
        let db = testing::setup_database().await;
        let tracker = ProposalTracker::new(&db);

        let first = proposal("42", "# Original");
        assert_eq!(
            tracker.store_proposal_created(&first, StoreOptions::default()).await.unwrap(),
            StoreOutcome::Inserted
        );
        assert_eq!(
            tracker.store_proposal_created(&first, StoreOptions::default()).await.unwrap(),
            StoreOutcome::Unchanged
        );

        let edited = proposal("42", "# Edited\nmore detail");
        assert_eq!(
            tracker.store_proposal_created(&edited, StoreOptions::default()).await.unwrap(),
            StoreOutcome::Updated
        );
        let stored = Proposal::find_by_id(proposal_key(testing::GOVERNOR, "42"))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.proposal_id, "42");
        assert_eq!(stored.title.as_deref(), Some("Edited"));
    }

    #[tokio::test]
    async fn forced_insert_of_existing_proposal_fails() {
        let db = testing::setup_database().await;
        let tracker = ProposalTracker::new(&db);
        let options = StoreOptions {
            is_insert: Some(true),
            is_update: None,
        };

        tracker.store_proposal_created(&proposal("7", "# Seven"), options).await.unwrap();
        let err = tracker
            .store_proposal_created(&proposal("7", "# Seven"), options)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::DuplicateProposal { proposal_id } if proposal_id == "7"));
    }

    #[tokio::test]
    async fn forced_update_requires_existing_proposal() {
        let db = testing::setup_database().await;
        let tracker = ProposalTracker::new(&db);
        let options = StoreOptions {
            is_insert: None,
            is_update: Some(true),
        };

        let err = tracker
            .store_proposal_created(&proposal("8", "# Eight"), options)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::UnknownProposal { .. }));
    }

    #[tokio::test]
    async fn disabled_branches_leave_storage_alone() {
        let db = testing::setup_database().await;
        let tracker = ProposalTracker::new(&db);
        let no_insert = StoreOptions {
            is_insert: Some(false),
            is_update: None,
        };
        assert_eq!(
            tracker.store_proposal_created(&proposal("9", "# Nine"), no_insert).await.unwrap(),
            StoreOutcome::Skipped
        );
        assert!(
            Proposal::find_by_id(proposal_key(testing::GOVERNOR, "9"))
                .one(&db)
                .await
                .unwrap()
                .is_none()
        );

        tracker
            .store_proposal_created(&proposal("9", "# Nine"), StoreOptions::default())
            .await
            .unwrap();
        let no_update = StoreOptions {
            is_insert: None,
            is_update: Some(false),
        };
        assert_eq!(
            tracker.store_proposal_created(&proposal("9", "# Renamed"), no_update).await.unwrap(),
            StoreOutcome::Unchanged
        );
    }

    #[tokio::test]
    async fn equal_ids_from_two_governors_are_kept_apart() {
        let db = testing::setup_database().await;
        let tracker = ProposalTracker::new(&db);
        let first = proposal("1", "# First governor");
        let second = NewProposal {
            contract: addr(0xc3),
            ..proposal("1", "# Second governor")
        };

        for new in [&first, &second] {
            assert_eq!(
                tracker.store_proposal_created(new, StoreOptions::default()).await.unwrap(),
                StoreOutcome::Inserted
            );
        }

        let stored = Proposal::find_by_id(first.key()).one(&db).await.unwrap().unwrap();
        assert_eq!(stored.title.as_deref(), Some("First governor"));
        let stored = Proposal::find_by_id(second.key()).one(&db).await.unwrap().unwrap();
        assert_eq!(stored.title.as_deref(), Some("Second governor"));
    }

    #[tokio::test]
    async fn oversized_vote_window_is_malformed() {
        let log =
            testing::proposal_created_log(testing::GOVERNOR, 1, &addr(2), "# Big", 0, 0, 10, 0);
        let decoded = crate::events::decode_log(&testing::registry(), &log).unwrap().unwrap();
        let crate::events::GovernanceEvent::ProposalCreated(mut event) = decoded.event else {
            panic!("expected ProposalCreated");
        };
        event.vote_end = alloy_primitives::U256::MAX;
        assert!(matches!(
            NewProposal::from_event(&decoded.meta, &event),
            Err(IndexError::MalformedEvent { .. })
        ));
    }
}
