//! Reorg recovery: forget everything derived from blocks at or above the
//! fork point, then rebuild the "current" views from what remains.

use std::collections::BTreeSet;

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::info;

use super::{Touched, contributor, delegation, ledger};
use crate::entities::prelude::*;
use crate::entities::{
    delegate_change, indexed_block, proposal, token_transfer, vote_cast, voting_power_record,
};
use crate::error::IndexError;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RollbackReport {
    pub fork_block: u64,
    pub removed_rows: u64,
    pub contributors: u64,
}

/// Must run inside the same transaction that rewinds the checkpoint.
pub async fn rollback_from<C: ConnectionTrait>(
    db: &C,
    fork_block: u64,
) -> Result<RollbackReport, IndexError> {
    let fork = i64::try_from(fork_block)
        .map_err(|_| IndexError::InvalidConfig(format!("fork block {fork_block} overflows i64")))?;

    let mut touched = Touched::default();
    let mut delegators = BTreeSet::new();
    let mut holders = BTreeSet::new();
    let mut voters = BTreeSet::new();

    let changes = DelegateChange::find()
        .filter(delegate_change::Column::BlockNumber.gte(fork))
        .all(db)
        .await?;
    for change in &changes {
        delegators.insert((change.contract.clone(), change.delegator.clone()));
        touched.extend([
            change.delegator.as_str(),
            change.from_delegate.as_str(),
            change.to_delegate.as_str(),
        ]);
    }

    let records = VotingPowerRecord::find()
        .filter(voting_power_record::Column::BlockNumber.gte(fork))
        .all(db)
        .await?;
    for record in &records {
        touched.insert(&record.delegate);
    }

    let transfers = TokenTransfer::find()
        .filter(token_transfer::Column::BlockNumber.gte(fork))
        .all(db)
        .await?;
    for transfer in &transfers {
        for party in [&transfer.from_address, &transfer.to_address] {
            holders.insert((transfer.contract.clone(), party.clone()));
            touched.insert(party);
        }
    }

    let votes = VoteCast::find()
        .filter(vote_cast::Column::BlockNumber.gte(fork))
        .all(db)
        .await?;
    for vote in &votes {
        voters.insert(vote.voter.clone());
        touched.insert(&vote.voter);
    }

    let mut removed_rows = 0;
    removed_rows += DelegateChange::delete_many()
        .filter(delegate_change::Column::BlockNumber.gte(fork))
        .exec(db)
        .await?
        .rows_affected;
    removed_rows += VotingPowerRecord::delete_many()
        .filter(voting_power_record::Column::BlockNumber.gte(fork))
        .exec(db)
        .await?
        .rows_affected;
    removed_rows += TokenTransfer::delete_many()
        .filter(token_transfer::Column::BlockNumber.gte(fork))
        .exec(db)
        .await?
        .rows_affected;
    removed_rows += VoteCast::delete_many()
        .filter(vote_cast::Column::BlockNumber.gte(fork))
        .exec(db)
        .await?
        .rows_affected;
    removed_rows += Proposal::delete_many()
        .filter(proposal::Column::BlockNumber.gte(fork))
        .exec(db)
        .await?
        .rows_affected;
    IndexedBlock::delete_many()
        .filter(indexed_block::Column::BlockNumber.gte(fork))
        .exec(db)
        .await?;

    for (contract, delegator) in &delegators {
        delegation::restore_delegator(db, contract, delegator).await?;
    }
    for (contract, holder) in &holders {
        if !crate::address::is_zero_address(holder) {
            ledger::rebuild_balance(db, contract, holder).await?;
        }
    }
    for voter in &voters {
        contributor::forget_last_vote(db, voter).await?;
    }
    let contributors = contributor::recompute_all(db, &touched).await?;

    info!(
        fork_block,
        removed_rows,
        contributors,
        "Rolled back derived state"
    );
    Ok(RollbackReport {
        fork_block,
        removed_rows,
        contributors,
    })
}

#[cfg(test)]
mod tests {
    use sea_orm::{PaginatorTrait, TransactionTrait};

    use super::*;
    use crate::address::ZERO_ADDRESS;
    use crate::testing::{
        self, GOVERNOR, TOKEN, addr, delegate_changed_log, delegate_votes_changed_log,
        proposal_created_log, snapshot, transfer_log, vote_cast_log,
    };

    #[tokio::test]
    async fn rollback_then_replay_matches_direct_indexing() {
        let engine = testing::engine();
        let (alice, bob, carol) = (addr(1), addr(2), addr(3));

        let common = vec![
            transfer_log(TOKEN, ZERO_ADDRESS, &alice, 1_000, 10, 0),
            delegate_changed_log(TOKEN, &alice, ZERO_ADDRESS, &alice, 10, 1),
            delegate_votes_changed_log(TOKEN, &alice, 0, 1_000, 10, 2),
            proposal_created_log(GOVERNOR, 1, &bob, "# Keep", 100, 200, 11, 0),
        ];
        let orphaned = vec![
            delegate_changed_log(TOKEN, &alice, &alice, &bob, 12, 0),
            delegate_votes_changed_log(TOKEN, &alice, 1_000, 0, 12, 1),
            delegate_votes_changed_log(TOKEN, &bob, 0, 1_000, 12, 2),
            transfer_log(TOKEN, &alice, &bob, 400, 13, 0),
            vote_cast_log(GOVERNOR, &bob, 1, 1, 1_000, 13, 1),
            proposal_created_log(GOVERNOR, 2, &bob, "# Orphan", 300, 400, 13, 2),
        ];
        let canonical = vec![
            testing::with_tx_salt(delegate_changed_log(TOKEN, &alice, &alice, &carol, 12, 0), 7),
            testing::with_tx_salt(delegate_votes_changed_log(TOKEN, &alice, 1_000, 0, 12, 1), 7),
            testing::with_tx_salt(delegate_votes_changed_log(TOKEN, &carol, 0, 1_000, 12, 2), 7),
            testing::with_tx_salt(vote_cast_log(GOVERNOR, &bob, 1, 0, 0, 13, 0), 7),
            testing::with_tx_salt(transfer_log(TOKEN, &alice, &bob, 400, 13, 1), 7),
        ];

        let forked = testing::setup_database().await;
        engine.apply_logs(&forked, &common).await.unwrap();
        engine.apply_logs(&forked, &orphaned).await.unwrap();
        let txn = forked.begin().await.unwrap();
        let report = rollback_from(&txn, 12).await.unwrap();
        txn.commit().await.unwrap();
        assert!(report.removed_rows >= orphaned.len() as u64);
        engine.apply_logs(&forked, &canonical).await.unwrap();

        let direct = testing::setup_database().await;
        engine.apply_logs(&direct, &common).await.unwrap();
        engine.apply_logs(&direct, &canonical).await.unwrap();

        assert_eq!(snapshot(&forked).await, snapshot(&direct).await);
        assert_eq!(
            Proposal::find().count(&forked).await.unwrap(),
            Proposal::find().count(&direct).await.unwrap()
        );
    }

    #[tokio::test]
    async fn rollback_to_empty_history_clears_current_views() {
        let db = testing::setup_database().await;
        let engine = testing::engine();
        let delegator = addr(4);
        engine
            .apply_logs(
                &db,
                &[
                    transfer_log(TOKEN, ZERO_ADDRESS, &delegator, 5, 20, 0),
                    delegate_changed_log(TOKEN, &delegator, ZERO_ADDRESS, &addr(5), 20, 1),
                ],
            )
            .await
            .unwrap();

        rollback_from(&db, 20).await.unwrap();

        assert_eq!(DelegateEdge::find().count(&db).await.unwrap(), 0);
        assert_eq!(DelegateMapping::find().count(&db).await.unwrap(), 0);
        assert_eq!(TokenBalance::find().count(&db).await.unwrap(), 0);
        let contributor = Contributor::find_by_id(addr(5)).one(&db).await.unwrap().unwrap();
        assert_eq!(contributor.delegate_count, 0);
        assert_eq!(contributor.power, "0");
    }
}
