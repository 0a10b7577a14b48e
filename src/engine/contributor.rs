use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder,
};

use super::{Touched, ledger};
use crate::entities::prelude::*;
use crate::entities::{
    contributor, delegate_change, delegate_edge, token_transfer, vote_cast, voting_power_record,
};

/// Rebuilds the rollup of `address` from committed state. Running it twice
/// yields the same row.
pub async fn recompute<C: ConnectionTrait>(
    db: &C,
    address: &str,
) -> Result<contributor::Model, DbErr> {
    let delegates = DelegateEdge::find()
        .filter(delegate_edge::Column::ToDelegate.eq(address))
        .count(db)
        .await?;
    let delegate_count = i64::try_from(delegates)
        .map_err(|_| DbErr::Custom(format!("delegate count {delegates} overflows i64")))?;
    let power = ledger::current_power(db, address).await?.to_string();
    let last_vote = latest_vote_timestamp(db, address).await?;
    let (block_number, block_timestamp) = latest_provenance(db, address).await?.unwrap_or((0, 0));

    match Contributor::find_by_id(address.to_string()).one(db).await? {
        Some(existing) => {
            let last_vote_timestamp = last_vote.or(existing.last_vote_timestamp);
            let mut row = existing.into_active_model();
            row.power = Set(power);
            row.delegate_count = Set(delegate_count);
            row.last_vote_timestamp = Set(last_vote_timestamp);
            row.block_number = Set(block_number);
            row.block_timestamp = Set(block_timestamp);
            row.update(db).await
        }
        None => {
            contributor::ActiveModel {
                id: Set(address.to_string()),
                power: Set(power),
                delegate_count: Set(delegate_count),
                last_vote_timestamp: Set(last_vote),
                block_number: Set(block_number),
                block_timestamp: Set(block_timestamp),
            }
            .insert(db)
            .await
        }
    }
}

pub async fn recompute_all<C: ConnectionTrait>(db: &C, touched: &Touched) -> Result<u64, DbErr> {
    let mut count = 0u64;
    for address in touched.iter() {
        recompute(db, address).await?;
        count += 1;
    }
    Ok(count)
}

/// Drops the recorded last vote so the next recompute takes it from the
/// remaining `VoteCast` rows only.
pub(crate) async fn forget_last_vote<C: ConnectionTrait>(db: &C, address: &str) -> Result<(), DbErr> {
    if let Some(existing) = Contributor::find_by_id(address.to_string()).one(db).await? {
        let mut row = existing.into_active_model();
        row.last_vote_timestamp = Set(None);
        row.update(db).await?;
    }
    Ok(())
}

async fn latest_vote_timestamp<C: ConnectionTrait>(
    db: &C,
    voter: &str,
) -> Result<Option<i64>, DbErr> {
    let latest = VoteCast::find()
        .filter(vote_cast::Column::Voter.eq(voter))
        .order_by_desc(vote_cast::Column::BlockNumber)
        .order_by_desc(vote_cast::Column::LogIndex)
        .one(db)
        .await?;
    Ok(latest.map(|vote| vote.block_timestamp))
}

/// Highest `(block_number, block_timestamp)` among the rows that mention
/// `address`.
async fn latest_provenance<C: ConnectionTrait>(
    db: &C,
    address: &str,
) -> Result<Option<(i64, i64)>, DbErr> {
    let mut candidates = Vec::with_capacity(4);

    if let Some(row) = DelegateChange::find()
        .filter(
            Condition::any()
                .add(delegate_change::Column::Delegator.eq(address))
                .add(delegate_change::Column::FromDelegate.eq(address))
                .add(delegate_change::Column::ToDelegate.eq(address)),
        )
        .order_by_desc(delegate_change::Column::BlockNumber)
        .one(db)
        .await?
    {
        candidates.push((row.block_number, row.block_timestamp));
    }

    if let Some(row) = VotingPowerRecord::find()
        .filter(voting_power_record::Column::Delegate.eq(address))
        .order_by_desc(voting_power_record::Column::BlockNumber)
        .one(db)
        .await?
    {
        candidates.push((row.block_number, row.block_timestamp));
    }

    if let Some(row) = TokenTransfer::find()
        .filter(
            Condition::any()
                .add(token_transfer::Column::FromAddress.eq(address))
                .add(token_transfer::Column::ToAddress.eq(address)),
        )
        .order_by_desc(token_transfer::Column::BlockNumber)
        .one(db)
        .await?
    {
        candidates.push((row.block_number, row.block_timestamp));
    }

    if let Some(row) = VoteCast::find()
        .filter(vote_cast::Column::Voter.eq(address))
        .order_by_desc(vote_cast::Column::BlockNumber)
        .one(db)
        .await?
    {
        candidates.push((row.block_number, row.block_timestamp));
    }

    Ok(candidates.into_iter().max())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::ZERO_ADDRESS;
    use crate::testing::{self, GOVERNOR, TOKEN, addr, delegate_changed_log, transfer_log, vote_cast_log};

    #[tokio::test]
    async fn recompute_is_idempotent() {
        let db = testing::setup_database().await;
        let engine = testing::engine();
        let delegate = addr(1);
        engine
            .apply_logs(
                &db,
                &[
                    transfer_log(TOKEN, ZERO_ADDRESS, &addr(2), 40, 10, 0),
                    delegate_changed_log(TOKEN, &addr(2), ZERO_ADDRESS, &delegate, 11, 0),
                    delegate_changed_log(TOKEN, &addr(3), ZERO_ADDRESS, &delegate, 12, 0),
                ],
            )
            .await
            .unwrap();

        let first = recompute(&db, &delegate).await.unwrap();
        let second = recompute(&db, &delegate).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.delegate_count, 2);
        assert_eq!(first.block_number, 12);
    }

    #[tokio::test]
    async fn unknown_address_gets_an_empty_rollup() {
        let db = testing::setup_database().await;
        let row = recompute(&db, &addr(4)).await.unwrap();
        assert_eq!(row.power, "0");
        assert_eq!(row.delegate_count, 0);
        assert_eq!(row.last_vote_timestamp, None);
        assert_eq!(row.block_number, 0);
    }

    #[tokio::test]
    async fn last_vote_survives_until_forgotten() {
        let db = testing::setup_database().await;
        let engine = testing::engine();
        let voter = addr(5);
        engine
            .apply_logs(&db, &[vote_cast_log(GOVERNOR, &voter, 1, 0, 10, 20, 0)])
            .await
            .unwrap();

        VoteCast::delete_many().exec(&db).await.unwrap();
        let kept = recompute(&db, &voter).await.unwrap();
        assert_eq!(kept.last_vote_timestamp, Some(testing::block_timestamp(20) as i64));

        forget_last_vote(&db, &voter).await.unwrap();
        let cleared = recompute(&db, &voter).await.unwrap();
        assert_eq!(cleared.last_vote_timestamp, None);
    }
}
