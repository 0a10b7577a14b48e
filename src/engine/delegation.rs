use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder,
};
use tracing::debug;

use super::{ApplyOutcome, Touched, ledger};
use crate::address::normalize_address;
use crate::entities::prelude::*;
use crate::entities::{delegate_change, delegate_edge, delegate_mapping};
use crate::error::IndexError;
use crate::events::{DelegateChangedEvent, EventMeta};

pub fn edge_id(contract: &str, delegator: &str, to_delegate: &str) -> String {
    format!("{contract}_{delegator}_{to_delegate}")
}

pub fn mapping_id(contract: &str, delegator: &str) -> String {
    format!("{contract}_{delegator}")
}

/// Records a `DelegateChanged` and moves the delegator's single live edge
/// on the emitting token to the new delegate. Delegations on other tokens
/// are independent.
pub async fn apply_delegate_changed<C: ConnectionTrait>(
    db: &C,
    meta: &EventMeta,
    event: &DelegateChangedEvent,
    touched: &mut Touched,
) -> Result<ApplyOutcome, IndexError> {
    let id = meta.event_id();
    let delegator = normalize_address(&event.delegator, &id)?;
    let from_delegate = normalize_address(&event.from_delegate, &id)?;
    let to_delegate = normalize_address(&event.to_delegate, &id)?;

    if DelegateChange::find_by_id(id.clone()).one(db).await?.is_some() {
        return Ok(ApplyOutcome::Duplicate);
    }

    let power = ledger::current_power(db, &to_delegate).await?;
    let change = delegate_change::ActiveModel {
        id: Set(id.clone()),
        contract: Set(meta.contract.clone()),
        delegator: Set(delegator.clone()),
        from_delegate: Set(from_delegate.clone()),
        to_delegate: Set(to_delegate.clone()),
        power: Set(power.to_string()),
        block_number: Set(meta.block_number),
        block_timestamp: Set(meta.block_timestamp),
        transaction_index: Set(meta.transaction_index),
        log_index: Set(meta.log_index),
        transaction_hash: Set(meta.transaction_hash.clone()),
    }
    .insert(db)
    .await?;

    write_current(db, &change).await?;
    debug!(%delegator, %from_delegate, %to_delegate, event_id = %id, "Delegation changed");

    touched.extend([
        delegator.as_str(),
        from_delegate.as_str(),
        to_delegate.as_str(),
    ]);
    Ok(ApplyOutcome::Applied)
}

/// Makes `change` the delegator's live edge and mapping on its token.
pub(crate) async fn write_current<C: ConnectionTrait>(
    db: &C,
    change: &delegate_change::Model,
) -> Result<(), DbErr> {
    // At most one edge per delegator and token: drop whatever pointed elsewhere.
    DelegateEdge::delete_many()
        .filter(delegate_edge::Column::Contract.eq(change.contract.as_str()))
        .filter(delegate_edge::Column::Delegator.eq(change.delegator.as_str()))
        .exec(db)
        .await?;

    delegate_edge::ActiveModel {
        id: Set(edge_id(&change.contract, &change.delegator, &change.to_delegate)),
        contract: Set(change.contract.clone()),
        delegator: Set(change.delegator.clone()),
        from_delegate: Set(change.from_delegate.clone()),
        to_delegate: Set(change.to_delegate.clone()),
        power: Set(change.power.clone()),
        block_number: Set(change.block_number),
        block_timestamp: Set(change.block_timestamp),
        transaction_hash: Set(change.transaction_hash.clone()),
    }
    .insert(db)
    .await?;

    let id = mapping_id(&change.contract, &change.delegator);
    match DelegateMapping::find_by_id(id.clone()).one(db).await? {
        Some(existing) => {
            let mut mapping = existing.into_active_model();
            mapping.from_delegate = Set(change.from_delegate.clone());
            mapping.to_delegate = Set(change.to_delegate.clone());
            mapping.block_number = Set(change.block_number);
            mapping.block_timestamp = Set(change.block_timestamp);
            mapping.transaction_hash = Set(change.transaction_hash.clone());
            mapping.update(db).await?;
        }
        None => {
            delegate_mapping::ActiveModel {
                id: Set(id),
                contract: Set(change.contract.clone()),
                delegator: Set(change.delegator.clone()),
                from_delegate: Set(change.from_delegate.clone()),
                to_delegate: Set(change.to_delegate.clone()),
                block_number: Set(change.block_number),
                block_timestamp: Set(change.block_timestamp),
                transaction_hash: Set(change.transaction_hash.clone()),
            }
            .insert(db)
            .await?;
        }
    }
    Ok(())
}

/// Rebuilds the delegator's edge and mapping on `contract` from the latest
/// remaining history row, or removes both when no history is left.
pub(crate) async fn restore_delegator<C: ConnectionTrait>(
    db: &C,
    contract: &str,
    delegator: &str,
) -> Result<(), DbErr> {
    let latest = DelegateChange::find()
        .filter(delegate_change::Column::Contract.eq(contract))
        .filter(delegate_change::Column::Delegator.eq(delegator))
        .order_by_desc(delegate_change::Column::BlockNumber)
        .order_by_desc(delegate_change::Column::TransactionIndex)
        .order_by_desc(delegate_change::Column::LogIndex)
        .one(db)
        .await?;

    match latest {
        Some(change) => write_current(db, &change).await,
        None => {
            DelegateEdge::delete_many()
                .filter(delegate_edge::Column::Contract.eq(contract))
                .filter(delegate_edge::Column::Delegator.eq(delegator))
                .exec(db)
                .await?;
            DelegateMapping::delete_by_id(mapping_id(contract, delegator))
                .exec(db)
                .await?;
            Ok(())
        }
    }
}
