//! Voting power history and transfer-inferred balances.
//!
//! On each token a delegate's power is the `new_votes` of its latest
//! `DelegateVotesChanged` there. Until such a record exists the transfer
//! baseline on that token stands in for it. Power across tokens is summed.

use alloy_primitives::U256;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect,
};

use super::{ApplyOutcome, Touched};
use crate::address::{is_zero_address, normalize_address};
use crate::entities::prelude::*;
use crate::entities::{token_balance, token_transfer, voting_power_record};
use crate::error::{IndexError, PowerConsistencyWarning};
use crate::events::{DelegateVotesChangedEvent, EventMeta, TransferEvent};

pub fn balance_id(contract: &str, holder: &str) -> String {
    format!("{contract}_{holder}")
}

pub(crate) fn parse_amount(value: &str) -> Result<U256, DbErr> {
    U256::from_str_radix(value, 10)
        .map_err(|err| DbErr::Custom(format!("stored amount {value:?} is not decimal: {err}")))
}

pub async fn apply_delegate_votes_changed<C: ConnectionTrait>(
    db: &C,
    meta: &EventMeta,
    event: &DelegateVotesChangedEvent,
    touched: &mut Touched,
) -> Result<ApplyOutcome, IndexError> {
    let id = meta.event_id();
    let delegate = normalize_address(&event.delegate, &id)?;

    if VotingPowerRecord::find_by_id(id.clone()).one(db).await?.is_some() {
        return Ok(ApplyOutcome::Duplicate);
    }

    let warning = match latest_power_record(db, &meta.contract, &delegate).await? {
        Some(previous) => {
            let expected = parse_amount(&previous.new_votes)?;
            (expected != event.previous_votes).then(|| PowerConsistencyWarning {
                delegate: delegate.clone(),
                event_id: id.clone(),
                block_number: meta.block_number as u64,
                expected_previous: expected.to_string(),
                observed_previous: event.previous_votes.to_string(),
            })
        }
        None => None,
    };

    voting_power_record::ActiveModel {
        id: Set(id),
        contract: Set(meta.contract.clone()),
        delegate: Set(delegate.clone()),
        previous_votes: Set(event.previous_votes.to_string()),
        new_votes: Set(event.new_votes.to_string()),
        consistent: Set(warning.is_none()),
        block_number: Set(meta.block_number),
        block_timestamp: Set(meta.block_timestamp),
        transaction_index: Set(meta.transaction_index),
        log_index: Set(meta.log_index),
        transaction_hash: Set(meta.transaction_hash.clone()),
    }
    .insert(db)
    .await?;

    touched.insert(&delegate);
    Ok(match warning {
        Some(warning) => ApplyOutcome::Inconsistent(warning),
        None => ApplyOutcome::Applied,
    })
}

pub async fn apply_transfer<C: ConnectionTrait>(
    db: &C,
    meta: &EventMeta,
    event: &TransferEvent,
    touched: &mut Touched,
) -> Result<ApplyOutcome, IndexError> {
    let id = meta.event_id();
    let from = normalize_address(&event.from, &id)?;
    let to = normalize_address(&event.to, &id)?;

    if TokenTransfer::find_by_id(id.clone()).one(db).await?.is_some() {
        return Ok(ApplyOutcome::Duplicate);
    }

    token_transfer::ActiveModel {
        id: Set(id),
        contract: Set(meta.contract.clone()),
        from_address: Set(from.clone()),
        to_address: Set(to.clone()),
        value: Set(event.value.to_string()),
        token_id: Set(event.token_id.map(|token| token.to_string())),
        block_number: Set(meta.block_number),
        block_timestamp: Set(meta.block_timestamp),
        transaction_index: Set(meta.transaction_index),
        log_index: Set(meta.log_index),
        transaction_hash: Set(meta.transaction_hash.clone()),
    }
    .insert(db)
    .await?;

    if from != to {
        if !is_zero_address(&from) {
            let current = balance_of(db, &meta.contract, &from).await?;
            write_balance(db, meta, &from, current.saturating_sub(event.value)).await?;
        }
        if !is_zero_address(&to) {
            let current = balance_of(db, &meta.contract, &to).await?;
            write_balance(db, meta, &to, current.saturating_add(event.value)).await?;
        }
    }

    touched.extend([from.as_str(), to.as_str()]);
    Ok(ApplyOutcome::Applied)
}

/// Latest record of `delegate` on `contract` by `(block, transaction index,
/// log index)`.
pub async fn latest_power_record<C: ConnectionTrait>(
    db: &C,
    contract: &str,
    delegate: &str,
) -> Result<Option<voting_power_record::Model>, DbErr> {
    VotingPowerRecord::find()
        .filter(voting_power_record::Column::Contract.eq(contract))
        .filter(voting_power_record::Column::Delegate.eq(delegate))
        .order_by_desc(voting_power_record::Column::BlockNumber)
        .order_by_desc(voting_power_record::Column::TransactionIndex)
        .order_by_desc(voting_power_record::Column::LogIndex)
        .one(db)
        .await
}

/// Sum of the holder's baselines across every configured token.
pub async fn baseline_power<C: ConnectionTrait>(db: &C, holder: &str) -> Result<U256, DbErr> {
    let balances = TokenBalance::find()
        .filter(token_balance::Column::Holder.eq(holder))
        .all(db)
        .await?;
    let mut total = U256::ZERO;
    for row in &balances {
        total = total.saturating_add(parse_amount(&row.balance)?);
    }
    Ok(total)
}

/// Power summed over tokens; on each token recorded voting power wins over
/// the transfer baseline.
pub async fn current_power<C: ConnectionTrait>(db: &C, address: &str) -> Result<U256, DbErr> {
    let recorded: Vec<String> = VotingPowerRecord::find()
        .select_only()
        .column(voting_power_record::Column::Contract)
        .distinct()
        .filter(voting_power_record::Column::Delegate.eq(address))
        .into_tuple()
        .all(db)
        .await?;

    let mut total = U256::ZERO;
    for contract in &recorded {
        if let Some(record) = latest_power_record(db, contract, address).await? {
            total = total.saturating_add(parse_amount(&record.new_votes)?);
        }
    }

    let balances = TokenBalance::find()
        .filter(token_balance::Column::Holder.eq(address))
        .all(db)
        .await?;
    for row in balances.iter().filter(|row| !recorded.contains(&row.contract)) {
        total = total.saturating_add(parse_amount(&row.balance)?);
    }
    Ok(total)
}

async fn balance_of<C: ConnectionTrait>(db: &C, contract: &str, holder: &str) -> Result<U256, DbErr> {
    match TokenBalance::find_by_id(balance_id(contract, holder)).one(db).await? {
        Some(row) => parse_amount(&row.balance),
        None => Ok(U256::ZERO),
    }
}

async fn write_balance<C: ConnectionTrait>(
    db: &C,
    provenance: &EventMeta,
    holder: &str,
    balance: U256,
) -> Result<(), DbErr> {
    let (contract, block_number, block_timestamp) = (
        provenance.contract.as_str(),
        provenance.block_number,
        provenance.block_timestamp,
    );
    let id = balance_id(contract, holder);
    match TokenBalance::find_by_id(id.clone()).one(db).await? {
        Some(existing) => {
            let mut row = existing.into_active_model();
            row.balance = Set(balance.to_string());
            row.block_number = Set(block_number);
            row.block_timestamp = Set(block_timestamp);
            row.update(db).await?;
        }
        None => {
            token_balance::ActiveModel {
                id: Set(id),
                contract: Set(contract.to_string()),
                holder: Set(holder.to_string()),
                balance: Set(balance.to_string()),
                block_number: Set(block_number),
                block_timestamp: Set(block_timestamp),
            }
            .insert(db)
            .await?;
        }
    }
    Ok(())
}

/// Recomputes a baseline from the transfers still on record, deleting it
/// when none remain.
pub(crate) async fn rebuild_balance<C: ConnectionTrait>(
    db: &C,
    contract: &str,
    holder: &str,
) -> Result<(), DbErr> {
    let transfers = TokenTransfer::find()
        .filter(token_transfer::Column::Contract.eq(contract))
        .filter(
            Condition::any()
                .add(token_transfer::Column::FromAddress.eq(holder))
                .add(token_transfer::Column::ToAddress.eq(holder)),
        )
        .order_by_asc(token_transfer::Column::BlockNumber)
        .order_by_asc(token_transfer::Column::TransactionIndex)
        .order_by_asc(token_transfer::Column::LogIndex)
        .all(db)
        .await?;

    let Some(last) = transfers.last() else {
        TokenBalance::delete_by_id(balance_id(contract, holder))
            .exec(db)
            .await?;
        return Ok(());
    };

    let mut balance = U256::ZERO;
    for transfer in &transfers {
        if transfer.from_address == transfer.to_address {
            continue;
        }
        let value = parse_amount(&transfer.value)?;
        if transfer.from_address == holder {
            balance = balance.saturating_sub(value);
        } else {
            balance = balance.saturating_add(value);
        }
    }
    let provenance = EventMeta {
        contract: contract.to_string(),
        block_number: last.block_number,
        block_timestamp: last.block_timestamp,
        transaction_index: last.transaction_index,
        log_index: last.log_index,
        transaction_hash: last.transaction_hash.clone(),
    };
    write_balance(db, &provenance, holder, balance).await
}
