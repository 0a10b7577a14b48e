use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Append-only DelegateChanged history, the source of truth for edge restoration
        manager
            .create_table(
                Table::create()
                    .table(DelegateChanges::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DelegateChanges::Id)
                            .string_len(96)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DelegateChanges::Contract).string_len(42).not_null())
                    .col(ColumnDef::new(DelegateChanges::Delegator).string_len(42).not_null())
                    .col(ColumnDef::new(DelegateChanges::FromDelegate).string_len(42).not_null())
                    .col(ColumnDef::new(DelegateChanges::ToDelegate).string_len(42).not_null())
                    .col(ColumnDef::new(DelegateChanges::Power).string_len(78).not_null())
                    .col(ColumnDef::new(DelegateChanges::BlockNumber).big_integer().not_null())
                    .col(ColumnDef::new(DelegateChanges::BlockTimestamp).big_integer().not_null())
                    .col(ColumnDef::new(DelegateChanges::TransactionIndex).big_integer().not_null())
                    .col(ColumnDef::new(DelegateChanges::LogIndex).big_integer().not_null())
                    .col(ColumnDef::new(DelegateChanges::TransactionHash).string_len(66).not_null())
                    .to_owned(),
            )
            .await?;
        create_index(manager, "idx_delegate_changes_delegator", DelegateChanges::Table, DelegateChanges::Delegator, false).await?;
        create_index(manager, "idx_delegate_changes_block", DelegateChanges::Table, DelegateChanges::BlockNumber, false).await?;

        manager
            .create_table(
                Table::create()
                    .table(DelegateEdges::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DelegateEdges::Id)
                            .string_len(128)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DelegateEdges::Contract).string_len(42).not_null())
                    .col(ColumnDef::new(DelegateEdges::Delegator).string_len(42).not_null())
                    .col(ColumnDef::new(DelegateEdges::FromDelegate).string_len(42).not_null())
                    .col(ColumnDef::new(DelegateEdges::ToDelegate).string_len(42).not_null())
                    .col(ColumnDef::new(DelegateEdges::Power).string_len(78).not_null())
                    .col(ColumnDef::new(DelegateEdges::BlockNumber).big_integer().not_null())
                    .col(ColumnDef::new(DelegateEdges::BlockTimestamp).big_integer().not_null())
                    .col(ColumnDef::new(DelegateEdges::TransactionHash).string_len(66).not_null())
                    .to_owned(),
            )
            .await?;
        // One live edge per delegator and token
        manager
            .create_index(
                Index::create()
                    .name("idx_delegate_edges_contract_delegator")
                    .table(DelegateEdges::Table)
                    .col(DelegateEdges::Contract)
                    .col(DelegateEdges::Delegator)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;
        create_index(manager, "idx_delegate_edges_to_delegate", DelegateEdges::Table, DelegateEdges::ToDelegate, false).await?;

        manager
            .create_table(
                Table::create()
                    .table(DelegateMappings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DelegateMappings::Id)
                            .string_len(85)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DelegateMappings::Contract).string_len(42).not_null())
                    .col(ColumnDef::new(DelegateMappings::Delegator).string_len(42).not_null())
                    .col(ColumnDef::new(DelegateMappings::FromDelegate).string_len(42).not_null())
                    .col(ColumnDef::new(DelegateMappings::ToDelegate).string_len(42).not_null())
                    .col(ColumnDef::new(DelegateMappings::BlockNumber).big_integer().not_null())
                    .col(ColumnDef::new(DelegateMappings::BlockTimestamp).big_integer().not_null())
                    .col(ColumnDef::new(DelegateMappings::TransactionHash).string_len(66).not_null())
                    .to_owned(),
            )
            .await?;
        create_index(manager, "idx_delegate_mappings_to_delegate", DelegateMappings::Table, DelegateMappings::ToDelegate, false).await?;
        create_index(manager, "idx_delegate_mappings_delegator", DelegateMappings::Table, DelegateMappings::Delegator, false).await?;

        manager
            .create_table(
                Table::create()
                    .table(VotingPowerRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VotingPowerRecords::Id)
                            .string_len(96)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VotingPowerRecords::Contract).string_len(42).not_null())
                    .col(ColumnDef::new(VotingPowerRecords::Delegate).string_len(42).not_null())
                    .col(ColumnDef::new(VotingPowerRecords::PreviousVotes).string_len(78).not_null())
                    .col(ColumnDef::new(VotingPowerRecords::NewVotes).string_len(78).not_null())
                    .col(ColumnDef::new(VotingPowerRecords::Consistent).boolean().not_null())
                    .col(ColumnDef::new(VotingPowerRecords::BlockNumber).big_integer().not_null())
                    .col(ColumnDef::new(VotingPowerRecords::BlockTimestamp).big_integer().not_null())
                    .col(ColumnDef::new(VotingPowerRecords::TransactionIndex).big_integer().not_null())
                    .col(ColumnDef::new(VotingPowerRecords::LogIndex).big_integer().not_null())
                    .col(ColumnDef::new(VotingPowerRecords::TransactionHash).string_len(66).not_null())
                    .to_owned(),
            )
            .await?;
        create_index(manager, "idx_voting_power_delegate", VotingPowerRecords::Table, VotingPowerRecords::Delegate, false).await?;
        create_index(manager, "idx_voting_power_contract", VotingPowerRecords::Table, VotingPowerRecords::Contract, false).await?;
        create_index(manager, "idx_voting_power_block", VotingPowerRecords::Table, VotingPowerRecords::BlockNumber, false).await?;

        manager
            .create_table(
                Table::create()
                    .table(TokenTransfers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TokenTransfers::Id)
                            .string_len(96)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TokenTransfers::Contract).string_len(42).not_null())
                    .col(ColumnDef::new(TokenTransfers::FromAddress).string_len(42).not_null())
                    .col(ColumnDef::new(TokenTransfers::ToAddress).string_len(42).not_null())
                    .col(ColumnDef::new(TokenTransfers::Value).string_len(78).not_null())
                    .col(ColumnDef::new(TokenTransfers::TokenId).string_len(78).null())
                    .col(ColumnDef::new(TokenTransfers::BlockNumber).big_integer().not_null())
                    .col(ColumnDef::new(TokenTransfers::BlockTimestamp).big_integer().not_null())
                    .col(ColumnDef::new(TokenTransfers::TransactionIndex).big_integer().not_null())
                    .col(ColumnDef::new(TokenTransfers::LogIndex).big_integer().not_null())
                    .col(ColumnDef::new(TokenTransfers::TransactionHash).string_len(66).not_null())
                    .to_owned(),
            )
            .await?;
        create_index(manager, "idx_token_transfers_from", TokenTransfers::Table, TokenTransfers::FromAddress, false).await?;
        create_index(manager, "idx_token_transfers_to", TokenTransfers::Table, TokenTransfers::ToAddress, false).await?;
        create_index(manager, "idx_token_transfers_block", TokenTransfers::Table, TokenTransfers::BlockNumber, false).await?;

        manager
            .create_table(
                Table::create()
                    .table(TokenBalances::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TokenBalances::Id)
                            .string_len(85)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TokenBalances::Contract).string_len(42).not_null())
                    .col(ColumnDef::new(TokenBalances::Holder).string_len(42).not_null())
                    .col(ColumnDef::new(TokenBalances::Balance).string_len(78).not_null())
                    .col(ColumnDef::new(TokenBalances::BlockNumber).big_integer().not_null())
                    .col(ColumnDef::new(TokenBalances::BlockTimestamp).big_integer().not_null())
                    .to_owned(),
            )
            .await?;
        create_index(manager, "idx_token_balances_holder", TokenBalances::Table, TokenBalances::Holder, false).await?;

        manager
            .create_table(
                Table::create()
                    .table(Contributors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Contributors::Id)
                            .string_len(42)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Contributors::Power).string_len(78).not_null())
                    .col(ColumnDef::new(Contributors::LastVoteTimestamp).big_integer().null())
                    .col(ColumnDef::new(Contributors::BlockNumber).big_integer().not_null())
                    .col(ColumnDef::new(Contributors::BlockTimestamp).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IndexerCheckpoints::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IndexerCheckpoints::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IndexerCheckpoints::LastBlockNumber).big_integer().not_null())
                    .col(
                        ColumnDef::new(IndexerCheckpoints::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IndexedBlocks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IndexedBlocks::BlockNumber)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IndexedBlocks::BlockHash).string_len(66).not_null())
                    .col(
                        ColumnDef::new(IndexedBlocks::RecordedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(IndexedBlocks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IndexerCheckpoints::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Contributors::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TokenBalances::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TokenTransfers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(VotingPowerRecords::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DelegateMappings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DelegateEdges::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DelegateChanges::Table).to_owned())
            .await
    }
}

async fn create_index<T, C>(
    manager: &SchemaManager<'_>,
    name: &str,
    table: T,
    column: C,
    unique: bool,
) -> Result<(), DbErr>
where
    T: IntoIden + 'static,
    C: IntoIden + 'static,
{
    let mut index = Index::create();
    index.name(name).table(table).col(column).if_not_exists();
    if unique {
        index.unique();
    }
    manager.create_index(index.to_owned()).await
}

#[derive(DeriveIden)]
enum DelegateChanges {
    Table,
    Id,
    Contract,
    Delegator,
    FromDelegate,
    ToDelegate,
    Power,
    BlockNumber,
    BlockTimestamp,
    TransactionIndex,
    LogIndex,
    TransactionHash,
}

#[derive(DeriveIden)]
enum DelegateEdges {
    Table,
    Id,
    Contract,
    Delegator,
    FromDelegate,
    ToDelegate,
    Power,
    BlockNumber,
    BlockTimestamp,
    TransactionHash,
}

#[derive(DeriveIden)]
enum DelegateMappings {
    Table,
    Id,
    Contract,
    Delegator,
    FromDelegate,
    ToDelegate,
    BlockNumber,
    BlockTimestamp,
    TransactionHash,
}

#[derive(DeriveIden)]
enum VotingPowerRecords {
    Table,
    Id,
    Contract,
    Delegate,
    PreviousVotes,
    NewVotes,
    Consistent,
    BlockNumber,
    BlockTimestamp,
    TransactionIndex,
    LogIndex,
    TransactionHash,
}

#[derive(DeriveIden)]
enum TokenTransfers {
    Table,
    Id,
    Contract,
    FromAddress,
    ToAddress,
    Value,
    TokenId,
    BlockNumber,
    BlockTimestamp,
    TransactionIndex,
    LogIndex,
    TransactionHash,
}

#[derive(DeriveIden)]
enum TokenBalances {
    Table,
    Id,
    Contract,
    Holder,
    Balance,
    BlockNumber,
    BlockTimestamp,
}

#[derive(DeriveIden)]
enum Contributors {
    Table,
    Id,
    Power,
    LastVoteTimestamp,
    BlockNumber,
    BlockTimestamp,
}

#[derive(DeriveIden)]
enum IndexerCheckpoints {
    Table,
    Id,
    LastBlockNumber,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum IndexedBlocks {
    Table,
    BlockNumber,
    BlockHash,
    RecordedAt,
}
