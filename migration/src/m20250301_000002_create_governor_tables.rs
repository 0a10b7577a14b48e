use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::Expr;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Proposals::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Proposals::Id)
                            .string_len(121)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Proposals::Contract).string_len(42).not_null())
                    .col(ColumnDef::new(Proposals::ProposalId).string_len(78).not_null())
                    .col(ColumnDef::new(Proposals::Proposer).string_len(42).not_null())
                    .col(ColumnDef::new(Proposals::Targets).json().not_null())
                    .col(ColumnDef::new(Proposals::Values).json().not_null())
                    .col(ColumnDef::new(Proposals::Signatures).json().not_null())
                    .col(ColumnDef::new(Proposals::Calldatas).json().not_null())
                    .col(ColumnDef::new(Proposals::Description).text().not_null())
                    .col(ColumnDef::new(Proposals::BlockNumber).big_integer().not_null())
                    .col(ColumnDef::new(Proposals::BlockTimestamp).big_integer().not_null())
                    .col(ColumnDef::new(Proposals::TransactionHash).string_len(66).not_null())
                    .col(
                        ColumnDef::new(Proposals::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Proposals::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_proposals_contract_proposal")
                    .table(Proposals::Table)
                    .col(Proposals::Contract)
                    .col(Proposals::ProposalId)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_proposals_proposer")
                    .table(Proposals::Table)
                    .col(Proposals::Proposer)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_proposals_block")
                    .table(Proposals::Table)
                    .col(Proposals::BlockNumber)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Governor VoteCast history, feeds contributor last-vote timestamps
        manager
            .create_table(
                Table::create()
                    .table(VoteCasts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VoteCasts::Id)
                            .string_len(96)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VoteCasts::Contract).string_len(42).not_null())
                    .col(ColumnDef::new(VoteCasts::Voter).string_len(42).not_null())
                    .col(ColumnDef::new(VoteCasts::ProposalId).string_len(78).not_null())
                    .col(ColumnDef::new(VoteCasts::Support).small_integer().not_null())
                    .col(ColumnDef::new(VoteCasts::Weight).string_len(78).not_null())
                    .col(ColumnDef::new(VoteCasts::Reason).text().null())
                    .col(ColumnDef::new(VoteCasts::BlockNumber).big_integer().not_null())
                    .col(ColumnDef::new(VoteCasts::BlockTimestamp).big_integer().not_null())
                    .col(ColumnDef::new(VoteCasts::TransactionIndex).big_integer().not_null())
                    .col(ColumnDef::new(VoteCasts::LogIndex).big_integer().not_null())
                    .col(ColumnDef::new(VoteCasts::TransactionHash).string_len(66).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_vote_casts_voter")
                    .table(VoteCasts::Table)
                    .col(VoteCasts::Voter)
                    .col(VoteCasts::BlockNumber)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_casts_proposal")
                    .table(VoteCasts::Table)
                    .col(VoteCasts::Contract)
                    .col(VoteCasts::ProposalId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VoteCasts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Proposals::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Proposals {
    Table,
    Id,
    Contract,
    ProposalId,
    Proposer,
    Targets,
    Values,
    Signatures,
    Calldatas,
    Description,
    BlockNumber,
    BlockTimestamp,
    TransactionHash,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum VoteCasts {
    Table,
    Id,
    Contract,
    Voter,
    ProposalId,
    Support,
    Weight,
    Reason,
    BlockNumber,
    BlockTimestamp,
    TransactionIndex,
    LogIndex,
    TransactionHash,
}
