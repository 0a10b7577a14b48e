pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_delegation_tables;
mod m20250301_000002_create_governor_tables;
mod m20250415_000003_add_proposal_title_and_vote_window;
mod m20250415_000004_add_contributor_delegate_count;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_delegation_tables::Migration),
            Box::new(m20250301_000002_create_governor_tables::Migration),
            Box::new(m20250415_000003_add_proposal_title_and_vote_window::Migration),
            Box::new(m20250415_000004_add_contributor_delegate_count::Migration),
        ]
    }
}
