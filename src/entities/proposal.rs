use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// `id` is `{contract}_{proposal_id}`; governors number proposals independently.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "proposals")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub contract: String,
    pub proposal_id: String,
    pub proposer: String,
    pub targets: Json,
    pub values: Json,
    pub signatures: Json,
    pub calldatas: Json,
    pub description: String,
    pub title: Option<String>,
    pub vote_start_timestamp: i64,
    pub vote_end_timestamp: i64,
    pub block_number: i64,
    pub block_timestamp: i64,
    pub transaction_hash: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
