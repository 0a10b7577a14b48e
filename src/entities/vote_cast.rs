use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vote_casts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub contract: String,
    pub voter: String,
    pub proposal_id: String,
    pub support: i16, // 0=Against, 1=For, 2=Abstain
    pub weight: String,
    pub reason: Option<String>,
    pub block_number: i64,
    pub block_timestamp: i64,
    pub transaction_index: i64,
    pub log_index: i64,
    pub transaction_hash: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
