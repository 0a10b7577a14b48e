use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "voting_power_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub contract: String,
    pub delegate: String,
    pub previous_votes: String,
    pub new_votes: String,
    /// False when `previous_votes` did not chain onto the prior record
    pub consistent: bool,
    pub block_number: i64,
    pub block_timestamp: i64,
    pub transaction_index: i64,
    pub log_index: i64,
    pub transaction_hash: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
