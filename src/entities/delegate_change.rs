use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delegate_changes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub contract: String,
    pub delegator: String,
    pub from_delegate: String,
    pub to_delegate: String,
    /// Power of `to_delegate` when the change was applied
    pub power: String,
    pub block_number: i64,
    pub block_timestamp: i64,
    pub transaction_index: i64,
    pub log_index: i64,
    pub transaction_hash: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
