use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Flattened "who does `delegator` delegate to on `contract`" view.
/// `id` is `{contract}_{delegator}`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delegate_mappings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub contract: String,
    pub delegator: String,
    pub from_delegate: String,
    pub to_delegate: String,
    pub block_number: i64,
    pub block_timestamp: i64,
    pub transaction_hash: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
