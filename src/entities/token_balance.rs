use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Transfer-inferred balance of a holder, keyed `{contract}_{holder}`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "token_balances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub contract: String,
    pub holder: String,
    pub balance: String,
    pub block_number: i64,
    pub block_timestamp: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
