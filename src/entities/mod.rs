pub mod prelude;

pub mod contributor;
pub mod delegate_change;
pub mod delegate_edge;
pub mod delegate_mapping;
pub mod indexed_block;
pub mod indexer_checkpoint;
pub mod proposal;
pub mod token_balance;
pub mod token_transfer;
pub mod vote_cast;
pub mod voting_power_record;
