#![allow(unused_imports)]

pub use super::contributor::Entity as Contributor;
pub use super::delegate_change::Entity as DelegateChange;
pub use super::delegate_edge::Entity as DelegateEdge;
pub use super::delegate_mapping::Entity as DelegateMapping;
pub use super::indexed_block::Entity as IndexedBlock;
pub use super::indexer_checkpoint::Entity as IndexerCheckpoint;
pub use super::proposal::Entity as Proposal;
pub use super::token_balance::Entity as TokenBalance;
pub use super::token_transfer::Entity as TokenTransfer;
pub use super::vote_cast::Entity as VoteCast;
pub use super::voting_power_record::Entity as VotingPowerRecord;
