pub mod abi;
pub mod classifier;

use alloy_primitives::{B256, Bytes, U256};

use crate::address::event_id;
use crate::error::IndexError;

pub use classifier::{ContractRegistry, ContractSpec, ContractStandard, EventKind, decode_log};

/// A raw contract log as delivered by a [`crate::rpc::LogSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub address: String,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub block_hash: Option<String>,
    pub block_timestamp: u64,
    pub transaction_index: u64,
    pub log_index: u64,
    pub transaction_hash: String,
}

impl LogRecord {
    pub fn event_id(&self) -> String {
        event_id(&self.transaction_hash, self.log_index)
    }

    /// Chain order of the log: `(block, transaction index, log index)`.
    pub fn ordering_key(&self) -> (u64, u64, u64) {
        (self.block_number, self.transaction_index, self.log_index)
    }
}

/// Provenance carried onto every row derived from a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    pub contract: String,
    pub block_number: i64,
    pub block_timestamp: i64,
    pub transaction_index: i64,
    pub log_index: i64,
    pub transaction_hash: String,
}

impl EventMeta {
    pub fn from_log(log: &LogRecord) -> Result<Self, IndexError> {
        let id = log.event_id();
        let to_db = |value: u64, field: &str| {
            i64::try_from(value)
                .map_err(|_| IndexError::malformed(&id, format!("{field} {value} overflows i64")))
        };
        Ok(Self {
            contract: crate::address::normalize_address(&log.address, &id)?,
            block_number: to_db(log.block_number, "block number")?,
            block_timestamp: to_db(log.block_timestamp, "block timestamp")?,
            transaction_index: to_db(log.transaction_index, "transaction index")?,
            log_index: to_db(log.log_index, "log index")?,
            transaction_hash: crate::address::normalize_hash(&log.transaction_hash, &id)?,
        })
    }

    pub fn event_id(&self) -> String {
        event_id(&self.transaction_hash, self.log_index as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub from: String,
    pub to: String,
    pub value: U256,
    pub token_id: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateChangedEvent {
    pub delegator: String,
    pub from_delegate: String,
    pub to_delegate: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateVotesChangedEvent {
    pub delegate: String,
    pub previous_votes: U256,
    pub new_votes: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalCreatedEvent {
    pub proposal_id: U256,
    pub proposer: String,
    pub targets: Vec<String>,
    pub values: Vec<U256>,
    pub signatures: Vec<String>,
    pub calldatas: Vec<Bytes>,
    pub vote_start: U256,
    pub vote_end: U256,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteCastEvent {
    pub voter: String,
    pub proposal_id: U256,
    pub support: u8,
    pub weight: U256,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GovernanceEvent {
    Transfer(TransferEvent),
    DelegateChanged(DelegateChangedEvent),
    DelegateVotesChanged(DelegateVotesChangedEvent),
    ProposalCreated(ProposalCreatedEvent),
    VoteCast(VoteCastEvent),
}

impl GovernanceEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Transfer(_) => EventKind::Transfer,
            Self::DelegateChanged(_) => EventKind::DelegateChanged,
            Self::DelegateVotesChanged(_) => EventKind::DelegateVotesChanged,
            Self::ProposalCreated(_) => EventKind::ProposalCreated,
            Self::VoteCast(_) => EventKind::VoteCast,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLog {
    pub meta: EventMeta,
    pub event: GovernanceEvent,
}
