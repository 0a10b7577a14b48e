//! Fixtures shared by the in-crate test suites: an in-memory database with
//! migrations applied, log builders for every governance event, and a
//! scriptable [`LogSource`].

use std::collections::BTreeMap;
use std::sync::Mutex;

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::SolEvent;
use migration::{Migrator, MigratorTrait};
use sea_orm::prelude::Json;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, EntityTrait};

use crate::address::ZERO_ADDRESS;
use crate::engine::EventEngine;
use crate::entities::prelude::*;
use crate::entities::{
    contributor, delegate_change, delegate_edge, delegate_mapping, token_balance, token_transfer,
    vote_cast, voting_power_record,
};
use crate::error::IndexError;
use crate::events::abi::{IGovernor, IVotesToken};
use crate::events::{
    ContractRegistry, ContractSpec, ContractStandard, EventKind, LogRecord,
};
use crate::rpc::LogSource;

pub const TOKEN: &str = "0x00000000000000000000000000000000000000c0";
pub const NFT: &str = "0x00000000000000000000000000000000000000c1";
pub const GOVERNOR: &str = "0x00000000000000000000000000000000000000c2";

pub fn addr(n: u64) -> String {
    format!("0x6475{n:036x}")
}

pub fn tx_hash(block: u64, transaction_index: u64) -> String {
    salted_tx_hash(block, transaction_index, 0)
}

pub fn block_hash(block: u64) -> String {
    salted_block_hash(block, 0)
}

pub fn block_timestamp(block: u64) -> u64 {
    1_700_000_000 + block * 12
}

fn salted_tx_hash(block: u64, transaction_index: u64, salt: u64) -> String {
    format!("0x{salt:016x}{block:024x}{transaction_index:024x}")
}

fn salted_block_hash(block: u64, salt: u64) -> String {
    format!("0xb10c{salt:012x}{block:048x}")
}

pub fn parse_address(address: &str) -> Address {
    address.parse().unwrap()
}

pub fn registry() -> ContractRegistry {
    let spec = |name: &str, address: &str, standard| ContractSpec {
        name: name.to_string(),
        address: address.to_string(),
        standard,
    };
    ContractRegistry::new(vec![
        spec("token", TOKEN, ContractStandard::Erc20),
        spec("badge", NFT, ContractStandard::Erc721),
        spec("governor", GOVERNOR, ContractStandard::Governor),
    ])
    .unwrap()
}

pub fn engine() -> EventEngine {
    EventEngine::new(registry())
}

pub async fn setup_database() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

pub struct LogBuilder {
    address: String,
    topics: Vec<B256>,
    data: Vec<u8>,
    block_number: u64,
    transaction_index: u64,
    log_index: u64,
}

impl LogBuilder {
    pub fn new(contract: &str, block: u64) -> Self {
        Self {
            address: contract.to_string(),
            topics: Vec::new(),
            data: Vec::new(),
            block_number: block,
            transaction_index: 0,
            log_index: 0,
        }
    }

    /// Log index within the block; the transaction index follows it.
    pub fn position(mut self, log_index: u64) -> Self {
        self.transaction_index = log_index;
        self.log_index = log_index;
        self
    }

    pub fn topic(mut self, topic: B256) -> Self {
        self.topics.push(topic);
        self
    }

    pub fn topic_address(self, address: &str) -> Self {
        self.topic(parse_address(address).into_word())
    }

    pub fn topic_uint(self, value: U256) -> Self {
        self.topic(B256::from(value.to_be_bytes::<32>()))
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// ABI-encoded non-indexed fields of `event`.
    pub fn event_data<E: SolEvent>(self, event: &E) -> Self {
        self.data(event.encode_data())
    }

    pub fn build(self) -> LogRecord {
        LogRecord {
            address: self.address,
            topics: self.topics,
            data: Bytes::from(self.data),
            block_number: self.block_number,
            block_hash: Some(block_hash(self.block_number)),
            block_timestamp: block_timestamp(self.block_number),
            transaction_index: self.transaction_index,
            log_index: self.log_index,
            transaction_hash: tx_hash(self.block_number, self.transaction_index),
        }
    }
}

/// The same log as mined on a competing branch: different transaction and
/// block hashes, same position.
pub fn with_tx_salt(mut log: LogRecord, salt: u64) -> LogRecord {
    log.transaction_hash = salted_tx_hash(log.block_number, log.transaction_index, salt);
    log.block_hash = Some(salted_block_hash(log.block_number, salt));
    log
}

pub fn transfer_log(
    contract: &str,
    from: &str,
    to: &str,
    value: u128,
    block: u64,
    log_index: u64,
) -> LogRecord {
    LogBuilder::new(contract, block)
        .position(log_index)
        .topic(EventKind::Transfer.topic())
        .topic_address(from)
        .topic_address(to)
        .event_data(&IVotesToken::Transfer {
            from: parse_address(from),
            to: parse_address(to),
            value: U256::from(value),
        })
        .build()
}

pub fn nft_transfer_log(
    contract: &str,
    from: &str,
    to: &str,
    token_id: u64,
    block: u64,
    log_index: u64,
) -> LogRecord {
    LogBuilder::new(contract, block)
        .position(log_index)
        .topic(EventKind::Transfer.topic())
        .topic_address(from)
        .topic_address(to)
        .topic_uint(U256::from(token_id))
        .build()
}

pub fn delegate_changed_log(
    contract: &str,
    delegator: &str,
    from_delegate: &str,
    to_delegate: &str,
    block: u64,
    log_index: u64,
) -> LogRecord {
    LogBuilder::new(contract, block)
        .position(log_index)
        .topic(EventKind::DelegateChanged.topic())
        .topic_address(delegator)
        .topic_address(from_delegate)
        .topic_address(to_delegate)
        .build()
}

pub fn delegate_votes_changed_log(
    contract: &str,
    delegate: &str,
    previous_votes: u128,
    new_votes: u128,
    block: u64,
    log_index: u64,
) -> LogRecord {
    LogBuilder::new(contract, block)
        .position(log_index)
        .topic(EventKind::DelegateVotesChanged.topic())
        .topic_address(delegate)
        .event_data(&IVotesToken::DelegateVotesChanged {
            delegate: parse_address(delegate),
            previousVotes: U256::from(previous_votes),
            newVotes: U256::from(new_votes),
        })
        .build()
}

#[allow(clippy::too_many_arguments)]
pub fn proposal_created_log(
    contract: &str,
    proposal_id: u64,
    proposer: &str,
    description: &str,
    vote_start: u64,
    vote_end: u64,
    block: u64,
    log_index: u64,
) -> LogRecord {
    LogBuilder::new(contract, block)
        .position(log_index)
        .topic(EventKind::ProposalCreated.topic())
        .event_data(&IGovernor::ProposalCreated {
            proposalId: U256::from(proposal_id),
            proposer: parse_address(proposer),
            targets: vec![parse_address(TOKEN)],
            values: vec![U256::ZERO],
            signatures: vec![String::new()],
            calldatas: vec![Bytes::new()],
            voteStart: U256::from(vote_start),
            voteEnd: U256::from(vote_end),
            description: description.to_string(),
        })
        .build()
}

pub fn vote_cast_log(
    contract: &str,
    voter: &str,
    proposal_id: u64,
    support: u8,
    weight: u128,
    block: u64,
    log_index: u64,
) -> LogRecord {
    LogBuilder::new(contract, block)
        .position(log_index)
        .topic(EventKind::VoteCast.topic())
        .topic_address(voter)
        .event_data(&IGovernor::VoteCast {
            voter: parse_address(voter),
            proposalId: U256::from(proposal_id),
            support,
            weight: U256::from(weight),
            reason: String::new(),
        })
        .build()
}

/// A short chain touching every event kind on all three contracts, in
/// chain order.
pub fn mixed_history() -> Vec<LogRecord> {
    let (alice, bob, carol, dave) = (addr(0x11), addr(0x12), addr(0x13), addr(0x14));
    vec![
        transfer_log(TOKEN, ZERO_ADDRESS, &alice, 1_000, 10, 0),
        transfer_log(TOKEN, ZERO_ADDRESS, &bob, 500, 10, 1),
        delegate_changed_log(TOKEN, &alice, ZERO_ADDRESS, &alice, 10, 2),
        delegate_votes_changed_log(TOKEN, &alice, 0, 1_000, 10, 3),
        nft_transfer_log(NFT, ZERO_ADDRESS, &carol, 1, 11, 0),
        nft_transfer_log(NFT, ZERO_ADDRESS, &carol, 2, 11, 1),
        delegate_changed_log(NFT, &carol, ZERO_ADDRESS, &bob, 11, 2),
        delegate_votes_changed_log(NFT, &bob, 0, 2, 11, 3),
        proposal_created_log(GOVERNOR, 1, &alice, "# Fund audits\n\nTwo audits.", 100, 200, 12, 0),
        transfer_log(TOKEN, &alice, &dave, 250, 12, 1),
        delegate_votes_changed_log(TOKEN, &alice, 1_000, 750, 12, 2),
        delegate_changed_log(TOKEN, &bob, ZERO_ADDRESS, &alice, 13, 0),
        delegate_votes_changed_log(TOKEN, &alice, 750, 1_250, 13, 1),
        vote_cast_log(GOVERNOR, &alice, 1, 1, 1_250, 14, 0),
        vote_cast_log(GOVERNOR, &bob, 1, 0, 2, 14, 1),
        nft_transfer_log(NFT, &carol, &dave, 2, 15, 0),
    ]
}

/// Proposal row without its wall-clock bookkeeping columns.
#[derive(Debug, PartialEq)]
pub struct ProposalRow {
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
}

/// Every event-derived table, sorted by primary key.
#[derive(Debug, PartialEq)]
pub struct Snapshot {
    pub contributors: Vec<contributor::Model>,
    pub delegate_changes: Vec<delegate_change::Model>,
    pub edges: Vec<delegate_edge::Model>,
    pub mappings: Vec<delegate_mapping::Model>,
    pub power_records: Vec<voting_power_record::Model>,
    pub balances: Vec<token_balance::Model>,
    pub transfers: Vec<token_transfer::Model>,
    pub votes: Vec<vote_cast::Model>,
    pub proposals: Vec<ProposalRow>,
}

pub async fn snapshot(db: &DatabaseConnection) -> Snapshot {
    let mut contributors = Contributor::find().all(db).await.unwrap();
    contributors.sort_by(|a, b| a.id.cmp(&b.id));
    let mut delegate_changes = DelegateChange::find().all(db).await.unwrap();
    delegate_changes.sort_by(|a, b| a.id.cmp(&b.id));
    let mut edges = DelegateEdge::find().all(db).await.unwrap();
    edges.sort_by(|a, b| a.id.cmp(&b.id));
    let mut mappings = DelegateMapping::find().all(db).await.unwrap();
    mappings.sort_by(|a, b| a.id.cmp(&b.id));
    let mut power_records = VotingPowerRecord::find().all(db).await.unwrap();
    power_records.sort_by(|a, b| a.id.cmp(&b.id));
    let mut balances = TokenBalance::find().all(db).await.unwrap();
    balances.sort_by(|a, b| a.id.cmp(&b.id));
    let mut transfers = TokenTransfer::find().all(db).await.unwrap();
    transfers.sort_by(|a, b| a.id.cmp(&b.id));
    let mut votes = VoteCast::find().all(db).await.unwrap();
    votes.sort_by(|a, b| a.id.cmp(&b.id));

    let mut proposals: Vec<ProposalRow> = Proposal::find()
        .all(db)
        .await
        .unwrap()
        .into_iter()
        .map(|model| ProposalRow {
            id: model.id,
            contract: model.contract,
            proposal_id: model.proposal_id,
            proposer: model.proposer,
            targets: model.targets,
            values: model.values,
            signatures: model.signatures,
            calldatas: model.calldatas,
            description: model.description,
            title: model.title,
            vote_start_timestamp: model.vote_start_timestamp,
            vote_end_timestamp: model.vote_end_timestamp,
            block_number: model.block_number,
            block_timestamp: model.block_timestamp,
            transaction_hash: model.transaction_hash,
        })
        .collect();
    proposals.sort_by(|a, b| a.id.cmp(&b.id));

    Snapshot {
        contributors,
        delegate_changes,
        edges,
        mappings,
        power_records,
        balances,
        transfers,
        votes,
        proposals,
    }
}

#[derive(Default)]
struct SourceState {
    logs: Vec<LogRecord>,
    head: u64,
    hash_overrides: BTreeMap<u64, String>,
    failures_left: u32,
    fetches: u32,
}

/// In-memory chain: a head height, logs per contract, and per-block hashes
/// that a simulated reorg replaces.
#[derive(Default)]
pub struct MemoryLogSource {
    state: Mutex<SourceState>,
}

impl MemoryLogSource {
    pub fn new(logs: Vec<LogRecord>, head: u64) -> Self {
        Self {
            state: Mutex::new(SourceState {
                logs,
                head,
                ..SourceState::default()
            }),
        }
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().unwrap().head = head;
    }

    pub fn push_logs(&self, logs: Vec<LogRecord>) {
        self.state.lock().unwrap().logs.extend(logs);
    }

    /// Replaces every block from `fork_block` up to the head with a branch
    /// whose hashes carry `salt`.
    pub fn reorg(&self, fork_block: u64, canonical: Vec<LogRecord>, salt: u64) {
        let mut state = self.state.lock().unwrap();
        state.logs.retain(|log| log.block_number < fork_block);
        state.logs.extend(canonical);
        for block in fork_block..=state.head {
            state
                .hash_overrides
                .insert(block, salted_block_hash(block, salt));
        }
    }

    /// The next `count` log fetches fail with a retryable error.
    pub fn fail_next(&self, count: u32) {
        self.state.lock().unwrap().failures_left = count;
    }

    pub fn fetches(&self) -> u32 {
        self.state.lock().unwrap().fetches
    }
}

impl LogSource for MemoryLogSource {
    async fn latest_block(&self) -> Result<u64, IndexError> {
        Ok(self.state.lock().unwrap().head)
    }

    async fn block_hash(&self, number: u64) -> Result<Option<String>, IndexError> {
        let state = self.state.lock().unwrap();
        if number > state.head {
            return Ok(None);
        }
        Ok(Some(
            state
                .hash_overrides
                .get(&number)
                .cloned()
                .unwrap_or_else(|| block_hash(number)),
        ))
    }

    async fn fetch_logs(
        &self,
        contract: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LogRecord>, IndexError> {
        let mut state = self.state.lock().unwrap();
        state.fetches += 1;
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(IndexError::SourceUnavailable("injected failure".into()));
        }
        let mut logs: Vec<LogRecord> = state
            .logs
            .iter()
            .filter(|log| log.address.eq_ignore_ascii_case(contract))
            .filter(|log| (from_block..=to_block).contains(&log.block_number))
            .cloned()
            .collect();
        logs.sort_by_key(LogRecord::ordering_key);
        Ok(logs)
    }
}
