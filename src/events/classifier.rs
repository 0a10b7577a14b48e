use std::collections::HashMap;

use alloy_primitives::{B256, U256};
use alloy_sol_types::SolEvent;

use super::abi::{IGovernor, IVotesNft, IVotesToken};
use super::{
    DecodedLog, DelegateChangedEvent, DelegateVotesChangedEvent, EventMeta, GovernanceEvent,
    LogRecord, ProposalCreatedEvent, TransferEvent, VoteCastEvent,
};
use crate::address::{address_from_word, format_address, normalize_address};
use crate::error::IndexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Transfer,
    DelegateChanged,
    DelegateVotesChanged,
    ProposalCreated,
    VoteCast,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Transfer,
        EventKind::DelegateChanged,
        EventKind::DelegateVotesChanged,
        EventKind::ProposalCreated,
        EventKind::VoteCast,
    ];

    pub const fn signature(self) -> &'static str {
        match self {
            Self::Transfer => IVotesToken::Transfer::SIGNATURE,
            Self::DelegateChanged => IVotesToken::DelegateChanged::SIGNATURE,
            Self::DelegateVotesChanged => IVotesToken::DelegateVotesChanged::SIGNATURE,
            Self::ProposalCreated => IGovernor::ProposalCreated::SIGNATURE,
            Self::VoteCast => IGovernor::VoteCast::SIGNATURE,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Transfer => "Transfer",
            Self::DelegateChanged => "DelegateChanged",
            Self::DelegateVotesChanged => "DelegateVotesChanged",
            Self::ProposalCreated => "ProposalCreated",
            Self::VoteCast => "VoteCast",
        }
    }

    /// First log topic: keccak256 of the canonical signature. ERC-20 and
    /// ERC-721 `Transfer` share it.
    pub const fn topic(self) -> B256 {
        match self {
            Self::Transfer => IVotesToken::Transfer::SIGNATURE_HASH,
            Self::DelegateChanged => IVotesToken::DelegateChanged::SIGNATURE_HASH,
            Self::DelegateVotesChanged => IVotesToken::DelegateVotesChanged::SIGNATURE_HASH,
            Self::ProposalCreated => IGovernor::ProposalCreated::SIGNATURE_HASH,
            Self::VoteCast => IGovernor::VoteCast::SIGNATURE_HASH,
        }
    }
}

const TOKEN_EVENTS: &[EventKind] = &[
    EventKind::Transfer,
    EventKind::DelegateChanged,
    EventKind::DelegateVotesChanged,
];

const GOVERNOR_EVENTS: &[EventKind] = &[EventKind::ProposalCreated, EventKind::VoteCast];

/// ABI flavour of a configured contract, resolved once at configuration load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractStandard {
    Erc20,
    Erc721,
    Governor,
}

impl ContractStandard {
    /// Case-insensitive; an absent standard means `erc20`.
    pub fn parse(value: Option<&str>) -> Result<Self, IndexError> {
        let Some(raw) = value else {
            return Ok(Self::Erc20);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "erc20" => Ok(Self::Erc20),
            "erc721" => Ok(Self::Erc721),
            "governor" => Ok(Self::Governor),
            other => Err(IndexError::InvalidConfig(format!(
                "unsupported contract standard {other:?}"
            ))),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Erc20 => "erc20",
            Self::Erc721 => "erc721",
            Self::Governor => "governor",
        }
    }

    pub const fn events(self) -> &'static [EventKind] {
        match self {
            Self::Erc20 | Self::Erc721 => TOKEN_EVENTS,
            Self::Governor => GOVERNOR_EVENTS,
        }
    }

    pub fn classify(self, topic0: &B256) -> Option<EventKind> {
        self.events()
            .iter()
            .copied()
            .find(|kind| kind.topic() == *topic0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractSpec {
    pub name: String,
    pub address: String,
    pub standard: ContractStandard,
}

/// Configured contracts keyed by normalized address.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    by_address: HashMap<String, ContractSpec>,
}

impl ContractRegistry {
    pub fn new(specs: Vec<ContractSpec>) -> Result<Self, IndexError> {
        let mut by_address = HashMap::with_capacity(specs.len());
        for spec in specs {
            let address = normalize_address(&spec.address, &spec.name)
                .map_err(|err| IndexError::InvalidConfig(err.to_string()))?;
            let spec = ContractSpec { address: address.clone(), ..spec };
            if let Some(previous) = by_address.insert(address.clone(), spec) {
                return Err(IndexError::InvalidConfig(format!(
                    "contract {address} configured twice (first as {})",
                    previous.name
                )));
            }
        }
        Ok(Self { by_address })
    }

    pub fn get(&self, address: &str) -> Option<&ContractSpec> {
        self.by_address.get(&address.to_ascii_lowercase())
    }

    pub fn contracts(&self) -> impl Iterator<Item = &ContractSpec> {
        self.by_address.values()
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

/// Decodes a log of a configured contract. Unconfigured contracts and
/// unmatched topics yield `Ok(None)`.
pub fn decode_log(
    registry: &ContractRegistry,
    log: &LogRecord,
) -> Result<Option<DecodedLog>, IndexError> {
    match registry.get(&log.address) {
        Some(spec) => decode(log, spec.standard),
        None => Ok(None),
    }
}

pub fn decode(log: &LogRecord, standard: ContractStandard) -> Result<Option<DecodedLog>, IndexError> {
    let Some(kind) = log.topics.first().and_then(|topic| standard.classify(topic)) else {
        return Ok(None);
    };

    let id = log.event_id();
    let meta = EventMeta::from_log(log)?;

    let event = match kind {
        EventKind::Transfer if standard == ContractStandard::Erc721 => {
            let transfer: IVotesNft::Transfer = decode_event(log, kind, 4, 2, &id)?;
            GovernanceEvent::Transfer(TransferEvent {
                from: format_address(&transfer.from),
                to: format_address(&transfer.to),
                value: U256::from(1u64),
                token_id: Some(transfer.tokenId),
            })
        }
        EventKind::Transfer => {
            let transfer: IVotesToken::Transfer = decode_event(log, kind, 3, 2, &id)?;
            GovernanceEvent::Transfer(TransferEvent {
                from: format_address(&transfer.from),
                to: format_address(&transfer.to),
                value: transfer.value,
                token_id: None,
            })
        }
        EventKind::DelegateChanged => {
            let change: IVotesToken::DelegateChanged = decode_event(log, kind, 4, 3, &id)?;
            GovernanceEvent::DelegateChanged(DelegateChangedEvent {
                delegator: format_address(&change.delegator),
                from_delegate: format_address(&change.fromDelegate),
                to_delegate: format_address(&change.toDelegate),
            })
        }
        EventKind::DelegateVotesChanged => {
            let votes: IVotesToken::DelegateVotesChanged = decode_event(log, kind, 2, 1, &id)?;
            GovernanceEvent::DelegateVotesChanged(DelegateVotesChangedEvent {
                delegate: format_address(&votes.delegate),
                previous_votes: votes.previousVotes,
                new_votes: votes.newVotes,
            })
        }
        EventKind::ProposalCreated => {
            let created: IGovernor::ProposalCreated = decode_event(log, kind, 1, 0, &id)?;
            GovernanceEvent::ProposalCreated(ProposalCreatedEvent {
                proposal_id: created.proposalId,
                proposer: format_address(&created.proposer),
                targets: created.targets.iter().map(format_address).collect(),
                values: created.values,
                signatures: created.signatures,
                calldatas: created.calldatas,
                vote_start: created.voteStart,
                vote_end: created.voteEnd,
                description: created.description,
            })
        }
        EventKind::VoteCast => {
            let vote: IGovernor::VoteCast = decode_event(log, kind, 2, 1, &id)?;
            GovernanceEvent::VoteCast(VoteCastEvent {
                voter: format_address(&vote.voter),
                proposal_id: vote.proposalId,
                support: vote.support,
                weight: vote.weight,
                reason: vote.reason,
            })
        }
    };

    Ok(Some(DecodedLog { meta, event }))
}

/// Topic decoding takes the low 20 bytes of an address word as is, so the
/// topic count and the zero padding of the `indexed_addresses` topics after
/// the signature are checked first. Data is decoded in validating mode.
fn decode_event<E: SolEvent>(
    log: &LogRecord,
    kind: EventKind,
    topics: usize,
    indexed_addresses: usize,
    id: &str,
) -> Result<E, IndexError> {
    if log.topics.len() != topics {
        return Err(IndexError::malformed(
            id,
            format!(
                "{} expects {topics} topics, got {}",
                kind.name(),
                log.topics.len()
            ),
        ));
    }
    if let Some(index) =
        (1..=indexed_addresses).find(|index| address_from_word(&log.topics[*index]).is_none())
    {
        return Err(IndexError::malformed(id, format!("topic {index} is not an address")));
    }
    E::decode_raw_log(log.topics.iter().copied(), &log.data, true)
        .map_err(|err| IndexError::malformed(id, format!("{} data: {err}", kind.name())))
}
