use sea_orm::DbErr;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Bad address or field shape; the event is skipped and the batch continues.
    #[error("malformed event {event_id}: {reason}")]
    MalformedEvent { event_id: String, reason: String },
    #[error("proposal {proposal_id} already exists")]
    DuplicateProposal { proposal_id: String },
    #[error("proposal {proposal_id} does not exist")]
    UnknownProposal { proposal_id: String },
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] DbErr),
    #[error("log source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl IndexError {
    pub fn malformed(event_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            event_id: event_id.into(),
            reason: reason.into(),
        }
    }

    /// Errors that abort the whole batch and are retried with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::SourceUnavailable(_)
        )
    }
}

/// A `DelegateVotesChanged` whose `previous_votes` does not chain onto the
/// delegate's last known `new_votes`. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerConsistencyWarning {
    pub delegate: String,
    pub event_id: String,
    pub block_number: u64,
    pub expected_previous: String,
    pub observed_previous: String,
}

impl std::fmt::Display for PowerConsistencyWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "voting power of {} at block {} chained from {} but last known value was {}",
            self.delegate, self.block_number, self.observed_previous, self.expected_previous
        )
    }
}
