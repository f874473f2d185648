// Typed outcomes for rejected draft actions.

use thiserror::Error;

use super::ledger::AcquisitionKind;
use super::stage::Stage;
use super::{DraftId, UserId};

/// Every way a draft action can fail.
///
/// All variants except [`DraftError::Misconfiguration`] and
/// [`DraftError::Storage`] are ordinary user-facing outcomes: the caller did
/// something the rules forbid, nothing was written, and they may try again.
#[derive(Debug, Error)]
pub enum DraftError {
    #[error("it is not your turn; waiting on user {expected}")]
    NotYourTurn { expected: UserId },

    #[error("{action} is not allowed during the {stage} stage")]
    WrongStage { action: &'static str, stage: Stage },

    #[error("out of sequence: {0}")]
    SequenceViolation(String),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("{resource} was already {kind} by user {owner} in draft {draft_id}")]
    ResourceTaken {
        resource: String,
        owner: UserId,
        draft_id: DraftId,
        kind: AcquisitionKind,
        pick_number: Option<u32>,
    },

    #[error("group '{group}' already has {capacity} members")]
    GroupFull { group: String, capacity: u32 },

    #[error("pick limit reached: {made} of {allowed} picks made")]
    PickLimitReached { made: u32, allowed: u32 },

    #[error("no active draft")]
    NoActiveSession,

    #[error("draft has no participants")]
    NoParticipants,

    #[error("invalid roster: {0}")]
    InvalidRoster(String),

    #[error("group name must not be empty")]
    EmptyGroupName,

    #[error("no entries found for group '{0}'")]
    UnknownGroup(String),

    #[error("draft misconfigured: {0}")]
    Misconfiguration(String),

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl DraftError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            DraftError::NotYourTurn { .. } => "NOT_YOUR_TURN",
            DraftError::WrongStage { .. } => "WRONG_STAGE",
            DraftError::SequenceViolation(_) => "SEQUENCE_VIOLATION",
            DraftError::UnknownResource(_) => "UNKNOWN_RESOURCE",
            DraftError::ResourceTaken { .. } => "RESOURCE_TAKEN",
            DraftError::GroupFull { .. } => "GROUP_FULL",
            DraftError::PickLimitReached { .. } => "PICK_LIMIT_REACHED",
            DraftError::NoActiveSession => "NO_ACTIVE_SESSION",
            DraftError::NoParticipants => "NO_PARTICIPANTS",
            DraftError::InvalidRoster(_) => "INVALID_ROSTER",
            DraftError::EmptyGroupName => "EMPTY_GROUP_NAME",
            DraftError::UnknownGroup(_) => "UNKNOWN_GROUP",
            DraftError::Misconfiguration(_) => "MISCONFIGURATION",
            DraftError::Storage(_) => "STORAGE",
        }
    }

    /// Whether this error signals an operator problem rather than a
    /// rejected user action.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DraftError::Misconfiguration(_) | DraftError::Storage(_)
        )
    }
}
