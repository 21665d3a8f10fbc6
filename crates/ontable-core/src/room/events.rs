//! Notifications a session publishes to the owning application

use std::fmt;

use thiserror::Error;

use super::code::JoinCode;
use super::transport::{ConnectFailure, PeerInfo};
use crate::models::{Decision, OptionId, Participant, ParticipantId};

/// Why a join attempt ended without joining
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinFailure {
    #[error("the host declined the connection")]
    Rejected,
    #[error("the host did not answer in time")]
    TimedOut,
    #[error("no room with that code was found")]
    NotFound,
    #[error("discovery is not permitted: {0}")]
    Denied(String),
    #[error("the join attempt was cancelled")]
    Cancelled,
    #[error("connection failed: {0}")]
    Failed(String),
}

impl From<ConnectFailure> for JoinFailure {
    fn from(failure: ConnectFailure) -> Self {
        match failure {
            ConnectFailure::Rejected => Self::Rejected,
            ConnectFailure::TimedOut => Self::TimedOut,
            ConnectFailure::Failed(reason) => Self::Failed(reason),
        }
    }
}

/// Why a room ended for this device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Ended locally: the host stopped hosting or the guest left
    Left,
    /// The host sent `RoomClosed`
    ClosedByHost,
    /// Every connection dropped without a goodbye
    Disconnected,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::ClosedByHost => write!(f, "closed by host"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    HostingStarted { code: JoinCode },
    /// Advertising was refused; the session is idle again
    HostingFailed { reason: String },
    ParticipantJoined(Participant),
    ParticipantLeft(ParticipantId),
    DecisionUpdated(Decision),
    VoteRecorded {
        participant_id: ParticipantId,
        option_id: OptionId,
    },
    JoinSucceeded { host: PeerInfo },
    JoinFailed(JoinFailure),
    /// The room is gone. `last_decision` is the last replicated snapshot,
    /// still usable offline.
    RoomClosed {
        reason: CloseReason,
        last_decision: Option<Decision>,
    },
}
