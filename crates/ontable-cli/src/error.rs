use std::io;

use ontable_core::entitlement::Tier;
use ontable_core::room::{InvitationError, SessionError, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] ontable_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Invitation(#[from] InvitationError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Decision ID cannot be empty")]
    EmptyDecisionId,
    #[error("Decision not found for id/prefix: {0}")]
    DecisionNotFound(String),
    #[error("{0}")]
    AmbiguousDecisionId(String),
    #[error("Option not found: {0}")]
    OptionNotFound(String),
    #[error("Factor text cannot be empty")]
    EmptyFactor,
    #[error("The {tier} plan allows at most {limit} options per decision")]
    OptionLimit { tier: Tier, limit: usize },
    #[error("Hosting rooms needs a Plus or Pro plan (current plan: {0})")]
    HostingNotIncluded(Tier),
    #[error("Timed out waiting for {0}")]
    TimedOut(&'static str),
    #[error("Configuration error: {0}")]
    Config(String),
}
