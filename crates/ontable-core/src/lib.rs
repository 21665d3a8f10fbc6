//! ontable-core - Core library for OnTable
//!
//! Decision models and scoring, local storage, subscription entitlements, and
//! the room sync that lets people around a table vote on a decision from
//! their own devices.

pub mod config;
pub mod db;
pub mod entitlement;
pub mod error;
pub mod models;
pub mod room;

pub use error::{Error, Result};
pub use models::{Decision, DecisionId, DecisionOption, OptionId, Participant, ParticipantId, Room};
