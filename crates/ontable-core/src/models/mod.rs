//! Data models for OnTable

mod decision;
mod id;
mod option;
mod participant;
mod room;

pub(crate) use id::uuid_id;

pub use decision::{Decision, DecisionId, Resolution};
pub use option::{DecisionOption, Factor, FactorKind, OptionId, MAX_WEIGHT, MIN_WEIGHT};
pub use participant::{Participant, ParticipantId};
pub use room::{Room, RoomId};
