//! Participant model

use serde::{Deserialize, Serialize};

use super::id::uuid_id;
use super::option::OptionId;

uuid_id!(
    /// Identifies a guest within a room. Equal to the guest's peer id.
    ParticipantId
);

impl ParticipantId {
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> uuid::Uuid {
        self.0
    }
}

/// A non-host member of a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    /// Option this participant currently votes for
    #[serde(default)]
    pub vote: Option<OptionId>,
}

impl Participant {
    #[must_use]
    pub fn new(id: ParticipantId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            vote: None,
        }
    }
}
