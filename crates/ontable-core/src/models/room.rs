//! Room model: the shared collaborative session object

use serde::{Deserialize, Serialize};

use super::decision::Decision;
use super::id::uuid_id;
use super::option::OptionId;
use super::participant::{Participant, ParticipantId};

uuid_id!(
    /// A unique identifier for a room
    RoomId
);

/// Host identity, participants, and the replicated decision.
///
/// The host itself is implicit and never appears in `participants`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub host_name: String,
    /// Insertion ordered, unique by id
    pub participants: Vec<Participant>,
    pub decision: Decision,
}

impl Room {
    #[must_use]
    pub fn new(host_name: impl Into<String>, mut decision: Decision) -> Self {
        decision.normalize();
        Self {
            id: RoomId::new(),
            host_name: host_name.into(),
            participants: Vec::new(),
            decision,
        }
    }

    #[must_use]
    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participant(id).is_some()
    }

    /// Append a participant unless one with the same id is already present.
    ///
    /// Returns `false` for duplicates, which are left untouched.
    pub fn add_participant(&mut self, participant: Participant) -> bool {
        if self.contains(&participant.id) {
            return false;
        }
        self.participants.push(participant);
        true
    }

    /// Remove by id; absent ids are a no-op.
    pub fn remove_participant(&mut self, id: &ParticipantId) -> Option<Participant> {
        let index = self.participants.iter().position(|p| &p.id == id)?;
        Some(self.participants.remove(index))
    }

    /// Record a participant's choice.
    ///
    /// Returns `false` when the participant is unknown or the option does not
    /// exist in the current decision.
    pub fn record_vote(&mut self, id: &ParticipantId, option_id: OptionId) -> bool {
        if !self.decision.has_option(&option_id) {
            return false;
        }
        match self.participants.iter_mut().find(|p| &p.id == id) {
            Some(participant) => {
                participant.vote = Some(option_id);
                true
            }
            None => false,
        }
    }

    /// Swap in a new decision snapshot.
    ///
    /// Votes for options that no longer exist are cleared so every replica
    /// applying the same snapshot ends with the same tally.
    pub fn replace_decision(&mut self, mut decision: Decision) {
        decision.normalize();
        for participant in &mut self.participants {
            if let Some(vote) = participant.vote {
                if !decision.has_option(&vote) {
                    participant.vote = None;
                }
            }
        }
        self.decision = decision;
    }

    /// Vote counts per option, in option order
    #[must_use]
    pub fn tally(&self) -> Vec<(OptionId, usize)> {
        self.decision
            .options
            .iter()
            .map(|option| {
                let votes = self
                    .participants
                    .iter()
                    .filter(|p| p.vote == Some(option.id))
                    .count();
                (option.id, votes)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DecisionOption;
    use pretty_assertions::assert_eq;

    fn room() -> Room {
        let decision = Decision::new("Movie night", ["Dune", "Heat", "Alien"]).unwrap();
        Room::new("Host", decision)
    }

    #[test]
    fn test_add_participant_is_idempotent() {
        let mut room = room();
        let id = ParticipantId::new();
        assert!(room.add_participant(Participant::new(id, "Ana")));
        assert!(!room.add_participant(Participant::new(id, "Ana again")));
        assert_eq!(room.participants.len(), 1);
        assert_eq!(room.participants[0].display_name, "Ana");
    }

    #[test]
    fn test_remove_absent_participant_is_noop() {
        let mut room = room();
        assert!(room.remove_participant(&ParticipantId::new()).is_none());
        assert!(room.participants.is_empty());
    }

    #[test]
    fn test_record_vote_requires_known_participant_and_option() {
        let mut room = room();
        let id = ParticipantId::new();
        let heat = room.decision.options[1].id;

        assert!(!room.record_vote(&id, heat));

        room.add_participant(Participant::new(id, "Ana"));
        assert!(!room.record_vote(&id, OptionId::new()));
        assert!(room.record_vote(&id, heat));
        assert_eq!(room.participant(&id).and_then(|p| p.vote), Some(heat));
    }

    #[test]
    fn test_replace_decision_clears_votes_for_removed_options() {
        let mut room = room();
        let ana = ParticipantId::new();
        let ben = ParticipantId::new();
        room.add_participant(Participant::new(ana, "Ana"));
        room.add_participant(Participant::new(ben, "Ben"));
        let dune = room.decision.options[0].id;
        let alien = room.decision.options[2].id;
        room.record_vote(&ana, dune);
        room.record_vote(&ben, alien);

        let mut next = room.decision.clone();
        next.remove_option(&alien).unwrap();
        room.replace_decision(next);

        assert_eq!(room.participant(&ana).and_then(|p| p.vote), Some(dune));
        assert_eq!(room.participant(&ben).and_then(|p| p.vote), None);
    }

    #[test]
    fn test_tally_counts_in_option_order() {
        let mut room = room();
        let options: Vec<OptionId> = room.decision.options.iter().map(|o| o.id).collect();
        for (name, vote) in [("Ana", options[1]), ("Ben", options[1]), ("Cy", options[0])] {
            let id = ParticipantId::new();
            room.add_participant(Participant::new(id, name));
            room.record_vote(&id, vote);
        }

        assert_eq!(
            room.tally(),
            vec![(options[0], 1), (options[1], 2), (options[2], 0)]
        );
    }

    #[test]
    fn test_new_room_normalizes_decision() {
        let mut decision = Decision::new("Two", ["A", "B"]).unwrap();
        decision.options.truncate(1);
        let room = Room::new("Host", decision);
        assert!(room.decision.is_resolved());

        let option = DecisionOption::new("C");
        assert!(!room.decision.has_option(&option.id));
    }
}
