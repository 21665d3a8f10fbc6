//! Host-authoritative room replication.
//!
//! [`HostRoom`] owns the canonical room and turns connection changes and
//! guest intents into outbound messages. [`GuestRoom`] mirrors the host's room
//! by applying whatever the host sends. Neither touches the network; the
//! session dispatches the returned [`Step`].
//!
//! Ordering on a new connection: the snapshot goes out first, then the
//! existing participants, then the `ParticipantJoined` broadcast for the
//! newcomer. Per-peer delivery is ordered, so a guest always has a room
//! before it sees membership or votes.
//!
//! Votes are echoed to every guest after the host applies them, so all
//! mirrors converge on the host's tally.

use thiserror::Error;
use tracing::debug;

use super::events::SessionEvent;
use super::protocol::RoomMessage;
use super::transport::{PeerId, PeerInfo};
use crate::models::{Decision, OptionId, Participant, ParticipantId, Room};

/// Destination of an outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Every connected guest
    Broadcast(RoomMessage),
    /// One guest
    To(PeerId, RoomMessage),
}

/// Messages to send and events to publish after an input was applied
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Step {
    pub outbound: Vec<Outbound>,
    pub events: Vec<SessionEvent>,
}

impl Step {
    fn broadcast(&mut self, message: RoomMessage) {
        self.outbound.push(Outbound::Broadcast(message));
    }

    fn send(&mut self, peer: PeerId, message: RoomMessage) {
        self.outbound.push(Outbound::To(peer, message));
    }

    fn publish(&mut self, event: SessionEvent) {
        self.events.push(event);
    }
}

/// Inbound messages that were dropped instead of applied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("{0} arrived before the first decision snapshot")]
    NoRoomYet(&'static str),
    #[error("unknown participant {0}")]
    UnknownParticipant(ParticipantId),
    #[error("option {0} is not part of the decision")]
    UnknownOption(OptionId),
    #[error("peer {sender} tried to vote as {claimed}")]
    Impersonation {
        sender: ParticipantId,
        claimed: ParticipantId,
    },
    #[error("guests may not send {0}")]
    HostOnly(&'static str),
    #[error("decision snapshot has no options")]
    EmptyDecision,
}

/// The host's authoritative room
#[derive(Debug, Clone)]
pub struct HostRoom {
    room: Room,
}

impl HostRoom {
    #[must_use]
    pub fn new(host_name: impl Into<String>, decision: Decision) -> Self {
        Self {
            room: Room::new(host_name, decision),
        }
    }

    #[must_use]
    pub const fn room(&self) -> &Room {
        &self.room
    }

    /// A guest connected: catch it up and announce it.
    ///
    /// A peer that is already a participant only receives a fresh snapshot.
    pub fn peer_connected(&mut self, peer: &PeerInfo) -> Step {
        let mut step = Step::default();
        let participant_id = ParticipantId::from(peer.id);

        step.send(
            peer.id,
            RoomMessage::DecisionUpdate {
                decision: self.room.decision.clone(),
            },
        );
        for existing in self.room.participants.iter().filter(|p| p.id != participant_id) {
            step.send(
                peer.id,
                RoomMessage::ParticipantJoined {
                    participant: existing.clone(),
                },
            );
        }

        let participant = Participant::new(participant_id, peer.display_name.clone());
        if self.room.add_participant(participant.clone()) {
            debug!(participant = %peer, "participant joined");
            step.broadcast(RoomMessage::ParticipantJoined {
                participant: participant.clone(),
            });
            step.publish(SessionEvent::ParticipantJoined(participant));
        } else if let Some(existing) = self.room.participant(&participant_id) {
            step.send(
                peer.id,
                RoomMessage::ParticipantJoined {
                    participant: existing.clone(),
                },
            );
        }
        step
    }

    /// A guest's connection is gone, whether it left or the link dropped.
    pub fn peer_disconnected(&mut self, peer: &PeerId) -> Step {
        let mut step = Step::default();
        let participant_id = ParticipantId::from(*peer);
        if let Some(participant) = self.room.remove_participant(&participant_id) {
            debug!(participant = %participant.display_name, "participant left");
            step.broadcast(RoomMessage::ParticipantLeft { participant_id });
            step.publish(SessionEvent::ParticipantLeft(participant_id));
        }
        step
    }

    /// Apply a message from a guest. Only votes are accepted, and only for
    /// the sender itself.
    pub fn handle_message(
        &mut self,
        from: &PeerId,
        message: RoomMessage,
    ) -> Result<Step, ProtocolViolation> {
        let sender = ParticipantId::from(*from);
        match message {
            RoomMessage::Vote {
                participant_id,
                option_id,
            } => {
                if participant_id != sender {
                    return Err(ProtocolViolation::Impersonation {
                        sender,
                        claimed: participant_id,
                    });
                }
                if !self.room.contains(&sender) {
                    return Err(ProtocolViolation::UnknownParticipant(sender));
                }
                if !self.room.record_vote(&sender, option_id) {
                    return Err(ProtocolViolation::UnknownOption(option_id));
                }

                let mut step = Step::default();
                step.broadcast(RoomMessage::Vote {
                    participant_id,
                    option_id,
                });
                step.publish(SessionEvent::VoteRecorded {
                    participant_id,
                    option_id,
                });
                Ok(step)
            }
            other => Err(ProtocolViolation::HostOnly(other.kind())),
        }
    }

    /// Replace the shared decision and push it to every guest.
    pub fn update_decision(&mut self, decision: Decision) -> Result<Step, ProtocolViolation> {
        if !decision.is_well_formed() {
            return Err(ProtocolViolation::EmptyDecision);
        }
        self.room.replace_decision(decision);

        let mut step = Step::default();
        step.broadcast(RoomMessage::DecisionUpdate {
            decision: self.room.decision.clone(),
        });
        step.publish(SessionEvent::DecisionUpdated(self.room.decision.clone()));
        Ok(step)
    }

    /// End the room, telling every guest.
    #[must_use]
    pub fn close(self) -> (Room, Step) {
        let mut step = Step::default();
        step.broadcast(RoomMessage::RoomClosed);
        (self.room, step)
    }
}

/// Result of applying a host message to a guest mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Events(Vec<SessionEvent>),
    /// The host closed the room
    Closed,
}

/// A guest's mirror of the host's room
#[derive(Debug, Clone)]
pub struct GuestRoom {
    host: PeerInfo,
    room: Option<Room>,
}

impl GuestRoom {
    #[must_use]
    pub const fn new(host: PeerInfo) -> Self {
        Self { host, room: None }
    }

    #[must_use]
    pub const fn host(&self) -> &PeerInfo {
        &self.host
    }

    /// `None` until the host's first snapshot arrives
    #[must_use]
    pub const fn room(&self) -> Option<&Room> {
        self.room.as_ref()
    }

    #[must_use]
    pub fn into_room(self) -> Option<Room> {
        self.room
    }

    pub fn apply(&mut self, message: RoomMessage) -> Result<Applied, ProtocolViolation> {
        let kind = message.kind();
        let events = match message {
            RoomMessage::RoomClosed => return Ok(Applied::Closed),
            RoomMessage::DecisionUpdate { decision } => {
                if !decision.is_well_formed() {
                    return Err(ProtocolViolation::EmptyDecision);
                }
                match &mut self.room {
                    None => {
                        let room = Room::new(self.host.display_name.clone(), decision);
                        let snapshot = room.decision.clone();
                        self.room = Some(room);
                        vec![SessionEvent::DecisionUpdated(snapshot)]
                    }
                    Some(room) => {
                        let before = room.clone();
                        room.replace_decision(decision);
                        if *room == before {
                            Vec::new()
                        } else {
                            vec![SessionEvent::DecisionUpdated(room.decision.clone())]
                        }
                    }
                }
            }
            RoomMessage::ParticipantJoined { participant } => {
                let room = self.room.as_mut().ok_or(ProtocolViolation::NoRoomYet(kind))?;
                if room.add_participant(participant.clone()) {
                    vec![SessionEvent::ParticipantJoined(participant)]
                } else {
                    Vec::new()
                }
            }
            RoomMessage::ParticipantLeft { participant_id } => {
                let room = self.room.as_mut().ok_or(ProtocolViolation::NoRoomYet(kind))?;
                if room.remove_participant(&participant_id).is_some() {
                    vec![SessionEvent::ParticipantLeft(participant_id)]
                } else {
                    Vec::new()
                }
            }
            RoomMessage::Vote {
                participant_id,
                option_id,
            } => {
                let room = self.room.as_mut().ok_or(ProtocolViolation::NoRoomYet(kind))?;
                if !room.contains(&participant_id) {
                    return Err(ProtocolViolation::UnknownParticipant(participant_id));
                }
                if !room.record_vote(&participant_id, option_id) {
                    return Err(ProtocolViolation::UnknownOption(option_id));
                }
                vec![SessionEvent::VoteRecorded {
                    participant_id,
                    option_id,
                }]
            }
        };
        Ok(Applied::Events(events))
    }
}
