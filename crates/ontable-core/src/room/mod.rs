//! Face-to-face room sync.
//!
//! One device hosts a decision and advertises it under a [`JoinCode`]; nearby
//! devices find it by that code, connect, receive the decision, and vote.
//! The host owns the room and every guest holds a read-only mirror.
//!
//! Layers, bottom up:
//! - [`code`] and [`invitation`]: join codes and shareable invitation links
//! - [`protocol`]: the wire messages and their envelope
//! - [`transport`]: the discovery and messaging seam, with the in-memory
//!   [`LocalNetwork`] and the LAN [`LanTransport`]
//! - [`engine`]: host and guest replication logic, free of I/O
//! - [`session`]: the [`RoomSession`] actor tying the above together

pub mod code;
pub mod engine;
pub mod events;
pub mod invitation;
pub mod lan;
pub mod local;
pub mod protocol;
pub mod session;
pub mod transport;

pub use code::{CodeError, JoinCode};
pub use engine::{GuestRoom, HostRoom, ProtocolViolation};
pub use events::{CloseReason, JoinFailure, SessionEvent};
pub use invitation::{Invitation, InvitationError};
pub use lan::LanTransport;
pub use local::{LocalNetwork, LocalTransport};
pub use protocol::{CodecError, RoomMessage, PROTOCOL_VERSION};
pub use session::{RoomSession, SessionError, SessionSnapshot, SessionState};
pub use transport::{
    ConnectFailure, DiscoveryInfo, PeerId, PeerInfo, Transport, TransportError, TransportEvent,
    CODE_ATTRIBUTE,
};
