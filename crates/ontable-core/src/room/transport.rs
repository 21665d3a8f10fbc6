//! Transport abstraction for local peer-to-peer networking.
//!
//! A transport advertises, browses, connects and moves opaque payloads. It
//! never interprets them. Everything that happens asynchronously (discovery
//! results, connection changes, inbound payloads, late failures) arrives on a
//! single [`TransportEvent`] channel handed out when the transport is built,
//! so the session can consume it from one place.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{uuid_id, ParticipantId};

uuid_id!(
    /// Identifies a device for the lifetime of its transport
    PeerId
);

impl From<PeerId> for ParticipantId {
    fn from(peer: PeerId) -> Self {
        Self::from_uuid(peer.0)
    }
}

/// Attribute key carrying the join code in an advertisement
pub const CODE_ATTRIBUTE: &str = "code";

/// Key/value attributes published while advertising
pub type DiscoveryInfo = BTreeMap<String, String>;

/// A device as seen by other devices
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub display_name: String,
}

impl PeerInfo {
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            id: PeerId::new(),
            display_name: display_name.into(),
        }
    }
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id.short())
    }
}

/// Why an outgoing connection did not come up
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ConnectFailure {
    #[error("the host declined the connection")]
    Rejected,
    #[error("the host did not answer in time")]
    TimedOut,
    #[error("{0}")]
    Failed(String),
}

/// Asynchronous notifications from a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// An advertising peer came into range (browsing only)
    PeerFound { peer: PeerInfo, info: DiscoveryInfo },
    /// A previously found peer stopped advertising
    PeerLost { peer: PeerId },
    /// A session connection is up, in either direction
    Connected { peer: PeerInfo },
    /// An outgoing `connect` did not succeed
    ConnectFailed { peer: PeerId, reason: ConnectFailure },
    /// A live connection went away
    Disconnected { peer: PeerId },
    /// Payload from a connected peer
    Received { from: PeerId, payload: Vec<u8> },
    /// Advertising stopped because the platform refused it
    AdvertisingFailed { reason: String },
    /// Browsing stopped because the platform refused it
    BrowsingFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The platform refused the operation (permissions, radio off, port in use)
    #[error("denied: {0}")]
    Denied(String),
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),
    #[error("not connected to {0}")]
    NotConnected(PeerId),
    #[error("transport I/O error: {0}")]
    Io(String),
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied
            | std::io::ErrorKind::AddrInUse
            | std::io::ErrorKind::AddrNotAvailable => Self::Denied(error.to_string()),
            _ => Self::Io(error.to_string()),
        }
    }
}

/// Local network discovery and messaging.
///
/// Calls return immediately. `connect` resolves later through
/// [`TransportEvent::Connected`] or [`TransportEvent::ConnectFailed`]; the
/// transport enforces `timeout` itself. Incoming connections are accepted
/// automatically while advertising.
pub trait Transport: Send + 'static {
    /// Identity this transport presents to other devices
    fn local_peer(&self) -> &PeerInfo;

    fn start_advertising(&mut self, info: DiscoveryInfo) -> Result<(), TransportError>;

    fn stop_advertising(&mut self);

    fn start_browsing(&mut self) -> Result<(), TransportError>;

    fn stop_browsing(&mut self);

    fn connect(&mut self, peer: &PeerId, timeout: Duration) -> Result<(), TransportError>;

    /// Reliable, ordered delivery to every listed peer
    fn send(&mut self, payload: &[u8], to: &[PeerId]) -> Result<(), TransportError>;

    /// Close the connection to one peer, or abandon a pending connect to it.
    ///
    /// Unknown peers are ignored. The remote side sees `Disconnected`.
    fn close(&mut self, peer: &PeerId);

    /// Close every connection and abandon pending connects.
    ///
    /// Payloads already passed to `send` are still delivered first.
    fn disconnect(&mut self);
}
