//! The room session: one hosting or joining lifecycle on a transport.
//!
//! [`RoomSession`] is a cheap handle. The session state, the room and the
//! transport live in a single actor task that consumes application intents
//! and transport events in order, so room mutations are never concurrent.
//! Applications observe it through [`SessionEvent`]s and the latest
//! [`SessionSnapshot`].

use std::collections::BTreeSet;
use std::fmt;
use std::mem;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::code::JoinCode;
use super::engine::{Applied, GuestRoom, HostRoom, Outbound, ProtocolViolation, Step};
use super::events::{CloseReason, JoinFailure, SessionEvent};
use super::protocol::RoomMessage;
use super::transport::{
    DiscoveryInfo, PeerId, PeerInfo, Transport, TransportError, TransportEvent, CODE_ATTRIBUTE,
};
use crate::config::SessionConfig;
use crate::models::{Decision, OptionId, Room};

const COMMAND_CAPACITY: usize = 32;

/// Extra time granted past the connect timeout before the session gives up
/// on a transport that never reported the outcome
const CONNECT_GRACE: Duration = Duration::from_millis(500);

/// Lifecycle states of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Hosting,
    Browsing,
    Connecting,
    Joined,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Hosting => write!(f, "hosting"),
            Self::Browsing => write!(f, "browsing"),
            Self::Connecting => write!(f, "connecting"),
            Self::Joined => write!(f, "joined"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a session is already active ({0})")]
    AlreadyActive(SessionState),
    #[error("not hosting a room")]
    NotHosting,
    #[error("not in a room")]
    NotJoined,
    #[error("the room has not arrived from the host yet")]
    NoRoomYet,
    #[error("local networking was refused: {0}")]
    TransportDenied(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid decision: {0}")]
    InvalidDecision(String),
    #[error("option {0} is not part of the decision")]
    UnknownOption(OptionId),
    #[error("join failed: {0}")]
    JoinFailed(JoinFailure),
    #[error("the session has shut down")]
    Shutdown,
}

impl From<TransportError> for SessionError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Denied(reason) => Self::TransportDenied(reason),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Code being hosted or searched for
    pub join_code: Option<JoinCode>,
    pub room: Option<Room>,
    /// The host while connecting or joined
    pub host: Option<PeerInfo>,
    pub connected_peers: usize,
    /// Most recent decision seen in any room, kept after the room ends
    pub last_decision: Option<Decision>,
    pub last_error: Option<String>,
}

type Reply<T = ()> = oneshot::Sender<Result<T, SessionError>>;

enum Command {
    Host {
        decision: Decision,
        reply: Reply<JoinCode>,
    },
    Join {
        code: JoinCode,
        reply: Reply,
    },
    UpdateDecision {
        decision: Decision,
        reply: Reply,
    },
    Vote {
        option_id: OptionId,
        reply: Reply,
    },
    StopHosting {
        reply: Reply,
    },
    Leave {
        reply: Reply,
    },
}

/// Handle to a running session
pub struct RoomSession {
    local_peer: PeerInfo,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
    snapshot: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<()>,
}

impl RoomSession {
    /// Start a session actor that owns `transport`.
    ///
    /// `transport_events` must be the event stream of the same transport.
    /// Must be called from within a Tokio runtime.
    pub fn spawn<T: Transport>(
        transport: T,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        config: SessionConfig,
    ) -> Self {
        let local_peer = transport.local_peer().clone();
        let (commands, inbox) = mpsc::channel(COMMAND_CAPACITY);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (snapshot_tx, snapshot) = watch::channel(SessionSnapshot::default());

        let actor = Actor {
            transport,
            transport_events,
            config,
            events: events.clone(),
            snapshot: snapshot_tx,
            role: Role::Idle,
            connected: BTreeSet::new(),
            last_decision: None,
            last_error: None,
            pending: Vec::new(),
        };
        let task = tokio::spawn(actor.run(inbox));
        debug!(peer = %local_peer, "room session started");

        Self {
            local_peer,
            commands,
            events,
            snapshot,
            task,
        }
    }

    #[must_use]
    pub const fn local_peer(&self) -> &PeerInfo {
        &self.local_peer
    }

    /// Events published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Receiver that is notified whenever the snapshot changes
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.snapshot.borrow().state
    }

    /// The current room, if hosting or joined
    #[must_use]
    pub fn room(&self) -> Option<Room> {
        self.snapshot.borrow().room.clone()
    }

    /// Start hosting `decision`, returning the generated join code.
    pub async fn host(&self, decision: Decision) -> Result<JoinCode, SessionError> {
        self.request(|reply| Command::Host { decision, reply }).await
    }

    /// Start looking for the room advertised under `code`.
    ///
    /// Returns once browsing started; the outcome is reported through
    /// [`SessionEvent::JoinSucceeded`] or [`SessionEvent::JoinFailed`].
    pub async fn join(&self, code: JoinCode) -> Result<(), SessionError> {
        self.request(|reply| Command::Join { code, reply }).await
    }

    /// Join and wait for the outcome.
    ///
    /// Gives up after `timeout`, leaving the session idle again.
    pub async fn join_and_wait(
        &self,
        code: JoinCode,
        timeout: Duration,
    ) -> Result<PeerInfo, SessionError> {
        let mut events = self.subscribe();
        self.join(code).await?;

        let outcome = tokio::time::timeout(timeout, async {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::JoinSucceeded { host }) => return Ok(host),
                    Ok(SessionEvent::JoinFailed(failure)) => {
                        return Err(SessionError::JoinFailed(failure))
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return Err(SessionError::Shutdown),
                }
            }
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                let failure = if self.state() == SessionState::Connecting {
                    JoinFailure::TimedOut
                } else {
                    JoinFailure::NotFound
                };
                self.leave().await?;
                Err(SessionError::JoinFailed(failure))
            }
        }
    }

    /// Replace the hosted decision and push it to every guest.
    pub async fn update_decision(&self, decision: Decision) -> Result<(), SessionError> {
        self.request(|reply| Command::UpdateDecision { decision, reply })
            .await
    }

    /// Send this guest's vote to the host.
    ///
    /// The local room reflects the vote once the host echoes it back.
    pub async fn vote(&self, option_id: OptionId) -> Result<(), SessionError> {
        self.request(|reply| Command::Vote { option_id, reply }).await
    }

    /// Close the hosted room. Succeeds when already idle.
    pub async fn stop_hosting(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::StopHosting { reply }).await
    }

    /// Leave the current room or abandon a join in progress. Succeeds when
    /// already idle.
    pub async fn leave(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Leave { reply }).await
    }

    /// End any active room and wait for the actor to finish.
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(error) = task.await {
            warn!(%error, "room session task failed");
        }
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(Reply<R>) -> Command,
    ) -> Result<R, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| SessionError::Shutdown)?;
        response.await.map_err(|_| SessionError::Shutdown)?
    }
}

enum Role {
    Idle,
    Hosting {
        code: JoinCode,
        room: HostRoom,
    },
    Browsing {
        code: JoinCode,
    },
    Connecting {
        code: JoinCode,
        host: PeerInfo,
        deadline: Instant,
    },
    Joined {
        code: JoinCode,
        guest: GuestRoom,
    },
}

impl Role {
    const fn state(&self) -> SessionState {
        match self {
            Self::Idle => SessionState::Idle,
            Self::Hosting { .. } => SessionState::Hosting,
            Self::Browsing { .. } => SessionState::Browsing,
            Self::Connecting { .. } => SessionState::Connecting,
            Self::Joined { .. } => SessionState::Joined,
        }
    }

    const fn code(&self) -> Option<&JoinCode> {
        match self {
            Self::Idle => None,
            Self::Hosting { code, .. }
            | Self::Browsing { code }
            | Self::Connecting { code, .. }
            | Self::Joined { code, .. } => Some(code),
        }
    }
}

struct Actor<T> {
    transport: T,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    config: SessionConfig,
    events: broadcast::Sender<SessionEvent>,
    snapshot: watch::Sender<SessionSnapshot>,
    role: Role,
    connected: BTreeSet<PeerId>,
    last_decision: Option<Decision>,
    last_error: Option<String>,
    /// Events waiting for the next snapshot
    pending: Vec<SessionEvent>,
}

impl<T: Transport> Actor<T> {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            self.settle();
            let deadline = match &self.role {
                Role::Connecting { deadline, .. } => Some(*deadline),
                _ => None,
            };

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = self.transport_events.recv() => self.handle_transport(event),
                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.fail_join(JoinFailure::TimedOut);
                }
            }
        }

        match self.role.state() {
            SessionState::Hosting | SessionState::Joined => self.end_session(CloseReason::Left),
            SessionState::Browsing | SessionState::Connecting => {
                self.fail_join(JoinFailure::Cancelled);
            }
            SessionState::Idle => {}
        }
        self.transport.disconnect();
        self.settle();
        debug!("room session stopped");
    }

    fn publish(&self) {
        let host = match &self.role {
            Role::Connecting { host, .. } => Some(host.clone()),
            Role::Joined { guest, .. } => Some(guest.host().clone()),
            _ => None,
        };
        let room = match &self.role {
            Role::Hosting { room, .. } => Some(room.room().clone()),
            Role::Joined { guest, .. } => guest.room().cloned(),
            _ => None,
        };
        self.snapshot.send_replace(SessionSnapshot {
            state: self.role.state(),
            join_code: self.role.code().cloned(),
            room,
            host,
            connected_peers: self.connected.len(),
            last_decision: self.last_decision.clone(),
            last_error: self.last_error.clone(),
        });
    }

    fn emit(&mut self, event: SessionEvent) {
        self.pending.push(event);
    }

    /// Publish the snapshot, then the events that led to it. Callers never
    /// observe an event or a reply ahead of the state it describes.
    fn settle(&mut self) {
        self.publish();
        for event in self.pending.drain(..) {
            // No subscribers is fine; the snapshot still reflects the change
            let _ = self.events.send(event);
        }
    }

    fn reply<R>(&mut self, reply: Reply<R>, result: Result<R, SessionError>) {
        self.settle();
        let _ = reply.send(result);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Host { decision, reply } => {
                let result = self.host(decision);
                self.reply(reply, result);
            }
            Command::Join { code, reply } => {
                let result = self.join(code);
                self.reply(reply, result);
            }
            Command::UpdateDecision { decision, reply } => {
                let result = self.update_decision(decision);
                self.reply(reply, result);
            }
            Command::Vote { option_id, reply } => {
                let result = self.vote(option_id);
                self.reply(reply, result);
            }
            Command::StopHosting { reply } => {
                let result = match self.role.state() {
                    SessionState::Idle => Ok(()),
                    SessionState::Hosting => {
                        self.end_session(CloseReason::Left);
                        Ok(())
                    }
                    _ => Err(SessionError::NotHosting),
                };
                self.reply(reply, result);
            }
            Command::Leave { reply } => {
                match self.role.state() {
                    SessionState::Idle => {}
                    SessionState::Hosting | SessionState::Joined => {
                        self.end_session(CloseReason::Left);
                    }
                    SessionState::Browsing | SessionState::Connecting => {
                        self.fail_join(JoinFailure::Cancelled);
                    }
                }
                self.reply(reply, Ok(()));
            }
        }
    }

    fn host(&mut self, decision: Decision) -> Result<JoinCode, SessionError> {
        if !matches!(self.role, Role::Idle) {
            return Err(SessionError::AlreadyActive(self.role.state()));
        }
        if !decision.is_well_formed() {
            return Err(SessionError::InvalidDecision(
                "a decision needs at least one option".into(),
            ));
        }

        let code = JoinCode::generate();
        let info = DiscoveryInfo::from([(CODE_ATTRIBUTE.to_string(), code.to_string())]);
        if let Err(error) = self.transport.start_advertising(info) {
            warn!(%error, "cannot start hosting");
            self.last_error = Some(error.to_string());
            self.emit(SessionEvent::HostingFailed {
                reason: error.to_string(),
            });
            return Err(error.into());
        }

        let room = HostRoom::new(self.transport.local_peer().display_name.clone(), decision);
        self.last_decision = Some(room.room().decision.clone());
        self.last_error = None;
        self.role = Role::Hosting {
            code: code.clone(),
            room,
        };
        info!(code = %code, "hosting room");
        self.emit(SessionEvent::HostingStarted { code: code.clone() });
        Ok(code)
    }

    fn join(&mut self, code: JoinCode) -> Result<(), SessionError> {
        if !matches!(self.role, Role::Idle) {
            return Err(SessionError::AlreadyActive(self.role.state()));
        }
        if let Err(error) = self.transport.start_browsing() {
            warn!(%error, "cannot browse for rooms");
            let failure = JoinFailure::Denied(error.to_string());
            self.last_error = Some(failure.to_string());
            self.emit(SessionEvent::JoinFailed(failure));
            return Err(error.into());
        }

        info!(code = %code, "looking for room");
        self.last_error = None;
        self.role = Role::Browsing { code };
        Ok(())
    }

    fn update_decision(&mut self, decision: Decision) -> Result<(), SessionError> {
        let Role::Hosting { room, .. } = &mut self.role else {
            return Err(SessionError::NotHosting);
        };
        let step = room
            .update_decision(decision)
            .map_err(|violation| SessionError::InvalidDecision(violation.to_string()))?;
        self.last_decision = Some(room.room().decision.clone());
        self.dispatch(step);
        Ok(())
    }

    fn vote(&mut self, option_id: OptionId) -> Result<(), SessionError> {
        let Role::Joined { guest, .. } = &self.role else {
            return Err(SessionError::NotJoined);
        };
        let room = guest.room().ok_or(SessionError::NoRoomYet)?;
        if !room.decision.has_option(&option_id) {
            return Err(SessionError::UnknownOption(option_id));
        }

        let host = guest.host().id;
        let message = RoomMessage::Vote {
            participant_id: self.transport.local_peer().id.into(),
            option_id,
        };
        let payload = message
            .encode()
            .map_err(|error| SessionError::Transport(error.to_string()))?;
        self.transport.send(&payload, &[host])?;
        debug!(option = %option_id.short(), "vote sent");
        Ok(())
    }

    fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PeerFound { peer, info } => self.peer_found(peer, &info),
            TransportEvent::PeerLost { peer } => {
                debug!(peer = %peer.short(), "peer no longer advertising");
            }
            TransportEvent::Connected { peer } => self.peer_connected(peer),
            TransportEvent::ConnectFailed { peer, reason } => {
                if matches!(&self.role, Role::Connecting { host, .. } if host.id == peer) {
                    self.fail_join(reason.into());
                }
            }
            TransportEvent::Disconnected { peer } => self.peer_disconnected(peer),
            TransportEvent::Received { from, payload } => self.received(from, &payload),
            TransportEvent::AdvertisingFailed { reason } => {
                if matches!(self.role, Role::Hosting { .. }) {
                    warn!(%reason, "advertising stopped by the platform");
                    self.last_error = Some(reason.clone());
                    self.emit(SessionEvent::HostingFailed { reason });
                    self.end_session(CloseReason::Disconnected);
                }
            }
            TransportEvent::BrowsingFailed { reason } => {
                if matches!(self.role, Role::Browsing { .. }) {
                    self.fail_join(JoinFailure::Denied(reason));
                }
            }
        }
    }

    fn peer_found(&mut self, peer: PeerInfo, info: &DiscoveryInfo) {
        let Role::Browsing { code } = &self.role else {
            return;
        };
        let advertised = info.get(CODE_ATTRIBUTE).map_or("", String::as_str);
        if !code.matches(advertised) {
            debug!(%peer, "ignoring room with another code");
            return;
        }

        let code = code.clone();
        self.transport.stop_browsing();
        let timeout = self.config.connect_timeout();
        if let Err(error) = self.transport.connect(&peer.id, timeout) {
            self.fail_join(JoinFailure::Failed(error.to_string()));
            return;
        }
        info!(host = %peer, "found room, connecting");
        self.role = Role::Connecting {
            code,
            host: peer,
            deadline: Instant::now() + timeout + CONNECT_GRACE,
        };
    }

    fn peer_connected(&mut self, peer: PeerInfo) {
        match &mut self.role {
            Role::Hosting { room, .. } => {
                self.connected.insert(peer.id);
                let step = room.peer_connected(&peer);
                self.dispatch(step);
            }
            Role::Connecting { code, host, .. } if host.id == peer.id => {
                let code = code.clone();
                self.connected.insert(peer.id);
                info!(host = %peer, "joined room");
                self.role = Role::Joined {
                    code,
                    guest: GuestRoom::new(peer.clone()),
                };
                self.emit(SessionEvent::JoinSucceeded { host: peer });
            }
            _ => {
                warn!(%peer, "unexpected connection closed");
                self.transport.close(&peer.id);
            }
        }
    }

    fn peer_disconnected(&mut self, peer: PeerId) {
        let was_connected = self.connected.remove(&peer);
        match &mut self.role {
            Role::Hosting { room, .. } => {
                let step = room.peer_disconnected(&peer);
                self.dispatch(step);
            }
            Role::Joined { guest, .. } => {
                if guest.host().id == peer || self.connected.is_empty() {
                    warn!(peer = %peer.short(), "lost connection to the room");
                    self.end_session(CloseReason::Disconnected);
                }
            }
            Role::Connecting { host, .. } if host.id == peer => {
                self.fail_join(JoinFailure::Failed("connection lost".into()));
            }
            _ if was_connected => debug!(peer = %peer.short(), "peer disconnected"),
            _ => {}
        }
    }

    fn received(&mut self, from: PeerId, payload: &[u8]) {
        let message = match RoomMessage::decode(payload, self.config.max_payload_bytes) {
            Ok(message) => message,
            Err(error) => {
                warn!(from = %from.short(), %error, "dropping undecodable payload");
                return;
            }
        };
        let kind = message.kind();

        match &mut self.role {
            Role::Hosting { room, .. } => {
                if !self.connected.contains(&from) {
                    warn!(from = %from.short(), kind, "message from unconnected peer dropped");
                    return;
                }
                match room.handle_message(&from, message) {
                    Ok(step) => self.dispatch(step),
                    Err(violation) => log_violation(from, &violation),
                }
            }
            Role::Joined { guest, .. } => {
                if guest.host().id != from {
                    warn!(from = %from.short(), kind, "message from non-host dropped");
                    return;
                }
                match guest.apply(message) {
                    Ok(Applied::Events(events)) => {
                        if let Some(room) = guest.room() {
                            self.last_decision = Some(room.decision.clone());
                        }
                        for event in events {
                            self.emit(event);
                        }
                    }
                    Ok(Applied::Closed) => {
                        info!("host closed the room");
                        self.end_session(CloseReason::ClosedByHost);
                    }
                    Err(violation) => log_violation(from, &violation),
                }
            }
            _ => debug!(from = %from.short(), kind, "message outside a room dropped"),
        }
    }

    /// Send every outbound message of `step`, then publish its events.
    fn dispatch(&mut self, step: Step) {
        for outbound in step.outbound {
            let (message, targets) = match outbound {
                Outbound::Broadcast(message) => {
                    (message, self.connected.iter().copied().collect::<Vec<_>>())
                }
                Outbound::To(peer, message) => (message, vec![peer]),
            };
            if targets.is_empty() {
                continue;
            }
            let payload = match message.encode() {
                Ok(payload) => payload,
                Err(error) => {
                    warn!(kind = message.kind(), %error, "cannot encode room message");
                    continue;
                }
            };
            if let Err(error) = self.transport.send(&payload, &targets) {
                warn!(kind = message.kind(), %error, "send failed");
            }
        }
        for event in step.events {
            self.emit(event);
        }
    }

    /// Tear down a hosted or joined room.
    fn end_session(&mut self, reason: CloseReason) {
        let last_decision = match mem::replace(&mut self.role, Role::Idle) {
            Role::Hosting { code, room } => {
                let (room, step) = room.close();
                self.dispatch(step);
                self.transport.stop_advertising();
                info!(code = %code, %reason, "room closed");
                Some(room.decision)
            }
            Role::Joined { code, guest } => {
                info!(code = %code, %reason, "left room");
                guest.into_room().map(|room| room.decision)
            }
            other => {
                self.role = other;
                return;
            }
        };

        self.transport.disconnect();
        self.connected.clear();
        if let Some(decision) = last_decision {
            self.last_decision = Some(decision);
        }
        if reason == CloseReason::Disconnected {
            self.last_error = Some(reason.to_string());
        }
        self.emit(SessionEvent::RoomClosed {
            reason,
            last_decision: self.last_decision.clone(),
        });
    }

    /// Abandon a join that is still browsing or connecting.
    fn fail_join(&mut self, failure: JoinFailure) {
        match mem::replace(&mut self.role, Role::Idle) {
            Role::Browsing { .. } => self.transport.stop_browsing(),
            Role::Connecting { .. } => self.transport.disconnect(),
            other => {
                self.role = other;
                return;
            }
        }
        self.connected.clear();
        if failure == JoinFailure::Cancelled {
            info!("join cancelled");
        } else {
            warn!(%failure, "join failed");
            self.last_error = Some(failure.to_string());
        }
        self.emit(SessionEvent::JoinFailed(failure));
    }
}

fn log_violation(from: PeerId, violation: &ProtocolViolation) {
    warn!(from = %from.short(), %violation, "protocol violation, message dropped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn transport_denial_maps_to_its_own_error() {
        assert_eq!(
            SessionError::from(TransportError::Denied("radio off".into())),
            SessionError::TransportDenied("radio off".into())
        );
        assert!(matches!(
            SessionError::from(TransportError::Io("reset".into())),
            SessionError::Transport(_)
        ));
    }

    #[test]
    fn states_display_lowercase() {
        assert_eq!(SessionState::Connecting.to_string(), "connecting");
        assert_eq!(
            SessionError::AlreadyActive(SessionState::Hosting).to_string(),
            "a session is already active (hosting)"
        );
    }

    /// Transport that only records which peers were closed
    struct ClosingTransport {
        local: PeerInfo,
        closed: Arc<Mutex<Vec<PeerId>>>,
    }

    impl Transport for ClosingTransport {
        fn local_peer(&self) -> &PeerInfo {
            &self.local
        }

        fn start_advertising(&mut self, _info: DiscoveryInfo) -> Result<(), TransportError> {
            Ok(())
        }

        fn stop_advertising(&mut self) {}

        fn start_browsing(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn stop_browsing(&mut self) {}

        fn connect(&mut self, _peer: &PeerId, _timeout: Duration) -> Result<(), TransportError> {
            Ok(())
        }

        fn send(&mut self, _payload: &[u8], _to: &[PeerId]) -> Result<(), TransportError> {
            Ok(())
        }

        fn close(&mut self, peer: &PeerId) {
            self.closed.lock().unwrap().push(*peer);
        }

        fn disconnect(&mut self) {}
    }

    #[tokio::test]
    async fn idle_session_closes_stray_connections() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let transport = ClosingTransport {
            local: PeerInfo::new("Idle"),
            closed: Arc::clone(&closed),
        };
        let (events, transport_events) = mpsc::unbounded_channel();
        let session = RoomSession::spawn(transport, transport_events, SessionConfig::default());
        let stranger = PeerInfo::new("Late guest");

        events
            .send(TransportEvent::Connected {
                peer: stranger.clone(),
            })
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while !closed.lock().unwrap().contains(&stranger.id) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.snapshot().connected_peers, 0);
        session.shutdown().await;
    }

    #[test]
    fn idle_role_has_no_code() {
        assert_eq!(Role::Idle.state(), SessionState::Idle);
        assert!(Role::Idle.code().is_none());
    }
}
