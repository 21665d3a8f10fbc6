//! Local network transport over UDP and TCP.
//!
//! Hosts broadcast a JSON beacon on the discovery port at a fixed interval.
//! The beacon carries the host's identity, its discovery attributes and the
//! TCP port it accepts sessions on. Sessions are TCP streams of frames, each
//! a 4-byte big-endian length followed by that many bytes. The first frame in
//! each direction is a JSON handshake exchanging identities.

use std::collections::{HashMap, HashSet};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::transport::{
    ConnectFailure, DiscoveryInfo, PeerId, PeerInfo, Transport, TransportError, TransportEvent,
};
use crate::config::LanConfig;

/// Largest frame accepted from or written to a session stream
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

const MAX_BEACON_LEN: usize = 8 * 1024;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
/// Missed beacons before a host is reported lost
const LOST_AFTER_BEACONS: u32 = 5;

/// Write one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds {MAX_FRAME_LEN}", payload.len()),
        ));
    }
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame length overflow"))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Read one length-prefixed frame. `None` means the stream ended cleanly.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0_u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(error) => return Err(error),
    }

    let len = usize::try_from(u32::from_be_bytes(header))
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame length overflow"))?;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds {MAX_FRAME_LEN}"),
        ));
    }
    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

#[derive(Debug, Serialize, Deserialize)]
struct Beacon {
    service: String,
    peer: PeerInfo,
    info: DiscoveryInfo,
    port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Handshake {
    Hello { service: String, peer: PeerInfo },
    Welcome { peer: PeerInfo },
    Reject { reason: String },
}

async fn write_handshake(stream: &mut TcpStream, handshake: &Handshake) -> io::Result<()> {
    let bytes = serde_json::to_vec(handshake)
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
    write_frame(stream, &bytes).await
}

async fn read_handshake(stream: &mut TcpStream) -> io::Result<Handshake> {
    let bytes = read_frame(stream).await?.ok_or_else(|| {
        io::Error::new(io::ErrorKind::UnexpectedEof, "closed during handshake")
    })?;
    serde_json::from_slice(&bytes).map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))
}

struct Connection {
    generation: u64,
    outbox: mpsc::UnboundedSender<Vec<u8>>,
    reader: JoinHandle<()>,
}

#[derive(Default)]
struct Shared {
    connections: HashMap<PeerId, Connection>,
    /// Session address of every host heard while browsing
    found: HashMap<PeerId, SocketAddr>,
    accepting: bool,
    /// Hosts with a connect in flight; a dial that finishes after being
    /// abandoned must not register
    dialing: HashSet<PeerId>,
    generation: u64,
}

/// Which side of the handshake produced a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Incoming,
    Outgoing,
}

/// State shared between the transport and its background tasks
#[derive(Clone)]
struct Link {
    local: PeerInfo,
    service: String,
    shared: Arc<Mutex<Shared>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl Link {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Take ownership of an established stream and report it connected.
    ///
    /// The stream is dropped instead when the transport stopped advertising
    /// (incoming) or abandoned the connect (outgoing) while the handshake ran.
    fn register(&self, peer: PeerInfo, stream: TcpStream, admission: Admission) -> bool {
        let mut shared = self.lock();
        let admitted = match admission {
            Admission::Incoming => shared.accepting,
            Admission::Outgoing => shared.dialing.remove(&peer.id),
        };
        if !admitted {
            debug!(%peer, ?admission, "late session stream dropped");
            return false;
        }

        let (read_half, write_half) = stream.into_split();
        let (outbox, pending) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(write_half, pending));
        shared.generation += 1;
        let generation = shared.generation;
        // Connected must be queued before the reader can queue anything
        self.notify(TransportEvent::Connected { peer: peer.clone() });
        let reader = tokio::spawn(self.clone().read_loop(read_half, peer.id, generation));
        let previous = shared.connections.insert(
            peer.id,
            Connection {
                generation,
                outbox,
                reader,
            },
        );
        if let Some(previous) = previous {
            previous.reader.abort();
        }
        debug!(%peer, "session stream up");
        true
    }

    async fn read_loop(self, mut reader: OwnedReadHalf, peer: PeerId, generation: u64) {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(payload)) => self.notify(TransportEvent::Received {
                    from: peer,
                    payload,
                }),
                Ok(None) => break,
                Err(error) => {
                    debug!(peer = %peer.short(), %error, "session stream failed");
                    break;
                }
            }
        }

        let removed = {
            let mut shared = self.lock();
            let current = shared
                .connections
                .get(&peer)
                .is_some_and(|connection| connection.generation == generation);
            if current {
                shared.connections.remove(&peer);
            }
            current
        };
        if removed {
            self.notify(TransportEvent::Disconnected { peer });
        }
    }

    async fn accept_loop(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let link = self.clone();
                    tokio::spawn(async move {
                        if let Err(error) = link.accept(stream).await {
                            debug!(%addr, %error, "incoming handshake failed");
                        }
                    });
                }
                Err(error) => {
                    warn!(%error, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Host side of the handshake. Every well-formed hello is accepted while
    /// advertising.
    async fn accept(self, mut stream: TcpStream) -> io::Result<()> {
        let hello = tokio::time::timeout(HANDSHAKE_TIMEOUT, read_handshake(&mut stream))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no hello received"))??;
        let Handshake::Hello { service, peer } = hello else {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "expected hello"));
        };

        let accepting = self.lock().accepting;
        if service != self.service || !accepting {
            let reason = if accepting {
                format!("unknown service '{service}'")
            } else {
                "not accepting connections".to_string()
            };
            return write_handshake(&mut stream, &Handshake::Reject { reason }).await;
        }

        let welcome = Handshake::Welcome {
            peer: self.local.clone(),
        };
        write_handshake(&mut stream, &welcome).await?;
        self.register(peer, stream, Admission::Incoming);
        Ok(())
    }

    /// Guest side: connect, handshake, and report the outcome.
    async fn dial(self, target: PeerId, addr: SocketAddr, timeout: Duration) {
        let failure = match tokio::time::timeout(timeout, self.handshake(addr)).await {
            Ok(Ok((peer, _))) if peer.id != target => {
                ConnectFailure::Failed(format!("expected {target}, reached {}", peer.id))
            }
            Ok(Ok((peer, stream))) => {
                self.register(peer, stream, Admission::Outgoing);
                return;
            }
            Ok(Err(failure)) => failure,
            Err(_) => ConnectFailure::TimedOut,
        };
        debug!(peer = %target.short(), %failure, "connect failed");
        if !self.lock().dialing.remove(&target) {
            return;
        }
        self.notify(TransportEvent::ConnectFailed {
            peer: target,
            reason: failure,
        });
    }

    async fn handshake(&self, addr: SocketAddr) -> Result<(PeerInfo, TcpStream), ConnectFailure> {
        let failed = |error: io::Error| ConnectFailure::Failed(error.to_string());
        let mut stream = TcpStream::connect(addr).await.map_err(failed)?;
        let hello = Handshake::Hello {
            service: self.service.clone(),
            peer: self.local.clone(),
        };
        write_handshake(&mut stream, &hello).await.map_err(failed)?;

        match read_handshake(&mut stream).await.map_err(failed)? {
            Handshake::Welcome { peer } => Ok((peer, stream)),
            Handshake::Reject { reason } => {
                debug!(%addr, %reason, "host rejected connection");
                Err(ConnectFailure::Rejected)
            }
            Handshake::Hello { .. } => Err(ConnectFailure::Failed("unexpected hello".into())),
        }
    }

    async fn beacon_loop(
        self,
        socket: UdpSocket,
        target: SocketAddr,
        beacon: Vec<u8>,
        interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(error) = socket.send_to(&beacon, target).await {
                if error.kind() == io::ErrorKind::PermissionDenied {
                    warn!(%error, "beacon refused");
                    self.notify(TransportEvent::AdvertisingFailed {
                        reason: error.to_string(),
                    });
                    return;
                }
                debug!(%error, "beacon not sent");
            }
        }
    }

    async fn browse_loop(self, socket: UdpSocket, interval: Duration) {
        let mut seen: HashMap<PeerId, (Instant, DiscoveryInfo)> = HashMap::new();
        let mut sweep = tokio::time::interval(interval);
        let lost_after = interval * LOST_AFTER_BEACONS;
        let mut buf = vec![0_u8; MAX_BEACON_LEN];

        loop {
            tokio::select! {
                received = socket.recv_from(&mut buf) => {
                    let (len, from) = match received {
                        Ok(received) => received,
                        Err(error) => {
                            warn!(%error, "discovery socket failed");
                            self.notify(TransportEvent::BrowsingFailed { reason: error.to_string() });
                            return;
                        }
                    };
                    let Ok(beacon) = serde_json::from_slice::<Beacon>(&buf[..len]) else {
                        debug!(%from, "ignoring malformed beacon");
                        continue;
                    };
                    if beacon.service != self.service || beacon.peer.id == self.local.id {
                        continue;
                    }

                    self.lock()
                        .found
                        .insert(beacon.peer.id, SocketAddr::new(from.ip(), beacon.port));
                    let fresh = seen
                        .insert(beacon.peer.id, (Instant::now(), beacon.info.clone()))
                        .map_or(true, |(_, info)| info != beacon.info);
                    if fresh {
                        self.notify(TransportEvent::PeerFound { peer: beacon.peer, info: beacon.info });
                    }
                }
                _ = sweep.tick() => {
                    let lost: Vec<PeerId> = seen
                        .iter()
                        .filter(|(_, (at, _))| at.elapsed() > lost_after)
                        .map(|(peer, _)| *peer)
                        .collect();
                    for peer in lost {
                        seen.remove(&peer);
                        self.notify(TransportEvent::PeerLost { peer });
                    }
                }
            }
        }
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut pending: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(frame) = pending.recv().await {
        if let Err(error) = write_frame(&mut writer, &frame).await {
            debug!(%error, "session write failed");
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// Transport for devices on the same LAN segment
pub struct LanTransport {
    link: Link,
    config: LanConfig,
    advertising: Vec<JoinHandle<()>>,
    browsing: Option<JoinHandle<()>>,
    connecting: HashMap<PeerId, JoinHandle<()>>,
}

impl LanTransport {
    pub fn new(
        display_name: impl Into<String>,
        config: LanConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), TransportError> {
        config.validate().map_err(TransportError::InvalidConfig)?;
        let (events, receiver) = mpsc::unbounded_channel();
        let link = Link {
            local: PeerInfo::new(display_name),
            service: config.service_type.clone(),
            shared: Arc::default(),
            events,
        };
        let transport = Self {
            link,
            config,
            advertising: Vec::new(),
            browsing: None,
            connecting: HashMap::new(),
        };
        Ok((transport, receiver))
    }
}

impl Transport for LanTransport {
    fn local_peer(&self) -> &PeerInfo {
        &self.link.local
    }

    fn start_advertising(&mut self, info: DiscoveryInfo) -> Result<(), TransportError> {
        self.stop_advertising();

        let listener = std::net::TcpListener::bind((self.config.bind_addr, 0))?;
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;
        let port = listener.local_addr()?.port();

        let socket = std::net::UdpSocket::bind((self.config.bind_addr, 0))?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket)?;

        let beacon = Beacon {
            service: self.link.service.clone(),
            peer: self.link.local.clone(),
            info,
            port,
        };
        let beacon =
            serde_json::to_vec(&beacon).map_err(|error| TransportError::Io(error.to_string()))?;

        self.link.lock().accepting = true;
        self.advertising
            .push(tokio::spawn(self.link.clone().accept_loop(listener)));
        self.advertising.push(tokio::spawn(self.link.clone().beacon_loop(
            socket,
            self.config.beacon_addr(),
            beacon,
            self.config.beacon_interval(),
        )));
        info!(port, target = %self.config.beacon_addr(), "advertising on the local network");
        Ok(())
    }

    fn stop_advertising(&mut self) {
        self.link.lock().accepting = false;
        for task in self.advertising.drain(..) {
            task.abort();
        }
    }

    fn start_browsing(&mut self) -> Result<(), TransportError> {
        self.stop_browsing();

        let socket = std::net::UdpSocket::bind(self.config.discovery_bind())?;
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket)?;

        let task = self
            .link
            .clone()
            .browse_loop(socket, self.config.beacon_interval());
        self.browsing = Some(tokio::spawn(task));
        info!(bind = %self.config.discovery_bind(), "browsing the local network");
        Ok(())
    }

    fn stop_browsing(&mut self) {
        if let Some(task) = self.browsing.take() {
            task.abort();
        }
    }

    fn connect(&mut self, peer: &PeerId, timeout: Duration) -> Result<(), TransportError> {
        let addr = self
            .link
            .lock()
            .found
            .get(peer)
            .copied()
            .ok_or(TransportError::UnknownPeer(*peer))?;
        self.link.lock().dialing.insert(*peer);
        self.connecting.retain(|_, task| !task.is_finished());
        let task = tokio::spawn(self.link.clone().dial(*peer, addr, timeout));
        if let Some(previous) = self.connecting.insert(*peer, task) {
            previous.abort();
        }
        Ok(())
    }

    fn send(&mut self, payload: &[u8], to: &[PeerId]) -> Result<(), TransportError> {
        let shared = self.link.lock();
        if let Some(missing) = to.iter().find(|peer| !shared.connections.contains_key(peer)) {
            return Err(TransportError::NotConnected(*missing));
        }
        for peer in to {
            if let Some(connection) = shared.connections.get(peer) {
                // A closed outbox means the stream is already going down
                let _ = connection.outbox.send(payload.to_vec());
            }
        }
        Ok(())
    }

    fn close(&mut self, peer: &PeerId) {
        if let Some(task) = self.connecting.remove(peer) {
            task.abort();
        }
        let connection = {
            let mut shared = self.link.lock();
            shared.dialing.remove(peer);
            shared.connections.remove(peer)
        };
        if let Some(connection) = connection {
            connection.reader.abort();
            debug!(peer = %peer.short(), "session stream closed");
        }
    }

    fn disconnect(&mut self) {
        for (_, task) in self.connecting.drain() {
            task.abort();
        }
        let connections: Vec<Connection> = {
            let mut shared = self.link.lock();
            shared.dialing.clear();
            shared
                .connections
                .drain()
                .map(|(_, connection)| connection)
                .collect()
        };
        for connection in connections {
            // Dropping the outbox lets the writer flush and close the stream
            connection.reader.abort();
        }
    }
}

impl Drop for LanTransport {
    fn drop(&mut self) {
        self.stop_advertising();
        self.stop_browsing();
        self.disconnect();
    }
}
