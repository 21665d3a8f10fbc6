//! In-process transport simulating devices sharing a radio range.
//!
//! Every endpoint created from the same [`LocalNetwork`] can discover and
//! connect to the others. The network also exposes knobs to reproduce field
//! conditions: refused permissions, hosts that never answer, dropped links,
//! and raw payload injection.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::transport::{
    ConnectFailure, DiscoveryInfo, PeerId, PeerInfo, Transport, TransportError, TransportEvent,
};

struct Endpoint {
    info: PeerInfo,
    events: mpsc::UnboundedSender<TransportEvent>,
    advertising: Option<DiscoveryInfo>,
    browsing: bool,
    links: HashSet<PeerId>,
    denied: bool,
    silent: bool,
}

impl Endpoint {
    fn notify(&self, event: TransportEvent) {
        // A closed receiver means the owner is shutting down
        let _ = self.events.send(event);
    }
}

#[derive(Default)]
struct NetworkState {
    endpoints: HashMap<PeerId, Endpoint>,
}

impl NetworkState {
    fn unlink(&mut self, a: &PeerId, b: &PeerId) -> bool {
        let removed = self
            .endpoints
            .get_mut(a)
            .is_some_and(|endpoint| endpoint.links.remove(b));
        if let Some(endpoint) = self.endpoints.get_mut(b) {
            endpoint.links.remove(a);
        }
        removed
    }
}

/// Shared medium for [`LocalTransport`] endpoints
#[derive(Clone, Default)]
pub struct LocalNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl LocalNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a device to the network.
    ///
    /// The receiver carries every event addressed to the new transport.
    #[must_use]
    pub fn endpoint(
        &self,
        display_name: impl Into<String>,
    ) -> (LocalTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let info = PeerInfo::new(display_name);
        self.lock().endpoints.insert(
            info.id,
            Endpoint {
                info: info.clone(),
                events,
                advertising: None,
                browsing: false,
                links: HashSet::new(),
                denied: false,
                silent: false,
            },
        );
        let transport = LocalTransport {
            peer: info,
            network: self.clone(),
            pending: HashMap::new(),
        };
        (transport, receiver)
    }

    /// Make advertising and browsing fail for `peer`, as if the user refused
    /// the local network permission.
    pub fn deny_permissions(&self, peer: &PeerId, denied: bool) {
        if let Some(endpoint) = self.lock().endpoints.get_mut(peer) {
            endpoint.denied = denied;
        }
    }

    /// Incoming connects to a silent peer are never answered.
    pub fn silence(&self, peer: &PeerId, silent: bool) {
        if let Some(endpoint) = self.lock().endpoints.get_mut(peer) {
            endpoint.silent = silent;
        }
    }

    /// Cut the link between two peers without a goodbye on either side.
    pub fn drop_link(&self, a: &PeerId, b: &PeerId) {
        let mut state = self.lock();
        if !state.unlink(a, b) {
            return;
        }
        debug!(a = %a.short(), b = %b.short(), "local link dropped");
        if let Some(endpoint) = state.endpoints.get(a) {
            endpoint.notify(TransportEvent::Disconnected { peer: *b });
        }
        if let Some(endpoint) = state.endpoints.get(b) {
            endpoint.notify(TransportEvent::Disconnected { peer: *a });
        }
    }

    /// Deliver arbitrary bytes to `to` as if `from` had sent them.
    pub fn inject(&self, from: &PeerId, to: &PeerId, payload: Vec<u8>) {
        if let Some(endpoint) = self.lock().endpoints.get(to) {
            endpoint.notify(TransportEvent::Received {
                from: *from,
                payload,
            });
        }
    }

    /// Peers currently linked to `peer`
    #[must_use]
    pub fn links(&self, peer: &PeerId) -> Vec<PeerId> {
        self.lock()
            .endpoints
            .get(peer)
            .map(|endpoint| endpoint.links.iter().copied().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_advertising(&self, peer: &PeerId) -> bool {
        self.lock()
            .endpoints
            .get(peer)
            .is_some_and(|endpoint| endpoint.advertising.is_some())
    }

    #[must_use]
    pub fn is_browsing(&self, peer: &PeerId) -> bool {
        self.lock()
            .endpoints
            .get(peer)
            .is_some_and(|endpoint| endpoint.browsing)
    }
}

/// One device on a [`LocalNetwork`]
pub struct LocalTransport {
    peer: PeerInfo,
    network: LocalNetwork,
    pending: HashMap<PeerId, JoinHandle<()>>,
}

impl LocalTransport {
    #[must_use]
    pub const fn network(&self) -> &LocalNetwork {
        &self.network
    }

    fn cancel_pending(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }

    fn withdraw(&self, state: &mut NetworkState) {
        let Some(endpoint) = state.endpoints.get_mut(&self.peer.id) else {
            return;
        };
        if endpoint.advertising.take().is_none() {
            return;
        }
        for other in state.endpoints.values() {
            if other.browsing && other.info.id != self.peer.id {
                other.notify(TransportEvent::PeerLost { peer: self.peer.id });
            }
        }
    }
}

impl Transport for LocalTransport {
    fn local_peer(&self) -> &PeerInfo {
        &self.peer
    }

    fn start_advertising(&mut self, info: DiscoveryInfo) -> Result<(), TransportError> {
        let mut state = self.network.lock();
        let endpoint = state
            .endpoints
            .get_mut(&self.peer.id)
            .ok_or(TransportError::UnknownPeer(self.peer.id))?;
        if endpoint.denied {
            return Err(TransportError::Denied(
                "local network access was refused".into(),
            ));
        }
        endpoint.advertising = Some(info.clone());

        for other in state.endpoints.values() {
            if other.browsing && other.info.id != self.peer.id {
                other.notify(TransportEvent::PeerFound {
                    peer: self.peer.clone(),
                    info: info.clone(),
                });
            }
        }
        Ok(())
    }

    fn stop_advertising(&mut self) {
        let mut state = self.network.lock();
        self.withdraw(&mut state);
    }

    fn start_browsing(&mut self) -> Result<(), TransportError> {
        let mut state = self.network.lock();
        let endpoint = state
            .endpoints
            .get_mut(&self.peer.id)
            .ok_or(TransportError::UnknownPeer(self.peer.id))?;
        if endpoint.denied {
            return Err(TransportError::Denied(
                "local network access was refused".into(),
            ));
        }
        endpoint.browsing = true;

        let Some(me) = state.endpoints.get(&self.peer.id) else {
            return Ok(());
        };
        for other in state.endpoints.values() {
            if let Some(info) = &other.advertising {
                if other.info.id != self.peer.id {
                    me.notify(TransportEvent::PeerFound {
                        peer: other.info.clone(),
                        info: info.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn stop_browsing(&mut self) {
        if let Some(endpoint) = self.network.lock().endpoints.get_mut(&self.peer.id) {
            endpoint.browsing = false;
        }
    }

    fn connect(&mut self, peer: &PeerId, timeout: Duration) -> Result<(), TransportError> {
        let mut state = self.network.lock();
        let target = state
            .endpoints
            .get(peer)
            .ok_or(TransportError::UnknownPeer(*peer))?;
        let me = state
            .endpoints
            .get(&self.peer.id)
            .ok_or(TransportError::UnknownPeer(self.peer.id))?;

        if target.silent {
            let events = me.events.clone();
            let target_id = *peer;
            let handle = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = events.send(TransportEvent::ConnectFailed {
                    peer: target_id,
                    reason: ConnectFailure::TimedOut,
                });
            });
            self.pending.retain(|_, pending| !pending.is_finished());
            if let Some(previous) = self.pending.insert(*peer, handle) {
                previous.abort();
            }
            return Ok(());
        }

        if target.advertising.is_none() {
            me.notify(TransportEvent::ConnectFailed {
                peer: *peer,
                reason: ConnectFailure::Rejected,
            });
            return Ok(());
        }

        target.notify(TransportEvent::Connected {
            peer: self.peer.clone(),
        });
        me.notify(TransportEvent::Connected {
            peer: target.info.clone(),
        });
        if let Some(endpoint) = state.endpoints.get_mut(&self.peer.id) {
            endpoint.links.insert(*peer);
        }
        if let Some(endpoint) = state.endpoints.get_mut(peer) {
            endpoint.links.insert(self.peer.id);
        }
        Ok(())
    }

    fn send(&mut self, payload: &[u8], to: &[PeerId]) -> Result<(), TransportError> {
        let state = self.network.lock();
        let me = state
            .endpoints
            .get(&self.peer.id)
            .ok_or(TransportError::UnknownPeer(self.peer.id))?;
        if let Some(missing) = to.iter().find(|peer| !me.links.contains(peer)) {
            return Err(TransportError::NotConnected(*missing));
        }

        for peer in to {
            if let Some(endpoint) = state.endpoints.get(peer) {
                endpoint.notify(TransportEvent::Received {
                    from: self.peer.id,
                    payload: payload.to_vec(),
                });
            }
        }
        Ok(())
    }

    fn close(&mut self, peer: &PeerId) {
        if let Some(handle) = self.pending.remove(peer) {
            handle.abort();
        }
        let mut state = self.network.lock();
        if state.unlink(&self.peer.id, peer) {
            if let Some(endpoint) = state.endpoints.get(peer) {
                endpoint.notify(TransportEvent::Disconnected { peer: self.peer.id });
            }
        }
    }

    fn disconnect(&mut self) {
        self.cancel_pending();
        let mut state = self.network.lock();
        let links: Vec<PeerId> = state
            .endpoints
            .get_mut(&self.peer.id)
            .map(|endpoint| endpoint.links.drain().collect())
            .unwrap_or_default();
        for peer in links {
            if let Some(endpoint) = state.endpoints.get_mut(&peer) {
                endpoint.links.remove(&self.peer.id);
                endpoint.notify(TransportEvent::Disconnected { peer: self.peer.id });
            }
        }
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.disconnect();
        let mut state = self.network.lock();
        self.withdraw(&mut state);
        state.endpoints.remove(&self.peer.id);
    }
}
