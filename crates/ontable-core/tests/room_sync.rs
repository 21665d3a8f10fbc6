//! End-to-end room scenarios on the in-memory network.

use std::time::Duration;

use ontable_core::config::SessionConfig;
use ontable_core::room::{
    CloseReason, DiscoveryInfo, JoinCode, JoinFailure, LocalNetwork, PeerId, RoomSession,
    SessionError, SessionEvent, SessionSnapshot, SessionState, Transport, CODE_ATTRIBUTE,
};
use ontable_core::{Decision, DecisionOption, OptionId, ParticipantId};
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

const WAIT: Duration = Duration::from_secs(2);

struct Device {
    session: RoomSession,
    events: broadcast::Receiver<SessionEvent>,
}

impl Device {
    fn new(network: &LocalNetwork, name: &str) -> Self {
        Self::with_config(network, name, SessionConfig::default())
    }

    fn with_config(network: &LocalNetwork, name: &str, config: SessionConfig) -> Self {
        let (transport, transport_events) = network.endpoint(name);
        let session = RoomSession::spawn(transport, transport_events, config);
        let events = session.subscribe();
        Self { session, events }
    }

    fn peer_id(&self) -> PeerId {
        self.session.local_peer().id
    }

    /// Skip events until one matches.
    async fn expect(&mut self, what: &str, matches: impl Fn(&SessionEvent) -> bool) -> SessionEvent {
        loop {
            let event = tokio::time::timeout(WAIT, self.events.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
                .expect("session event stream closed");
            if matches(&event) {
                return event;
            }
        }
    }

    async fn until(&self, what: &str, check: impl FnMut(&SessionSnapshot) -> bool) -> SessionSnapshot {
        let mut watch = self.session.watch();
        let snapshot = tokio::time::timeout(WAIT, watch.wait_for(check))
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
            .expect("session stopped")
            .clone();
        snapshot
    }
}

fn decision() -> Decision {
    Decision::new("Where should we eat?", ["Tacos", "Ramen", "Pizza"]).unwrap()
}

fn participants(snapshot: &SessionSnapshot) -> usize {
    snapshot.room.as_ref().map_or(0, |room| room.participants.len())
}

async fn host_room(network: &LocalNetwork) -> (Device, JoinCode) {
    let mut host = Device::new(network, "Host phone");
    let code = host.session.host(decision()).await.unwrap();
    host.expect("hosting started", |e| matches!(e, SessionEvent::HostingStarted { .. }))
        .await;
    (host, code)
}

async fn join_room(network: &LocalNetwork, name: &str, code: &JoinCode) -> Device {
    let mut guest = Device::new(network, name);
    guest.session.join_and_wait(code.clone(), WAIT).await.unwrap();
    guest
        .expect("first snapshot", |e| matches!(e, SessionEvent::DecisionUpdated(_)))
        .await;
    guest
}

#[tokio::test]
async fn host_lifecycle() {
    let network = LocalNetwork::new();
    let (host, code) = host_room(&network).await;
    assert_eq!(code.as_str().len(), 6);
    assert_eq!(host.session.state(), SessionState::Hosting);
    assert!(network.is_advertising(&host.peer_id()));

    let snapshot = host.session.snapshot();
    assert_eq!(snapshot.join_code.as_ref(), Some(&code));
    let hosted = snapshot.room.unwrap();
    assert_eq!(hosted.host_name, "Host phone");
    assert!(hosted.participants.is_empty());

    let mut guest = join_room(&network, "Ana", &code).await;
    let host_snapshot = host.until("guest admitted", |s| participants(s) == 1).await;
    let guest_snapshot = guest.until("guest sees itself", |s| participants(s) == 1).await;
    assert_eq!(guest_snapshot.state, SessionState::Joined);
    assert_eq!(
        guest_snapshot.room.as_ref().unwrap().decision,
        host_snapshot.room.as_ref().unwrap().decision
    );
    assert_eq!(
        guest_snapshot.host.as_ref().map(|h| h.display_name.as_str()),
        Some("Host phone")
    );

    host.session.stop_hosting().await.unwrap();
    let closed = guest
        .expect("room closed", |e| matches!(e, SessionEvent::RoomClosed { .. }))
        .await;
    let SessionEvent::RoomClosed {
        reason,
        last_decision,
    } = closed
    else {
        unreachable!()
    };
    assert_eq!(reason, CloseReason::ClosedByHost);
    assert_eq!(last_decision.unwrap().title, "Where should we eat?");

    let host_after = host.session.snapshot();
    assert_eq!(host_after.state, SessionState::Idle);
    assert!(host_after.room.is_none());
    assert!(host_after.join_code.is_none());
    assert!(host_after.last_decision.is_some());
    assert!(!network.is_advertising(&host.peer_id()));
    assert!(network.links(&host.peer_id()).is_empty());

    let guest_after = guest.until("guest idle", |s| s.state == SessionState::Idle).await;
    assert!(guest_after.room.is_none());
    assert_eq!(guest_after.last_decision.unwrap().options.len(), 3);
}

#[tokio::test]
async fn vote_then_disconnect() {
    let network = LocalNetwork::new();
    let (mut host, code) = host_room(&network).await;
    let mut guest = join_room(&network, "Ana", &code).await;
    host.until("guest admitted", |s| participants(s) == 1).await;

    let ramen = guest.session.room().unwrap().decision.options[1].id;
    guest.session.vote(ramen).await.unwrap();

    let recorded = host
        .expect("vote on host", |e| matches!(e, SessionEvent::VoteRecorded { .. }))
        .await;
    assert_eq!(
        recorded,
        SessionEvent::VoteRecorded {
            participant_id: guest.peer_id().into(),
            option_id: ramen
        }
    );
    guest
        .expect("vote echoed", |e| matches!(e, SessionEvent::VoteRecorded { .. }))
        .await;
    let room = guest.session.room().unwrap();
    assert_eq!(room.participants[0].vote, Some(ramen));
    assert_eq!(room.tally()[1], (ramen, 1));

    network.drop_link(&host.peer_id(), &guest.peer_id());

    let left = host
        .expect("participant left", |e| matches!(e, SessionEvent::ParticipantLeft(_)))
        .await;
    assert_eq!(left, SessionEvent::ParticipantLeft(guest.peer_id().into()));
    assert_eq!(participants(&host.session.snapshot()), 0);
    assert_eq!(host.session.state(), SessionState::Hosting);

    let closed = guest
        .expect("guest closed", |e| matches!(e, SessionEvent::RoomClosed { .. }))
        .await;
    assert!(matches!(
        closed,
        SessionEvent::RoomClosed {
            reason: CloseReason::Disconnected,
            last_decision: Some(_)
        }
    ));
    assert_eq!(guest.session.state(), SessionState::Idle);
}

#[tokio::test]
async fn malformed_payload_is_dropped() {
    let network = LocalNetwork::new();
    let (mut host, code) = host_room(&network).await;
    let guest = join_room(&network, "Ana", &code).await;
    let before = host.until("guest admitted", |s| participants(s) == 1).await;

    let noise = vec![0x13, 0x9f, 0x00, 0xff, 0x42, 0x7b, 0x22, 0x74, 0xde, 0xad, 0xbe, 0xef];
    network.inject(&guest.peer_id(), &host.peer_id(), noise.clone());
    network.inject(&host.peer_id(), &guest.peer_id(), noise);

    // A valid vote after the noise proves both sides are still processing
    let pizza = before.room.as_ref().unwrap().decision.options[2].id;
    guest.session.vote(pizza).await.unwrap();
    host.expect("vote after noise", |e| matches!(e, SessionEvent::VoteRecorded { .. }))
        .await;

    let after = host.session.snapshot();
    assert_eq!(after.state, SessionState::Hosting);
    let room = after.room.unwrap();
    assert_eq!(room.decision, before.room.unwrap().decision);
    assert_eq!(room.participants.len(), 1);
    assert_eq!(guest.session.state(), SessionState::Joined);
}

#[tokio::test]
async fn room_closed_with_two_guests() {
    let network = LocalNetwork::new();
    let (host, code) = host_room(&network).await;
    let mut ana = join_room(&network, "Ana", &code).await;
    let mut ben = join_room(&network, "Ben", &code).await;
    host.until("both admitted", |s| participants(s) == 2).await;
    ana.until("ana sees ben", |s| participants(s) == 2).await;
    let ben_view = ben.until("ben sees ana", |s| participants(s) == 2).await;

    // Ben learned about Ana before himself, in join order
    let names: Vec<String> = ben_view
        .room
        .unwrap()
        .participants
        .into_iter()
        .map(|p| p.display_name)
        .collect();
    assert_eq!(names, ["Ana", "Ben"]);

    let tacos = ana.session.room().unwrap().decision.options[0].id;
    ana.session.vote(tacos).await.unwrap();
    let seen_by_ben = ben
        .expect("ana's vote", |e| matches!(e, SessionEvent::VoteRecorded { .. }))
        .await;
    assert_eq!(
        seen_by_ben,
        SessionEvent::VoteRecorded {
            participant_id: ana.peer_id().into(),
            option_id: tacos
        }
    );

    host.session.stop_hosting().await.unwrap();
    for guest in [&mut ana, &mut ben] {
        let closed = guest
            .expect("room closed", |e| matches!(e, SessionEvent::RoomClosed { .. }))
            .await;
        assert!(matches!(
            closed,
            SessionEvent::RoomClosed {
                reason: CloseReason::ClosedByHost,
                ..
            }
        ));
        guest.until("idle", |s| s.state == SessionState::Idle).await;
    }
}

#[tokio::test]
async fn guest_leaving_is_announced_to_others() {
    let network = LocalNetwork::new();
    let (mut host, code) = host_room(&network).await;
    let ana = join_room(&network, "Ana", &code).await;
    let ben = join_room(&network, "Ben", &code).await;
    ben.until("ben sees ana", |s| participants(s) == 2).await;

    ana.session.leave().await.unwrap();
    assert_eq!(ana.session.state(), SessionState::Idle);

    host.expect("ana left", |e| {
        matches!(e, SessionEvent::ParticipantLeft(id) if *id == ParticipantId::from(ana.peer_id()))
    })
    .await;
    let view = ben.until("ana gone", |s| participants(s) == 1).await;
    assert_eq!(view.room.unwrap().participants[0].display_name, "Ben");
}

#[tokio::test]
async fn decision_updates_reach_guests_and_clear_stale_votes() {
    let network = LocalNetwork::new();
    let (mut host, code) = host_room(&network).await;
    let mut guest = join_room(&network, "Ana", &code).await;
    host.until("guest admitted", |s| participants(s) == 1).await;

    let pizza = guest.session.room().unwrap().decision.options[2].id;
    guest.session.vote(pizza).await.unwrap();
    host.expect("vote", |e| matches!(e, SessionEvent::VoteRecorded { .. }))
        .await;
    guest
        .expect("vote echoed", |e| matches!(e, SessionEvent::VoteRecorded { .. }))
        .await;

    let mut next = host.session.room().unwrap().decision;
    next.remove_option(&pizza).unwrap();
    next.add_option(DecisionOption::new("Curry").with_pro("Spicy", 4));
    host.session.update_decision(next.clone()).await.unwrap();

    let SessionEvent::DecisionUpdated(received) = guest
        .expect("update", |e| matches!(e, SessionEvent::DecisionUpdated(_)))
        .await
    else {
        unreachable!()
    };
    assert_eq!(received, next);
    let room = guest.session.room().unwrap();
    assert_eq!(room.participants[0].vote, None);
    assert_eq!(room.decision.options[2].title, "Curry");
    assert_eq!(host.session.room().unwrap().participants[0].vote, None);
}

#[tokio::test]
async fn guests_cannot_vote_for_unknown_options_or_edit() {
    let network = LocalNetwork::new();
    let (host, code) = host_room(&network).await;
    let guest = join_room(&network, "Ana", &code).await;

    let unknown = OptionId::new();
    assert_eq!(
        guest.session.vote(unknown).await,
        Err(SessionError::UnknownOption(unknown))
    );
    assert_eq!(
        guest.session.update_decision(decision()).await,
        Err(SessionError::NotHosting)
    );
    assert_eq!(
        host.session.vote(unknown).await,
        Err(SessionError::NotJoined)
    );
}

#[tokio::test]
async fn join_rejected_by_host() {
    let network = LocalNetwork::new();
    let (mut impostor, _impostor_events) = network.endpoint("Impostor");
    let mut guest = Device::new(&network, "Ana");
    let code = JoinCode::parse("AB23CD").unwrap();

    guest.session.join(code.clone()).await.unwrap();
    assert_eq!(guest.session.state(), SessionState::Browsing);

    // Found while advertising, gone by the time the connection arrives
    impostor
        .start_advertising(DiscoveryInfo::from([(
            CODE_ATTRIBUTE.to_string(),
            code.to_string(),
        )]))
        .unwrap();
    impostor.stop_advertising();

    let failed = guest
        .expect("join failed", |e| matches!(e, SessionEvent::JoinFailed(_)))
        .await;
    assert_eq!(failed, SessionEvent::JoinFailed(JoinFailure::Rejected));
    let snapshot = guest.until("idle", |s| s.state == SessionState::Idle).await;
    assert!(snapshot.last_error.is_some());
}

#[tokio::test]
async fn join_times_out_on_silent_host() {
    let network = LocalNetwork::new();
    let (mut silent, _silent_events) = network.endpoint("Silent host");
    let code = JoinCode::parse("XY7K9P").unwrap();
    silent
        .start_advertising(DiscoveryInfo::from([(
            CODE_ATTRIBUTE.to_string(),
            code.to_string(),
        )]))
        .unwrap();
    network.silence(&silent.local_peer().id, true);

    let config = SessionConfig::default().with_connect_timeout(Duration::from_millis(200));
    let guest = Device::with_config(&network, "Ana", config);
    let result = guest.session.join_and_wait(code, WAIT).await;

    assert_eq!(result, Err(SessionError::JoinFailed(JoinFailure::TimedOut)));
    assert_eq!(guest.session.state(), SessionState::Idle);
    assert!(network.links(&guest.peer_id()).is_empty());
}

#[tokio::test]
async fn ignores_rooms_with_other_codes() {
    let network = LocalNetwork::new();
    let (_host, code) = host_room(&network).await;
    let other = if code.as_str() == "AB23CD" { "XY7K9P" } else { "AB23CD" };

    let guest = Device::new(&network, "Ana");
    let result = guest
        .session
        .join_and_wait(other.parse().unwrap(), Duration::from_millis(300))
        .await;
    assert_eq!(result, Err(SessionError::JoinFailed(JoinFailure::NotFound)));
    assert_eq!(guest.session.state(), SessionState::Idle);
}

#[tokio::test]
async fn transport_denied_keeps_session_idle() {
    let network = LocalNetwork::new();
    let (transport, transport_events) = network.endpoint("Locked phone");
    network.deny_permissions(&transport.local_peer().id, true);
    let session = RoomSession::spawn(transport, transport_events, SessionConfig::default());
    let mut events = session.subscribe();

    let result = session.host(decision()).await;
    assert!(matches!(result, Err(SessionError::TransportDenied(_))));
    assert!(matches!(
        events.recv().await,
        Ok(SessionEvent::HostingFailed { .. })
    ));
    assert_eq!(session.state(), SessionState::Idle);

    let result = session.join("AB23CD".parse().unwrap()).await;
    assert!(matches!(result, Err(SessionError::TransportDenied(_))));
    assert!(matches!(
        events.recv().await,
        Ok(SessionEvent::JoinFailed(JoinFailure::Denied(_)))
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.snapshot().last_error.is_some());
}

#[tokio::test]
async fn second_session_while_active_is_refused() {
    let network = LocalNetwork::new();
    let (host, code) = host_room(&network).await;

    assert_eq!(
        host.session.host(decision()).await,
        Err(SessionError::AlreadyActive(SessionState::Hosting))
    );
    assert_eq!(
        host.session.join(code.clone()).await,
        Err(SessionError::AlreadyActive(SessionState::Hosting))
    );
    assert_eq!(host.session.snapshot().join_code, Some(code));
}

#[tokio::test]
async fn stop_and_leave_are_idempotent() {
    let network = LocalNetwork::new();
    let device = Device::new(&network, "Host phone");
    assert_eq!(device.session.stop_hosting().await, Ok(()));
    assert_eq!(device.session.leave().await, Ok(()));

    device.session.host(decision()).await.unwrap();
    assert_eq!(device.session.stop_hosting().await, Ok(()));
    assert_eq!(device.session.stop_hosting().await, Ok(()));
    assert_eq!(device.session.leave().await, Ok(()));
    assert_eq!(device.session.state(), SessionState::Idle);
}

#[tokio::test]
async fn leaving_while_browsing_cancels_the_join() {
    let network = LocalNetwork::new();
    let mut guest = Device::new(&network, "Ana");
    guest.session.join("AB23CD".parse().unwrap()).await.unwrap();
    assert!(network.is_browsing(&guest.peer_id()));

    guest.session.leave().await.unwrap();
    let cancelled = guest
        .expect("cancelled", |e| matches!(e, SessionEvent::JoinFailed(_)))
        .await;
    assert_eq!(cancelled, SessionEvent::JoinFailed(JoinFailure::Cancelled));
    assert!(!network.is_browsing(&guest.peer_id()));
    assert_eq!(guest.session.state(), SessionState::Idle);
}

#[tokio::test]
async fn shutdown_closes_the_hosted_room() {
    let network = LocalNetwork::new();
    let (host, code) = host_room(&network).await;
    let mut guest = join_room(&network, "Ana", &code).await;

    host.session.shutdown().await;
    let closed = guest
        .expect("room closed", |e| matches!(e, SessionEvent::RoomClosed { .. }))
        .await;
    assert!(matches!(
        closed,
        SessionEvent::RoomClosed {
            reason: CloseReason::ClosedByHost,
            ..
        }
    ));
}
