//! Heartbeat and reconnect timers under a manual clock.

use std::time::Duration;

use serde_json::json;
use tether::correlator::is_heartbeat_reference;
use tether::{
    event, Channel, Session, SessionConfig, TransportError, TransportEvent, Vsn, HEARTBEAT_TOPIC,
};
use tether_test_support::{frames, ManualClock, MockTransport};
use tokio_test::assert_ok;

type TestSession = Session<MockTransport, ManualClock>;

fn setup() -> (TestSession, MockTransport, ManualClock) {
    let transport = MockTransport::new();
    let clock = ManualClock::new();
    let config = SessionConfig::new("ws://localhost:4000/socket/websocket");
    let session = Session::with_clock(config, transport.clone(), clock.clone());
    (session, transport, clock)
}

fn open(session: &mut TestSession, transport: &MockTransport) {
    transport.set_connected(true);
    session.handle_event(TransportEvent::Open);
}

fn heartbeats(transport: &MockTransport) -> usize {
    transport.sent_with_event(Vsn::V1, event::HEARTBEAT).len()
}

#[test]
fn test_heartbeat_every_interval() {
    let (mut session, transport, clock) = setup();
    assert_ok!(session.connect());
    open(&mut session, &transport);
    assert!(session.is_heartbeat_armed());

    clock.advance(Duration::from_secs(29));
    session.poll_timers();
    assert_eq!(heartbeats(&transport), 0);

    clock.advance(Duration::from_secs(1));
    session.poll_timers();
    assert_eq!(heartbeats(&transport), 1);

    clock.advance(Duration::from_secs(30));
    session.poll_timers();
    assert_eq!(heartbeats(&transport), 2);

    let beat = transport.last_sent(Vsn::V1).unwrap();
    assert_eq!(beat.topic, HEARTBEAT_TOPIC);
    assert_eq!(beat.payload, json!({}));
    assert!(is_heartbeat_reference(beat.reference.as_deref().unwrap()));
    assert_eq!(session.pending_requests(), 0);
}

#[test]
fn test_heartbeat_reply_is_harmless() {
    let (mut session, transport, clock) = setup();
    let room = Channel::new("room:1");
    session.join(&room);
    assert_ok!(session.connect());
    open(&mut session, &transport);

    clock.advance(Duration::from_secs(30));
    session.poll_timers();
    let beat = transport.last_sent(Vsn::V1).unwrap();
    session.handle_event(frames::ok(&beat, json!({}), Vsn::V1));

    assert!(room.status().is_joining());
    assert_eq!(session.pending_requests(), 1);
}

#[test]
fn test_reconnect_polls_while_disconnected() {
    let (mut session, transport, clock) = setup();
    assert_ok!(session.connect());
    assert!(session.is_reconnect_armed());
    assert_eq!(transport.open_count(), 1);

    // First attempt fails.
    transport.set_connected(false);
    session.handle_event(TransportEvent::Close(Some(TransportError::io("refused"))));

    clock.advance(Duration::from_secs(5));
    session.poll_timers();
    assert_eq!(transport.open_count(), 2);

    open(&mut session, &transport);
    clock.advance(Duration::from_secs(5));
    session.poll_timers();
    assert_eq!(transport.open_count(), 2);
}

#[test]
fn test_reconnect_waits_for_in_flight_attempt() {
    let (mut session, transport, clock) = setup();
    let room = Channel::new("room:1");
    session.join(&room);
    assert_ok!(session.connect());

    // A slow handshake outlives several reconnect ticks.
    for _ in 0..4 {
        clock.advance(Duration::from_secs(5));
        session.poll_timers();
    }
    assert_eq!(transport.open_count(), 1);
    assert!(session.is_reconnect_armed());

    open(&mut session, &transport);
    assert_eq!(transport.sent_with_event(Vsn::V1, event::JOIN).len(), 1);
    assert!(room.status().is_joining());
}

#[test]
fn test_reconnect_marks_channels_joining() {
    let (mut session, transport, clock) = setup();
    let room = Channel::new("room:1");
    session.join(&room);
    assert_ok!(session.connect());
    open(&mut session, &transport);
    let join = transport.last_sent(Vsn::V1).unwrap();
    session.handle_event(frames::ok(&join, json!({}), Vsn::V1));
    assert!(room.is_joined());

    transport.set_connected(false);
    session.handle_event(TransportEvent::Close(None));
    assert!(!session.is_heartbeat_armed());
    assert!(session.is_reconnect_armed());

    clock.advance(Duration::from_secs(5));
    session.poll_timers();
    assert!(room.status().is_joining());
    assert_eq!(transport.open_count(), 2);
}

#[test]
fn test_custom_reconnect_interval() {
    let (mut session, transport, clock) = setup();
    assert_ok!(session.connect_with(true, Duration::from_secs(2)));
    transport.set_connected(false);

    clock.advance(Duration::from_secs(2));
    session.poll_timers();
    assert_eq!(transport.open_count(), 2);
}

#[test]
fn test_connect_without_auto_reconnect() {
    let (mut session, transport, clock) = setup();
    assert_ok!(session.connect_with(false, Duration::from_secs(5)));
    assert!(!session.is_reconnect_armed());
    assert_eq!(session.next_deadline(), None);

    clock.advance(Duration::from_secs(60));
    session.poll_timers();
    assert_eq!(transport.open_count(), 1);
}

#[test]
fn test_disconnect_cancels_timers() {
    let (mut session, transport, clock) = setup();
    assert_ok!(session.connect());
    open(&mut session, &transport);

    session.disconnect(None);
    assert!(!session.is_heartbeat_armed());
    assert!(!session.is_reconnect_armed());
    assert_eq!(session.next_deadline(), None);

    clock.advance(Duration::from_secs(120));
    session.poll_timers();
    assert_eq!(transport.open_count(), 1);
    assert_eq!(heartbeats(&transport), 0);
}

#[test]
fn test_connect_on_live_session_refreshes_heartbeat() {
    let (mut session, transport, clock) = setup();
    assert_ok!(session.connect());
    open(&mut session, &transport);

    clock.advance(Duration::from_secs(20));
    assert_ok!(session.connect());

    assert_eq!(transport.open_count(), 1);
    assert_eq!(heartbeats(&transport), 1);

    // Rescheduled from the refresh, not from the open.
    clock.advance(Duration::from_secs(20));
    session.poll_timers();
    assert_eq!(heartbeats(&transport), 1);
    clock.advance(Duration::from_secs(10));
    session.poll_timers();
    assert_eq!(heartbeats(&transport), 2);
}

#[test]
fn test_next_deadline_is_earliest_timer() {
    let (mut session, transport, clock) = setup();
    let start = tether::Clock::now(&clock);

    assert_ok!(session.connect());
    assert_eq!(session.next_deadline(), Some(start + Duration::from_secs(5)));

    open(&mut session, &transport);
    assert_eq!(session.next_deadline(), Some(start + Duration::from_secs(5)));

    session.disconnect(None);
    assert_ok!(session.connect_with(true, Duration::from_secs(60)));
    open(&mut session, &transport);
    assert_eq!(session.next_deadline(), Some(start + Duration::from_secs(30)));
}
