//! Reconnection handshake tests.
//!
//! Covers the mutual-intent gate, pre-seeded intents from room teardown,
//! the busy-peer rule, retry counters, and the stale-intent sweep. Time
//! is virtualized so expiry can be tested without sleeping.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use pairlink_core::{Environment, RelayAction, RelayConfig, RelayDriver, RelayEvent};
use pairlink_proto::{ClientRequest, ConnectionId, Identity, MatchKey, ServerMessage};

/// Environment with a manually advanced clock and counter RNG.
#[derive(Clone)]
struct VirtualEnv {
    start: Instant,
    offset_millis: Arc<AtomicU64>,
    counter: Arc<AtomicU64>,
}

impl VirtualEnv {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            offset_millis: Arc::new(AtomicU64::new(0)),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }

    fn advance(&self, duration: Duration) {
        self.offset_millis.fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }
}

impl Environment for VirtualEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        self.start + Duration::from_millis(self.offset_millis.load(Ordering::Relaxed))
    }

    fn wall_clock_millis(&self) -> u64 {
        1_700_000_000_000 + self.offset_millis.load(Ordering::Relaxed)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let value = self.counter.fetch_add(1, Ordering::Relaxed);
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = value.to_le_bytes()[i % 8];
        }
    }
}

fn driver(env: &VirtualEnv) -> RelayDriver<VirtualEnv> {
    RelayDriver::new(env.clone(), RelayConfig::default())
}

fn open(driver: &mut RelayDriver<VirtualEnv>, n: u64) -> ConnectionId {
    let connection = ConnectionId::new(n);
    driver.process_event(RelayEvent::ConnectionOpened { connection }).unwrap();
    connection
}

fn join(
    driver: &mut RelayDriver<VirtualEnv>,
    connection: ConnectionId,
    identity: &str,
) -> Vec<RelayAction> {
    driver
        .process_event(RelayEvent::RequestReceived {
            connection,
            request: ClientRequest::Join {
                match_key: MatchKey::Zone { name: "z".into() },
                identity: Some(Identity::from(identity)),
            },
        })
        .unwrap()
}

fn reconnect(
    driver: &mut RelayDriver<VirtualEnv>,
    connection: ConnectionId,
    identity: &str,
    target: &str,
) -> Vec<RelayAction> {
    driver
        .process_event(RelayEvent::RequestReceived {
            connection,
            request: ClientRequest::Reconnect {
                identity: Identity::from(identity),
                target: Identity::from(target),
            },
        })
        .unwrap()
}

fn close(driver: &mut RelayDriver<VirtualEnv>, connection: ConnectionId) -> Vec<RelayAction> {
    driver.process_event(RelayEvent::ConnectionClosed { connection }).unwrap()
}

fn sent_to(actions: &[RelayAction], connection: ConnectionId) -> Vec<ServerMessage> {
    actions
        .iter()
        .filter_map(|action| match action {
            RelayAction::Send { connection: target, message } if *target == connection => {
                Some(message.clone())
            },
            _ => None,
        })
        .collect()
}

/// Pair two identified connections in a zone, returning their ids.
fn paired(driver: &mut RelayDriver<VirtualEnv>) -> (ConnectionId, ConnectionId) {
    let a = open(driver, 1);
    let b = open(driver, 2);
    join(driver, a, "idX");
    join(driver, b, "idY");
    assert_eq!(driver.room_count(), 1);
    (a, b)
}

#[test]
fn one_sided_intent_waits() {
    let env = VirtualEnv::new();
    let mut driver = driver(&env);
    let a = open(&mut driver, 1);
    let b = open(&mut driver, 2);
    join(&mut driver, a, "idX");
    join(&mut driver, b, "idY");
    // Fresh identities with no shared history
    let c = open(&mut driver, 3);
    let actions = reconnect(&mut driver, c, "idC", "idD");

    assert_eq!(sent_to(&actions, c), vec![ServerMessage::Waiting]);
    assert_eq!(driver.room_of(c), None);
    assert_eq!(
        driver.reconnect_target(&Identity::from("idC")).map(Identity::as_str),
        Some("idD")
    );
}

#[test]
fn mutual_intent_completes_with_second_caller_initiating() {
    let env = VirtualEnv::new();
    let mut driver = driver(&env);
    let a = open(&mut driver, 1);
    let b = open(&mut driver, 2);

    let actions = reconnect(&mut driver, a, "idX", "idY");
    assert_eq!(sent_to(&actions, a), vec![ServerMessage::Waiting]);

    let actions = reconnect(&mut driver, b, "idY", "idX");

    let to_b = sent_to(&actions, b);
    let ServerMessage::ReconnectReady { is_initiator, room_id, peer_connection_id, peer_identity } =
        &to_b[0]
    else {
        panic!("expected reconnect-ready to the completing caller, got {:?}", to_b[0]);
    };
    assert!(*is_initiator, "the call that completes the handshake initiates");
    assert_eq!(*peer_connection_id, a);
    assert_eq!(peer_identity.as_str(), "idX");
    assert!(room_id.as_str().starts_with("reconnect_"));

    let to_a = sent_to(&actions, a);
    assert!(matches!(
        &to_a[0],
        ServerMessage::ReconnectReady { is_initiator: false, peer_connection_id, .. }
            if *peer_connection_id == b
    ));

    // Consumed intents do not linger
    assert_eq!(driver.reconnect_target(&Identity::from("idX")), None);
    assert_eq!(driver.reconnect_target(&Identity::from("idY")), None);
    assert_eq!(driver.room_of(a), driver.room_of(b));
}

#[test]
fn room_teardown_pre_seeds_both_intents() {
    let env = VirtualEnv::new();
    let mut driver = driver(&env);
    let (a, b) = paired(&mut driver);

    let actions = close(&mut driver, a);

    let to_b = sent_to(&actions, b);
    assert!(matches!(
        &to_b[0],
        ServerMessage::UserDisconnected { departed_identity: Some(id) } if id.as_str() == "idX"
    ));
    assert_eq!(driver.room_count(), 0);

    // Both directions were stored, so either side can come back first
    assert_eq!(
        driver.reconnect_target(&Identity::from("idX")).map(Identity::as_str),
        Some("idY")
    );
    assert_eq!(
        driver.reconnect_target(&Identity::from("idY")).map(Identity::as_str),
        Some("idX")
    );
}

#[test]
fn survivor_reconnects_then_dropped_peer_returns() {
    let env = VirtualEnv::new();
    let mut driver = driver(&env);
    let (a, b) = paired(&mut driver);
    close(&mut driver, a);

    // Survivor asks first: intent is mutual (pre-seeded) but idX is
    // offline, so the attempt is counted and the survivor waits.
    let actions = reconnect(&mut driver, b, "idY", "idX");
    assert_eq!(sent_to(&actions, b), vec![ServerMessage::Waiting]);
    assert_eq!(driver.reconnect_attempts(&Identity::from("idY")), 1);

    // The dropped side returns on a fresh connection and asks back.
    let a2 = open(&mut driver, 9);
    let actions = reconnect(&mut driver, a2, "idX", "idY");

    assert!(matches!(
        &sent_to(&actions, a2)[0],
        ServerMessage::ReconnectReady { is_initiator: true, peer_connection_id, .. }
            if *peer_connection_id == b
    ));
    assert!(matches!(
        &sent_to(&actions, b)[0],
        ServerMessage::ReconnectReady { is_initiator: false, peer_connection_id, peer_identity, .. }
            if *peer_connection_id == a2 && peer_identity.as_str() == "idX"
    ));
    assert_eq!(driver.room_of(a2), driver.room_of(b));
}

#[test]
fn repeated_attempts_against_offline_peer_are_counted() {
    let env = VirtualEnv::new();
    let mut driver = driver(&env);
    let (a, b) = paired(&mut driver);
    close(&mut driver, a);

    for expected in 1..=3 {
        reconnect(&mut driver, b, "idY", "idX");
        assert_eq!(driver.reconnect_attempts(&Identity::from("idY")), expected);
    }
}

#[test]
fn busy_peer_is_never_pulled_out_of_its_room() {
    let env = VirtualEnv::new();
    let mut driver = driver(&env);
    let (a, b) = paired(&mut driver);
    close(&mut driver, a);

    // The survivor moves on and pairs with an anonymous stranger, so its
    // stored intent toward idX stays untouched.
    let c = open(&mut driver, 3);
    join(&mut driver, b, "idY");
    driver
        .process_event(RelayEvent::RequestReceived {
            connection: c,
            request: ClientRequest::Join {
                match_key: MatchKey::Zone { name: "z".into() },
                identity: None,
            },
        })
        .unwrap();
    assert!(driver.room_of(b).is_some());

    // The dropped side comes back: intent is mutual (pre-seeded both
    // ways at teardown) but idY is mid-session.
    let a2 = open(&mut driver, 9);
    let actions = reconnect(&mut driver, a2, "idX", "idY");

    assert_eq!(sent_to(&actions, a2), vec![ServerMessage::Waiting]);
    assert_eq!(sent_to(&actions, b), Vec::new());
    assert!(driver.room_of(a2).is_none());
}

#[test]
fn completing_reconnect_pulls_the_peer_out_of_waiting_queues() {
    let env = VirtualEnv::new();
    let mut driver = driver(&env);
    let (a, b) = paired(&mut driver);
    close(&mut driver, a);

    // The survivor queues for a fresh match while its stored intent
    // toward idX is still resident.
    join(&mut driver, b, "idY");
    assert!(driver.is_waiting(b));

    // The dropped side returns and completes the pre-seeded handshake.
    let a2 = open(&mut driver, 9);
    let actions = reconnect(&mut driver, a2, "idX", "idY");

    assert!(matches!(
        &sent_to(&actions, b)[0],
        ServerMessage::ReconnectReady { is_initiator: false, .. }
    ));
    assert_eq!(driver.room_of(a2), driver.room_of(b));
    assert!(!driver.is_waiting(b), "a roomed connection must hold no queue entry");
    assert_eq!(driver.room_count(), 1);

    // A later joiner under the abandoned key waits instead of popping the
    // reunited peer into a second room.
    let c = open(&mut driver, 3);
    let actions = driver
        .process_event(RelayEvent::RequestReceived {
            connection: c,
            request: ClientRequest::Join {
                match_key: MatchKey::Zone { name: "z".into() },
                identity: None,
            },
        })
        .unwrap();

    assert_eq!(sent_to(&actions, c), vec![ServerMessage::Waiting]);
    assert_eq!(driver.room_count(), 1);
}

#[test]
fn self_targeted_intent_only_waits() {
    let env = VirtualEnv::new();
    let mut driver = driver(&env);
    let a = open(&mut driver, 1);

    let actions = reconnect(&mut driver, a, "idX", "idX");

    assert_eq!(sent_to(&actions, a), vec![ServerMessage::Waiting]);
    assert_eq!(driver.room_count(), 0);
}

#[test]
fn leave_reconnect_withdraws_intent() {
    let env = VirtualEnv::new();
    let mut driver = driver(&env);
    let a = open(&mut driver, 1);
    let b = open(&mut driver, 2);

    reconnect(&mut driver, a, "idX", "idY");
    assert!(driver.reconnect_target(&Identity::from("idX")).is_some());

    driver
        .process_event(RelayEvent::RequestReceived {
            connection: a,
            request: ClientRequest::LeaveReconnect,
        })
        .unwrap();
    assert_eq!(driver.reconnect_target(&Identity::from("idX")), None);

    // The other side asking now finds no mutual intent
    let actions = reconnect(&mut driver, b, "idY", "idX");
    assert_eq!(sent_to(&actions, b), vec![ServerMessage::Waiting]);
}

#[test]
fn disconnect_keeps_intent_but_resets_attempts() {
    let env = VirtualEnv::new();
    let mut driver = driver(&env);
    let (a, b) = paired(&mut driver);
    close(&mut driver, a);

    reconnect(&mut driver, b, "idY", "idX");
    reconnect(&mut driver, b, "idY", "idX");
    assert_eq!(driver.reconnect_attempts(&Identity::from("idY")), 2);

    close(&mut driver, b);

    assert_eq!(driver.reconnect_attempts(&Identity::from("idY")), 0);
    assert_eq!(
        driver.reconnect_target(&Identity::from("idY")).map(Identity::as_str),
        Some("idX")
    );
}

#[test]
fn sweep_expires_intents_past_the_grace_period() {
    let env = VirtualEnv::new();
    let mut driver = driver(&env);
    let a = open(&mut driver, 1);
    let b = open(&mut driver, 2);

    reconnect(&mut driver, a, "idX", "idY");

    env.advance(Duration::from_secs(200));
    reconnect(&mut driver, b, "idB", "idC");

    // Only the older intent crosses the default 300s grace line.
    env.advance(Duration::from_secs(150));
    driver.process_event(RelayEvent::Tick).unwrap();

    assert_eq!(driver.reconnect_target(&Identity::from("idX")), None);
    assert_eq!(
        driver.reconnect_target(&Identity::from("idB")).map(Identity::as_str),
        Some("idC")
    );

    // An expired intent no longer satisfies the mutual check
    let actions = reconnect(&mut driver, b, "idY", "idX");
    assert_eq!(sent_to(&actions, b), vec![ServerMessage::Waiting]);
}

#[test]
fn reconnect_while_in_a_room_leaves_it_first() {
    let env = VirtualEnv::new();
    let mut driver = driver(&env);
    let (a, b) = paired(&mut driver);

    // idX abandons the live room to chase a different identity.
    let actions = reconnect(&mut driver, a, "idX", "idQ");

    assert!(matches!(
        &sent_to(&actions, b)[0],
        ServerMessage::UserDisconnected { departed_identity: Some(id) } if id.as_str() == "idX"
    ));
    assert_eq!(driver.room_count(), 0);
    assert_eq!(sent_to(&actions, a), vec![ServerMessage::Waiting]);
}
