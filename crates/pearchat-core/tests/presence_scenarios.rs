//! End-to-end presence and message sync scenarios
//!
//! Several participants share one in-memory store and one virtual-time
//! scheduler. Times in comments are milliseconds after the start `T0`.

use std::sync::Arc;
use std::time::Duration;

use pearchat_core::{
    ChatConfig, ChatEvent, ChatService, Conversation, DeliveryMode, EventKind, EventStream,
    ManualClock, ManualScheduler, MemoryStore, PeerRecord, PresenceTables, RoomId,
};

const T0: i64 = 1_700_000_000_000;

const PEER_EVENTS: &[EventKind] = &[
    EventKind::PeerConnected,
    EventKind::PeerDisconnected,
    EventKind::PeerCountChanged,
];

// ============================================================================
// Harness
// ============================================================================

struct Network {
    store: MemoryStore,
    scheduler: ManualScheduler,
}

impl Network {
    fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            scheduler: ManualScheduler::new(ManualClock::new(T0)),
        }
    }

    fn participant(&self) -> ChatService {
        self.participant_with(ChatConfig::default())
    }

    fn participant_with(&self, config: ChatConfig) -> ChatService {
        ChatService::new(
            Arc::new(self.store.clone()),
            Arc::new(self.scheduler.clone()),
            Arc::new(self.scheduler.clock().clone()),
            config,
        )
    }

    fn tables(&self) -> PresenceTables {
        PresenceTables::new(Arc::new(self.store.clone()))
    }

    fn advance_ms(&self, ms: u64) {
        self.scheduler.advance(Duration::from_millis(ms));
    }

    /// Milliseconds since T0.
    fn elapsed(&self) -> i64 {
        use pearchat_core::Clock;
        self.scheduler.clock().now_ms() - T0
    }
}

fn connected(id: &str) -> ChatEvent {
    ChatEvent::PeerConnected {
        peer_id: id.to_string(),
    }
}

fn disconnected(id: &str) -> ChatEvent {
    ChatEvent::PeerDisconnected {
        peer_id: id.to_string(),
    }
}

fn count(count: usize) -> ChatEvent {
    ChatEvent::PeerCountChanged { count }
}

fn received(stream: &mut EventStream) -> Vec<pearchat_core::Message> {
    stream
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            ChatEvent::MessageReceived(message) => Some(message),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Scenarios
// ============================================================================

/// A alone in a room sees no peers, and its own live record does not count.
#[test]
fn test_lone_participant_counts_zero_peers() {
    let net = Network::new();
    let a = net.participant();
    let mut events = a.subscribe();

    a.join_room("r1");
    let me = a.identity().unwrap();

    assert_eq!(a.peer_count(), 0);
    assert!(net.tables().get_peers().contains_key(me.as_str()));
    assert_eq!(
        events.drain(),
        vec![
            ChatEvent::Ready {
                identity: me.clone()
            },
            ChatEvent::RoomJoined {
                room_id: RoomId::from("r1"),
                message_count: 0
            },
        ]
    );

    net.advance_ms(5000);
    assert_eq!(a.peer_count(), 0);
    assert!(events.drain().is_empty());
}

/// A and B join at T0; A reports B within its next scan and never flaps
/// while B keeps heartbeating.
#[test]
fn test_peers_discover_each_other() {
    let net = Network::new();
    let a = net.participant();
    let b = net.participant();
    let mut a_events = a.subscribe_to(PEER_EVENTS);
    let mut b_events = b.subscribe_to(PEER_EVENTS);

    a.join_room("r1");
    b.join_room("r1");
    let a_id = a.identity().unwrap();
    let b_id = b.identity().unwrap();

    // B's join-time scan already sees A
    assert_eq!(b_events.drain(), vec![count(1), connected(a_id.as_str())]);

    net.advance_ms(600);
    assert_eq!(a_events.drain(), vec![count(1), connected(b_id.as_str())]);
    assert_eq!(a.peer_count(), 1);
    assert_eq!(b.peer_count(), 1);

    // Repeated heartbeats are idempotent
    net.advance_ms(10_000);
    assert!(a_events.drain().is_empty());
    assert!(b_events.drain().is_empty());
}

/// B stops heartbeating at 1000; A reports the disconnect exactly once, at
/// 4000, and not before.
#[test]
fn test_silent_peer_times_out_exactly_once() {
    let net = Network::new();
    let a = net.participant();
    let b = net.participant();
    a.join_room("r1");
    b.join_room("r1");
    let b_id = b.identity().unwrap().to_string();

    net.advance_ms(1000);
    assert_eq!(net.tables().get_peers()[&b_id].last_seen, T0 + 1000);
    let mut a_events = a.subscribe_to(PEER_EVENTS);
    drop(b);

    net.advance_ms(2999);
    assert!(a_events.drain().is_empty());
    assert_eq!(a.peer_count(), 1);

    net.advance_ms(1);
    assert_eq!(net.elapsed(), 4000);
    assert_eq!(a_events.drain(), vec![count(0), disconnected(&b_id)]);
    assert_eq!(a.peer_count(), 0);

    // Garbage collection of the record later is not a second disconnect
    net.advance_ms(10_000);
    assert!(!net.tables().get_peers().contains_key(&b_id));
    assert!(a_events.drain().is_empty());
}

/// After the collector deleted a record, a fresh heartbeat for the same id
/// looks exactly like a first join.
#[test]
fn test_reconnect_after_expiry() {
    let net = Network::new();
    let a = net.participant();
    let b = net.participant();
    a.join_room("r1");
    b.join_room("r1");
    let b_id = b.identity().unwrap().to_string();
    drop(b);

    net.advance_ms(10_000);
    assert!(!net.tables().get_peers().contains_key(&b_id));

    let mut a_events = a.subscribe_to(PEER_EVENTS);
    let now = T0 + net.elapsed();
    net.tables().upsert_peer(PeerRecord::new(b_id.clone(), now, "r1"));
    net.advance_ms(0);

    assert_eq!(a_events.drain(), vec![count(1), connected(&b_id)]);
}

/// A message sent at 2000 is surfaced to B while fresh and not at 4500.
#[test]
fn test_fresh_message_is_delivered_then_ages_out() {
    let net = Network::new();
    let a = net.participant();
    let b = net.participant();
    a.join_room("r1");
    b.join_room("r1");
    let mut a_events = a.subscribe_to(&[EventKind::MessageReceived]);
    let mut b_events = b.subscribe_to(&[EventKind::MessageReceived]);

    net.advance_ms(2000);
    let sent = a.send_message("r1", "hi").unwrap();
    assert_eq!(sent.timestamp, T0 + 2000);
    assert_eq!(sent.chat_id, "r1");

    net.advance_ms(1999);
    let delivered = received(&mut b_events);
    assert!(!delivered.is_empty());
    assert!(delivered.iter().all(|m| *m == sent));

    net.advance_ms(501);
    assert_eq!(net.elapsed(), 4500);
    assert!(received(&mut b_events).is_empty());
    assert_eq!(b.messages(&RoomId::from("r1")), vec![sent]);

    // Own messages are never delivered back
    assert!(received(&mut a_events).is_empty());
}

/// Participants in different rooms never see each other or each other's
/// messages.
#[test]
fn test_rooms_are_isolated() {
    let net = Network::new();
    let a = net.participant();
    let b = net.participant();
    let mut a_events = a.subscribe();

    a.join_room("r1");
    b.join_room("r2");
    b.send_message("r2", "only for r2");
    net.advance_ms(10_000);

    assert_eq!(a.peer_count(), 0);
    assert_eq!(b.peer_count(), 0);
    assert!(a.messages(&RoomId::from("r1")).is_empty());
    assert_eq!(b.messages(&RoomId::from("r2")).len(), 1);
    assert!(a_events.drain().iter().all(|e| !matches!(
        e,
        ChatEvent::PeerConnected { .. }
            | ChatEvent::PeerCountChanged { .. }
            | ChatEvent::MessageReceived(_)
    )));
}

// ============================================================================
// Room membership
// ============================================================================

#[test]
fn test_switching_rooms_moves_presence() {
    let net = Network::new();
    let a = net.participant();
    let b = net.participant();
    a.join_room("r1");
    b.join_room("r1");
    net.advance_ms(500);
    let a_id = a.identity().unwrap().to_string();
    let b_id = b.identity().unwrap().to_string();

    let mut a_events = a.subscribe_to(PEER_EVENTS);
    let mut b_events = b.subscribe_to(PEER_EVENTS);
    b.join_room("r2");

    // B's record now says r2, and B no longer counts A
    assert_eq!(net.tables().get_peers()[&b_id].room, "r2");
    assert_eq!(b_events.drain(), vec![count(0), disconnected(&a_id)]);

    net.advance_ms(0);
    assert_eq!(a_events.drain(), vec![count(0), disconnected(&b_id)]);
    assert_eq!(a.current_room(), Some(RoomId::from("r1")));
    assert_eq!(b.current_room(), Some(RoomId::from("r2")));
}

#[test]
fn test_leaving_is_seen_immediately() {
    let net = Network::new();
    let a = net.participant();
    let b = net.participant();
    a.join_room("r1");
    b.join_room("r1");
    net.advance_ms(500);
    let b_id = b.identity().unwrap().to_string();
    let mut a_events = a.subscribe_to(PEER_EVENTS);

    assert_eq!(b.leave_room(), Some(RoomId::from("r1")));
    net.advance_ms(0);

    assert_eq!(a_events.drain(), vec![count(0), disconnected(&b_id)]);
    assert!(b.send_message("r1", "gone").is_none());
}

#[test]
fn test_join_returns_history_in_append_order() {
    let net = Network::new();
    let a = net.participant();
    a.join_room("r1");

    let mut sent = Vec::new();
    for i in 0..5 {
        sent.push(a.send_message("r1", format!("message {}", i)).unwrap());
        net.advance_ms(137);
    }

    let b = net.participant();
    let join = b.join_room("r1");
    assert_eq!(join.messages, sent);
    assert!(join
        .messages
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp));
}

// ============================================================================
// Properties
// ============================================================================

/// Every count event matches the live filter at the moment it is emitted.
#[test]
fn test_count_events_match_live_filter() {
    let net = Network::new();
    let a = net.participant();
    let mut a_events = a.subscribe_to(&[EventKind::PeerCountChanged]);
    a.join_room("r1");

    let mut others: Vec<ChatService> = Vec::new();
    let mut last_count = 0;
    let mut check = |a: &ChatService, events: &mut EventStream| {
        for event in events.drain() {
            if let ChatEvent::PeerCountChanged { count } = event {
                last_count = count;
            }
        }
        assert_eq!(last_count, a.peer_count());
    };

    for _ in 0..3 {
        let peer = net.participant();
        peer.join_room("r1");
        others.push(peer);
        net.advance_ms(500);
        check(&a, &mut a_events);
    }

    others[0].leave_room();
    net.advance_ms(500);
    check(&a, &mut a_events);

    others.remove(1);
    for _ in 0..10 {
        net.advance_ms(500);
        check(&a, &mut a_events);
    }

    others[1].join_room("elsewhere");
    net.advance_ms(500);
    check(&a, &mut a_events);
    assert_eq!(a.peer_count(), 0);
}

/// A consumer deduplicating by id ends up with exactly the stored log.
#[test]
fn test_consumer_dedup_matches_log() {
    let net = Network::new();
    let a = net.participant();
    let b = net.participant();
    a.join_room("r1");
    let join = b.join_room("r1");
    let mut b_events = b.subscribe_to(&[EventKind::MessageReceived]);

    let mut conversation = Conversation::new(join.room_id.clone());
    conversation.merge(join.messages);

    for i in 0..6 {
        a.send_message("r1", format!("m{}", i));
        net.advance_ms(300);
        conversation.merge(received(&mut b_events));
    }
    net.advance_ms(3000);
    conversation.merge(received(&mut b_events));

    let log = b.messages(&RoomId::from("r1"));
    let ids: Vec<_> = conversation.messages().iter().map(|m| m.id.clone()).collect();
    let log_ids: Vec<_> = log.iter().map(|m| m.id.clone()).collect();
    assert_eq!(ids, log_ids);
}

// ============================================================================
// Delivery modes
// ============================================================================

/// A poll delayed past the freshness window misses the message; cursor
/// delivery still surfaces it exactly once.
#[test]
fn test_cursor_delivery_survives_slow_polling() {
    let net = Network::new();
    let slow = |mode: DeliveryMode| {
        ChatConfig {
            poll_interval_ms: 5000,
            ..ChatConfig::default()
        }
        .with_delivery_mode(mode)
        .with_store_reactions(false)
    };

    let a = net.participant();
    let windowed = net.participant_with(slow(DeliveryMode::FreshnessWindow));
    let cursor = net.participant_with(slow(DeliveryMode::Cursor));
    a.join_room("r1");
    windowed.join_room("r1");
    cursor.join_room("r1");
    let mut windowed_events = windowed.subscribe_to(&[EventKind::MessageReceived]);
    let mut cursor_events = cursor.subscribe_to(&[EventKind::MessageReceived]);

    net.advance_ms(100);
    let sent = a.send_message("r1", "are you there?").unwrap();
    net.advance_ms(20_000);

    assert!(received(&mut windowed_events).is_empty());
    assert_eq!(received(&mut cursor_events), vec![sent]);
}

#[test]
fn test_cursor_delivery_skips_history() {
    let net = Network::new();
    let a = net.participant();
    a.join_room("r1");
    let old = a.send_message("r1", "before").unwrap();

    let b = net.participant_with(ChatConfig::default().with_delivery_mode(DeliveryMode::Cursor));
    let join = b.join_room("r1");
    let mut b_events = b.subscribe_to(&[EventKind::MessageReceived]);
    assert_eq!(join.messages, vec![old]);

    let new = a.send_message("r1", "after").unwrap();
    net.advance_ms(5000);
    assert_eq!(received(&mut b_events), vec![new]);
}
