//! The presence loop on real tokio tasks
//!
//! Time is paused, so interval ticks fire as soon as every task is idle.
//! Timestamps still come from the wall clock, which barely moves meanwhile.

use std::sync::Arc;
use std::time::Duration;

use pearchat_core::{
    ChatConfig, ChatEvent, ChatService, EventKind, EventStream, MemoryStore, SystemClock,
    TokioScheduler,
};
use tokio::time::timeout;

fn participant(store: &MemoryStore) -> ChatService {
    ChatService::new(
        Arc::new(store.clone()),
        Arc::new(TokioScheduler::current().unwrap()),
        Arc::new(SystemClock),
        ChatConfig::default(),
    )
}

async fn next_matching(
    events: &mut EventStream,
    mut wanted: impl FnMut(&ChatEvent) -> bool,
) -> ChatEvent {
    timeout(Duration::from_secs(30), async {
        loop {
            let event = events.recv().await.expect("event bus closed");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test(start_paused = true)]
async fn test_peers_and_messages_flow_on_tokio() {
    let store = MemoryStore::new();
    let alice = participant(&store);
    let bob = participant(&store);
    let mut alice_events = alice.subscribe_to(&[
        EventKind::PeerConnected,
        EventKind::PeerDisconnected,
        EventKind::MessageReceived,
    ]);

    alice.join_room("lobby");
    bob.join_room("lobby");
    let bob_id = bob.identity().unwrap().to_string();

    let event = next_matching(&mut alice_events, |e| {
        matches!(e, ChatEvent::PeerConnected { .. })
    })
    .await;
    assert_eq!(event, ChatEvent::PeerConnected { peer_id: bob_id.clone() });
    assert_eq!(alice.peer_count(), 1);

    let sent = bob.send_message("lobby", "hello from bob").unwrap();
    let event = next_matching(&mut alice_events, |e| {
        matches!(e, ChatEvent::MessageReceived(_))
    })
    .await;
    assert_eq!(event, ChatEvent::MessageReceived(sent));

    bob.leave_room();
    let event = next_matching(&mut alice_events, |e| {
        matches!(e, ChatEvent::PeerDisconnected { .. })
    })
    .await;
    assert_eq!(event, ChatEvent::PeerDisconnected { peer_id: bob_id });

    alice.destroy();
    assert_eq!(alice_events.recv().await, None);
}
