//! Chat service: one participant in the shared-store chat
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ChatService                                                    │
//! │  ├── tables: PresenceTables (peers + messages on SharedStore)   │
//! │  ├── scheduler: heartbeat / scan+gc / poll / store watcher      │
//! │  ├── clock: timestamps for records and messages                 │
//! │  ├── events: EventBus -> EventStream per subscriber             │
//! │  └── state (Mutex)                                              │
//! │      ├── identity, profile, current room                        │
//! │      ├── LivenessScanner (previous live set)                    │
//! │      ├── MessagePoller (per-room cursors)                       │
//! │      └── running TaskHandles                                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every tick takes the state lock for one short synchronous section
//! covering its store reads, its writes, and its emits. Scheduler calls are
//! made with the lock released.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::chat::Message;
use crate::clock::Clock;
use crate::config::ChatConfig;
use crate::events::{ChatEvent, EventBus, EventKind, EventStream};
use crate::presence::{collect_expired, heartbeat_record, live_peers, LivenessScanner, MessagePoller};
use crate::scheduler::{Scheduler, TaskHandle};
use crate::storage::{PresenceTables, SharedStore, StoreChange};
use crate::types::{Identity, RoomId, UserProfile};

/// Result of joining a room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomJoin {
    pub room_id: RoomId,
    /// Stored history in append order
    pub messages: Vec<Message>,
}

struct State {
    profile: Option<UserProfile>,
    current_room: Option<RoomId>,
    scanner: LivenessScanner,
    poller: MessagePoller,
    tasks: Vec<TaskHandle>,
    destroyed: bool,
}

impl State {
    fn identity(&self) -> Option<&Identity> {
        self.profile.as_ref().map(|p| &p.identity)
    }

    /// Identity and room, if the participant is in a room.
    fn session(&self) -> Option<(Identity, RoomId)> {
        Some((self.identity()?.clone(), self.current_room.clone()?))
    }
}

struct Shared {
    tables: PresenceTables,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    config: ChatConfig,
    events: EventBus,
    state: Mutex<State>,
}

/// A chat participant.
///
/// Construct one per participant and pass it by reference; there is no
/// process-wide instance. Several services sharing one [`SharedStore`] see
/// each other as peers.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(MemoryStore::new());
/// let scheduler = Arc::new(TokioScheduler::current().unwrap());
/// let service = ChatService::new(store, scheduler, Arc::new(SystemClock), ChatConfig::default());
///
/// let mut events = service.subscribe();
/// let join = service.join_room("lobby");
/// service.send_message("lobby", "hello");
/// while let Some(event) = events.recv().await {
///     println!("{}", event);
/// }
/// ```
pub struct ChatService {
    shared: Arc<Shared>,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn SharedStore>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
        config: ChatConfig,
    ) -> Self {
        let tables = PresenceTables::with_keys(
            store,
            config.peers_key.clone(),
            config.messages_key.clone(),
        );
        let state = State {
            profile: None,
            current_room: None,
            scanner: LivenessScanner::new(config.liveness_timeout()),
            poller: MessagePoller::new(config.delivery_mode, config.message_freshness()),
            tasks: Vec::new(),
            destroyed: false,
        };

        Self {
            shared: Arc::new(Shared {
                tables,
                scheduler,
                clock,
                config,
                events: EventBus::default(),
                state: Mutex::new(state),
            }),
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.shared.config
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Generate the identity and announce `ready`.
    ///
    /// Also evicts stored messages older than the retention window. Calling
    /// it again returns the existing identity and emits nothing.
    pub fn initialize(&self) -> Identity {
        let now = self.shared.clock.now_ms();
        let identity = {
            let mut state = self.shared.state.lock();
            if let Some(identity) = state.identity() {
                return identity.clone();
            }
            let identity = Identity::generate(now);
            state.profile = Some(UserProfile::new(
                identity.clone(),
                self.shared.config.display_name.clone(),
                now,
            ));
            identity
        };

        let evicted = self
            .shared
            .tables
            .evict_expired_messages(now, self.shared.config.message_retention());
        info!(identity = identity.short(), evicted, "Chat service initialized");

        self.shared.events.emit(ChatEvent::Ready {
            identity: identity.clone(),
        });
        identity
    }

    pub fn is_ready(&self) -> bool {
        self.shared.state.lock().profile.is_some()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.shared.state.lock().identity().cloned()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.shared.state.lock().profile.clone()
    }

    /// Change the name attached to messages sent from now on.
    pub fn set_display_name(&self, name: impl Into<String>) -> Option<UserProfile> {
        let now = self.shared.clock.now_ms();
        let mut state = self.shared.state.lock();
        let profile = state.profile.as_mut()?;
        profile.display_name = name.into();
        profile.updated_at = now;
        Some(profile.clone())
    }

    pub fn current_room(&self) -> Option<RoomId> {
        self.shared.state.lock().current_room.clone()
    }

    /// Switch into `room`, publish presence, and return its history.
    ///
    /// Initializes the service if needed. Presence is published and peers
    /// are scanned before this returns, so already-live peers are reported
    /// without waiting for a tick. The periodic tasks start on the first
    /// join and keep running across room switches.
    pub fn join_room(&self, room: impl Into<RoomId>) -> RoomJoin {
        let room_id = room.into();
        if self.shared.state.lock().destroyed {
            warn!(%room_id, "Join ignored, service destroyed");
            return RoomJoin {
                room_id,
                messages: Vec::new(),
            };
        }

        self.initialize();
        let messages = self.shared.tables.get_messages(&room_id);
        {
            let mut state = self.shared.state.lock();
            if let Some(previous) = state.current_room.replace(room_id.clone()) {
                if previous != room_id {
                    debug!(from = %previous, to = %room_id, "Switching rooms");
                }
            }
            state.poller.reset_cursor(&room_id, messages.len());
        }

        info!(%room_id, message_count = messages.len(), "Joined room");
        self.shared.events.emit(ChatEvent::RoomJoined {
            room_id: room_id.clone(),
            message_count: messages.len(),
        });

        self.shared.heartbeat();
        self.shared.scan(false);
        self.start_tasks();

        RoomJoin { room_id, messages }
    }

    /// Generate a room id and join it.
    pub fn create_room(&self) -> RoomJoin {
        let room_id = RoomId::generate(self.shared.clock.now_ms());
        self.join_room(room_id)
    }

    /// Leave the current room.
    ///
    /// Stops every periodic task and watcher, reports each live peer as
    /// disconnected, and deletes the local peer record so others see the
    /// departure on their next scan. Returns the room left, if any.
    pub fn leave_room(&self) -> Option<RoomId> {
        let (identity, room_id, departures, tasks) = {
            let mut state = self.shared.state.lock();
            let room_id = state.current_room.take()?;
            let departures = state.scanner.forget_all();
            let tasks = std::mem::take(&mut state.tasks);
            (state.identity().cloned(), room_id, departures, tasks)
        };
        drop(tasks);

        if let Some(identity) = identity {
            self.shared.tables.remove_peer(identity.as_str());
        }

        for event in departures {
            self.shared.events.emit(event);
        }
        info!(%room_id, "Left room");
        self.shared.events.emit(ChatEvent::RoomLeft {
            room_id: room_id.clone(),
        });
        Some(room_id)
    }

    /// Leave the room and close the event bus.
    ///
    /// A destroyed service emits nothing further and ignores later joins.
    pub fn destroy(&self) {
        self.leave_room();
        let tasks = {
            let mut state = self.shared.state.lock();
            state.destroyed = true;
            std::mem::take(&mut state.tasks)
        };
        drop(tasks);
        self.shared.events.close();
        debug!("Chat service destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.state.lock().destroyed
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Messages and peers
    // ═══════════════════════════════════════════════════════════════════════

    /// Append a message to `room` and return it for local echo.
    ///
    /// With no current room this is a no-op returning `None`. A failed store
    /// write is logged and the message is still returned.
    pub fn send_message(&self, room: impl Into<RoomId>, content: impl Into<String>) -> Option<Message> {
        let room_id = room.into();
        let (identity, author_name) = {
            let state = self.shared.state.lock();
            if state.current_room.is_none() {
                debug!(%room_id, "Send ignored, not in a room");
                return None;
            }
            let profile = state.profile.as_ref()?;
            (profile.identity.clone(), profile.display_name.clone())
        };

        let message = Message::text(
            &identity,
            author_name,
            &room_id,
            content,
            self.shared.clock.now_ms(),
        );
        if self.shared.tables.append_message(&room_id, &message) {
            debug!(%room_id, message_id = %message.id, "Message sent");
        }
        Some(message)
    }

    /// Stored history of `room` in append order.
    pub fn messages(&self, room: &RoomId) -> Vec<Message> {
        self.shared.tables.get_messages(room)
    }

    /// Live remote peers in the current room, read from the store now.
    pub fn peer_count(&self) -> usize {
        let Some((identity, room_id)) = self.shared.state.lock().session() else {
            return 0;
        };
        let peers = self.shared.tables.get_peers();
        live_peers(
            &peers,
            &identity,
            &room_id,
            self.shared.clock.now_ms(),
            self.shared.config.liveness_timeout(),
        )
        .len()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Events
    // ═══════════════════════════════════════════════════════════════════════

    pub fn subscribe(&self) -> EventStream {
        self.shared.events.subscribe()
    }

    pub fn subscribe_to(&self, kinds: &[EventKind]) -> EventStream {
        self.shared.events.subscribe_to(kinds)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Tasks
    // ═══════════════════════════════════════════════════════════════════════

    fn start_tasks(&self) {
        if !self.shared.state.lock().tasks.is_empty() {
            return;
        }

        let scheduler = self.shared.scheduler.clone();
        let config = &self.shared.config;
        let mut tasks = vec![
            scheduler.every(
                config.heartbeat_interval(),
                tick(&self.shared, |shared| shared.heartbeat()),
            ),
            scheduler.every(
                config.scan_interval(),
                tick(&self.shared, |shared| shared.scan(true)),
            ),
            scheduler.every(
                config.poll_interval(),
                tick(&self.shared, |shared| shared.poll()),
            ),
        ];

        if config.react_to_store_changes {
            let weak = Arc::downgrade(&self.shared);
            tasks.push(scheduler.watch(
                self.shared.tables.subscribe(),
                Box::new(move |change: StoreChange| {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_store_change(&change);
                    }
                }),
            ));
        }

        let extra = {
            let mut state = self.shared.state.lock();
            if state.tasks.is_empty() && state.current_room.is_some() {
                state.tasks = tasks;
                Vec::new()
            } else {
                tasks
            }
        };
        // Lost a race with another join or a leave
        drop(extra);
    }
}

/// Periodic callback holding only a weak reference to the service.
fn tick(shared: &Arc<Shared>, run: fn(&Shared)) -> crate::scheduler::Tick {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    Box::new(move || {
        if let Some(shared) = weak.upgrade() {
            run(&shared);
        }
    })
}

impl Shared {
    /// Overwrite the local peer record with a fresh timestamp.
    fn heartbeat(&self) {
        let state = self.state.lock();
        let Some((identity, room_id)) = state.session() else {
            return;
        };
        let record = heartbeat_record(&identity, &room_id, self.clock.now_ms());
        self.tables.upsert_peer(record);
    }

    /// Diff the live set and publish transitions; optionally collect garbage.
    fn scan(&self, collect_garbage: bool) {
        let mut state = self.state.lock();
        let Some((identity, room_id)) = state.session() else {
            return;
        };
        let now = self.clock.now_ms();
        let mut peers = self.tables.get_peers();

        for event in state.scanner.scan(&peers, &identity, &room_id, now) {
            self.events.emit(event);
        }

        if !collect_garbage {
            return;
        }
        let removed = collect_expired(
            &mut peers,
            &identity,
            now,
            self.config.own_record_expiry(),
            self.config.peer_record_expiry(),
        );
        if removed.is_empty() {
            return;
        }
        debug!(%room_id, removed = removed.len(), "Collected expired peer records");
        self.tables.put_peers(&peers);
        for event in state.scanner.forget(&removed) {
            self.events.emit(event);
        }
    }

    /// Surface messages by others in the current room.
    fn poll(&self) {
        let mut state = self.state.lock();
        let Some((identity, room_id)) = state.session() else {
            return;
        };
        let log = self.tables.get_messages(&room_id);
        let now = self.clock.now_ms();
        for message in state.poller.poll(&room_id, &log, &identity, now) {
            self.events.emit(ChatEvent::MessageReceived(message));
        }
    }

    fn on_store_change(&self, change: &StoreChange) {
        if change.key == self.tables.peers_key() {
            self.scan(false);
        } else if change.key == self.tables.messages_key() {
            self.poll();
        }
    }
}
