//! The state manager: spec §4.7's mediator and the concurrency model of §5.
//! Grounded on `include/matrix/core/state/state_manager.hpp` (the
//! `submit_event` workflow and the soft-fail distinction) and `tuwunel`'s
//! `service::rooms::state_cache` module for the "shard the write lock by
//! room, never hold it across a slow callback" discipline.

use std::{collections::HashMap, future::Future, sync::Arc};

use concord_events::{EventType, PduEvent};
use concord_identifiers::{EventId, RoomId, ServerName, UserId};
use concord_state_res::{
    auth_chain, auth_types_for_event, membership_of, resolve as resolve_state, Event, MembershipState, StateMap,
};
use serde_json::Value as JsonValue;
use tokio::sync::{broadcast, Mutex as AsyncMutex, RwLock};

use crate::{
    cache::{RoomSummary, StateCache},
    config::StateManagerConfig,
    error::{Error, Result},
    room_state::RoomState,
    storage::{Direction, RoomEventArena, StorageRepository},
};

/// Where a submitted event came from, per spec §4.7 step 2: client events
/// get their `auth_events` filled in by the manager; federation events
/// already carry theirs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Origin {
    Client,
    Federation { origin_server: ServerName },
}

/// `submit_event`'s three-way result (spec §4.7). Authorization and
/// soft-failure outcomes are reported here rather than through
/// [`Error`] — `Error` is reserved for failures outside this domain
/// (storage faults, a room that doesn't exist yet, a cancelled caller).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Acceptance {
    Accepted,
    Rejected { reason: String },
    SoftFailed { rule: &'static str },
}

/// Which state to read via [`StateManager::get_state`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum At {
    Current,
    Event(EventId),
}

/// A change record delivered to subscribers (spec §4.7's
/// `{event_applied, state_changed, membership_changed}`), plus a rejection
/// record for the propagation policy in §7 ("AuthFailed and SoftFailed are
/// returned to the caller but also emitted on the subscription stream").
#[derive(Clone, Debug)]
pub enum ChangeEvent {
    EventApplied { room_id: RoomId, event_id: EventId },
    StateChanged { room_id: RoomId, event_type: EventType, state_key: String, event_id: EventId },
    MembershipChanged { room_id: RoomId, user_id: UserId, membership: MembershipState },
    Rejected { room_id: RoomId, event_id: EventId, rule: &'static str, soft: bool },
}

/// A live handle on a [`ChangeEvent`] feed. Finite/lazy and cancellable by
/// simply dropping it (spec §5).
pub struct Subscription {
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    /// The next change, or `None` once this subscriber has fallen too far
    /// behind (spec §5's backpressure: "dropping subscribers that fall more
    /// than N events behind", `N` = the channel's configured capacity) or
    /// the manager has been dropped.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(_)) => return None,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// The subscription surface the core exposes (spec §6: "Subscription trait
/// (the core exposes)").
pub trait Subscriptions {
    fn subscribe(&self, room: &RoomId) -> Subscription;
    fn subscribe_user(&self, user: &UserId) -> Subscription;
}

/// The federation-facing surface the core exposes (spec §6): PDUs arrive
/// pre-signature-verified and funnel into the same `submit_event` path as
/// client-submitted events.
pub trait FederationIngest {
    fn accept_pdu(
        &self,
        pdu: PduEvent,
        origin_server: ServerName,
    ) -> impl Future<Output = Result<Acceptance>> + Send;
}

struct RoomLocks {
    locks: RwLock<HashMap<RoomId, Arc<AsyncMutex<()>>>>,
}

impl RoomLocks {
    fn new() -> Self {
        Self { locks: RwLock::new(HashMap::new()) }
    }

    async fn get(&self, room: &RoomId) -> Arc<AsyncMutex<()>> {
        if let Some(lock) = self.locks.read().await.get(room) {
            return Arc::clone(lock);
        }
        let mut locks = self.locks.write().await;
        Arc::clone(locks.entry(room.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))))
    }
}

/// The concurrency-safe façade over event/state: spec §4.7 and §5's "the
/// core is not single-threaded" model, one write lock per room.
pub struct StateManager<S: StorageRepository> {
    config: StateManagerConfig,
    cache: StateCache,
    storage: S,
    room_locks: RoomLocks,
    arenas: RwLock<HashMap<RoomId, RoomEventArena>>,
    timelines: RwLock<HashMap<RoomId, Vec<EventId>>>,
    room_channels: std::sync::Mutex<HashMap<RoomId, broadcast::Sender<ChangeEvent>>>,
    user_channels: std::sync::Mutex<HashMap<UserId, broadcast::Sender<ChangeEvent>>>,
}

impl<S: StorageRepository> StateManager<S> {
    pub fn new(config: StateManagerConfig, storage: S) -> Self {
        Self {
            cache: StateCache::new(config.cache),
            config,
            storage,
            room_locks: RoomLocks::new(),
            arenas: RwLock::new(HashMap::new()),
            timelines: RwLock::new(HashMap::new()),
            room_channels: std::sync::Mutex::new(HashMap::new()),
            user_channels: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn get_cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.get_cache_stats()
    }

    async fn arena_snapshot(&self, room: &RoomId) -> RoomEventArena {
        self.arenas.read().await.get(room).cloned().unwrap_or_default()
    }

    async fn insert_into_arena(&self, room: &RoomId, event: Arc<dyn Event>) {
        self.arenas.write().await.entry(room.clone()).or_default().insert(event.event_id().clone(), event);
    }

    async fn merge_into_arena(&self, room: &RoomId, found: impl IntoIterator<Item = (EventId, Arc<dyn Event>)>) {
        let mut arenas = self.arenas.write().await;
        let entry = arenas.entry(room.clone()).or_default();
        for (id, event) in found {
            entry.entry(id).or_insert(event);
        }
    }

    /// The room's current snapshot as ids (spec §4.7: "at-time-now is
    /// O(1)" on a cache hit).
    async fn current_ids(&self, room: &RoomId) -> Result<StateMap<EventId>> {
        if let Some(entry) = self.cache.get(room) {
            return Ok(entry.snapshot.entries().clone());
        }
        self.storage
            .load_state_snapshot(room, None)
            .await?
            .ok_or_else(|| Error::UnknownRoom(room.to_string()))
    }

    /// The room's current snapshot resolved to events, backfilling the
    /// in-memory arena from storage as needed.
    async fn current_state_map(&self, room: &RoomId) -> Result<StateMap<Arc<dyn Event>>> {
        let ids = self.current_ids(room).await?;
        self.resolve_ids(room, ids.values().cloned().collect::<Vec<_>>()).await?;
        let arena = self.arena_snapshot(room).await;
        Ok(ids
            .into_iter()
            .filter_map(|(key, id)| arena.get(&id).map(|e| (key, Arc::clone(e))))
            .collect())
    }

    /// Ensures every id in `ids` is present in the room's arena, fetching
    /// from storage (and falling back to bounded backfill) for any that
    /// aren't. Returns the ids that remain unresolved after all that.
    async fn resolve_ids(&self, room: &RoomId, ids: Vec<EventId>) -> Result<Vec<EventId>> {
        let arena = self.arena_snapshot(room).await;
        let mut missing: Vec<EventId> = ids.into_iter().filter(|id| !arena.contains_key(id)).collect();
        if missing.is_empty() {
            return Ok(missing);
        }

        let mut found = Vec::new();
        for id in &missing {
            if let Some(pdu) = self.storage.get_event(room, id).await? {
                let arc: Arc<dyn Event> = Arc::new(pdu);
                found.push((id.clone(), arc));
            }
        }
        self.merge_into_arena(room, found).await;

        let arena = self.arena_snapshot(room).await;
        missing.retain(|id| !arena.contains_key(id));

        for id in &missing {
            let _ = self.resolve_missing(room, id, self.config.max_backfill_depth).await;
        }

        let arena = self.arena_snapshot(room).await;
        missing.retain(|id| !arena.contains_key(id));
        Ok(missing)
    }

    fn declared_auth_view(&self, event: &PduEvent, arena: &RoomEventArena) -> StateMap<Arc<dyn Event>> {
        event
            .auth_events
            .iter()
            .filter_map(|id| arena.get(id))
            .filter_map(|e| e.state_key().map(|key| ((e.event_type().clone(), key.to_owned()), Arc::clone(e))))
            .collect()
    }

    async fn redacted_event_sender(&self, event: &PduEvent, arena: &RoomEventArena) -> Result<Option<UserId>> {
        if event.event_type.as_str() != EventType::ROOM_REDACTION {
            return Ok(None);
        }
        let Some(target) = &event.redacts else { return Ok(None) };
        if let Some(e) = arena.get(target) {
            return Ok(Some(e.sender().clone()));
        }
        Ok(self.storage.get_event(&event.room_id, target).await?.map(|e| e.sender))
    }

    fn publish(&self, room: &RoomId, change: ChangeEvent) {
        let channels = self.room_channels.lock().expect("room channel map lock poisoned");
        if let Some(sender) = channels.get(room) {
            let _ = sender.send(change);
        }
    }

    fn publish_to_user(&self, user: &UserId, change: ChangeEvent) {
        let channels = self.user_channels.lock().expect("user channel map lock poisoned");
        if let Some(sender) = channels.get(user) {
            let _ = sender.send(change);
        }
    }

    /// Spec §4.7's `submit_event`. Suspends on the room's write lock,
    /// storage writes, and subscriber notification — never inside
    /// authorization or resolution (spec §5).
    #[tracing::instrument(skip(self, event), fields(event_id = %event.event_id, room_id = %event.room_id))]
    pub async fn submit_event(&self, mut event: PduEvent, origin: Origin) -> Result<Acceptance> {
        event.validate()?;
        let room = event.room_id.clone();
        let is_create = event.event_type.as_str() == EventType::ROOM_CREATE;

        let lock = self.room_locks.get(&room).await;
        let _guard = lock.lock().await;

        if origin == Origin::Client && event.auth_events.is_empty() && !is_create {
            let current = self.current_ids(&room).await?;
            let auth_types =
                auth_types_for_event(&event.event_type, &event.sender, event.state_key.as_deref(), &event.content);
            event.auth_events = auth_types.iter().filter_map(|k| current.get(k).cloned()).collect();
        }

        let unresolved = self.resolve_ids(&room, event.auth_events.clone()).await?;
        if !unresolved.is_empty() {
            tracing::debug!(?unresolved, "submit_event: auth chain incomplete past backfill bound, soft-failing");
            self.insert_into_arena(&room, Arc::new(event.clone())).await;
            self.storage.put_event(&event).await?;
            self.publish(
                &room,
                ChangeEvent::Rejected {
                    room_id: room.clone(),
                    event_id: event.event_id.clone(),
                    rule: "unknown-auth-event",
                    soft: true,
                },
            );
            return Ok(Acceptance::SoftFailed { rule: "unknown-auth-event" });
        }

        let current_state =
            if is_create { StateMap::new() } else { self.current_state_map(&room).await? };
        let arena = self.arena_snapshot(&room).await;
        let declared_auth = self.declared_auth_view(&event, &arena);
        let redacted_sender = self.redacted_event_sender(&event, &arena).await?;
        let rules = self.config.room_version.rules();

        let event_arc: Arc<dyn Event> = Arc::new(event.clone());

        let rule = match rules.authorize(event_arc.as_ref(), &current_state, &declared_auth, redacted_sender.as_ref()) {
            Ok(()) => None,
            Err(concord_state_res::Error::AuthFailed { rule }) => Some(rule),
            Err(other) => return Err(other.into()),
        };

        if let Some(rule) = rule {
            let authorized_by_own_chain =
                rules.authorize(event_arc.as_ref(), &declared_auth, &declared_auth, redacted_sender.as_ref()).is_ok();

            self.insert_into_arena(&room, Arc::clone(&event_arc)).await;
            self.storage.put_event(&event).await?;
            self.publish(
                &room,
                ChangeEvent::Rejected {
                    room_id: room.clone(),
                    event_id: event.event_id.clone(),
                    rule,
                    soft: authorized_by_own_chain,
                },
            );
            return if authorized_by_own_chain {
                Ok(Acceptance::SoftFailed { rule })
            } else {
                Ok(Acceptance::Rejected { reason: format!("rule {rule} denied") })
            };
        }

        self.insert_into_arena(&room, Arc::clone(&event_arc)).await;

        if event.is_state() {
            let base = if is_create { RoomState::empty() } else { RoomState::from_entries(self.current_ids(&room).await?) };
            let new_state = base.apply(&room, event_arc.as_ref())?;
            self.storage.put_state_snapshot(&room, new_state.entries(), &event.event_id).await?;
            self.cache.invalidate(&room);

            self.publish(
                &room,
                ChangeEvent::StateChanged {
                    room_id: room.clone(),
                    event_type: event.event_type.clone(),
                    state_key: event.state_key.clone().unwrap_or_default(),
                    event_id: event.event_id.clone(),
                },
            );

            if event.event_type.as_str() == EventType::ROOM_MEMBER {
                if let (Some(membership), Some(user)) = (
                    membership_of(&event.content),
                    event.state_key.as_deref().and_then(|k| UserId::try_from(k).ok()),
                ) {
                    let change = ChangeEvent::MembershipChanged {
                        room_id: room.clone(),
                        user_id: user.clone(),
                        membership,
                    };
                    self.publish(&room, change.clone());
                    self.publish_to_user(&user, change);
                }
            }
        } else {
            self.timelines.write().await.entry(room.clone()).or_default().push(event.event_id.clone());
        }

        self.storage.put_event(&event).await?;
        self.publish(&room, ChangeEvent::EventApplied { room_id: room.clone(), event_id: event.event_id.clone() });

        Ok(Acceptance::Accepted)
    }

    /// Spec §4.7's `get_state`.
    pub async fn get_state(&self, room: &RoomId, at: At) -> Result<StateMap<EventId>> {
        match at {
            At::Current => self.current_ids(room).await,
            At::Event(event_id) => self
                .storage
                .load_state_snapshot(room, Some(&event_id))
                .await?
                .ok_or(Error::UnknownEvent(event_id.to_string())),
        }
    }

    pub async fn get_event(&self, room: &RoomId, event_id: &EventId) -> Result<Option<PduEvent>> {
        self.storage.get_event(room, event_id).await
    }

    /// Spec §4.4, exposed for federation catch-up (spec §4.7).
    pub async fn resolve(&self, room: &RoomId, snapshots: Vec<StateMap<EventId>>) -> Result<StateMap<EventId>> {
        if snapshots.is_empty() {
            return Err(Error::StateResolutionError("resolve called with no input state sets".into()));
        }
        for snapshot in &snapshots {
            let unresolved = self.resolve_ids(room, snapshot.values().cloned().collect()).await?;
            if !unresolved.is_empty() {
                return Err(Error::UnknownEvent(unresolved[0].to_string()));
            }
        }

        let arena = self.arena_snapshot(room).await;
        let mut chains = Vec::with_capacity(snapshots.len());
        for snapshot in &snapshots {
            let ids: Vec<EventId> = snapshot.values().cloned().collect();
            chains.push(auth_chain(&ids, |id| arena.get(id).cloned())?);
        }

        let rules = self.config.room_version.rules();
        Ok(resolve_state(rules, &snapshots, &chains, &arena)?)
    }

    /// Spec §2/§7's bounded backfill-on-`UnknownEvent` recovery: walks
    /// `list_room_events` backward from `event_id` up to `max_depth` pages,
    /// pulling referenced ancestors into the room's arena.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_missing(&self, room: &RoomId, event_id: &EventId, max_depth: u32) -> Result<()> {
        if self.arena_snapshot(room).await.contains_key(event_id) {
            return Ok(());
        }

        let mut frontier = vec![event_id.clone()];
        for _ in 0..max_depth.max(1) {
            if frontier.is_empty() {
                break;
            }
            let mut next_frontier = Vec::new();
            for id in frontier.drain(..) {
                let page = self.storage.list_room_events(room, Some(&id), 50, Direction::Backward).await?;
                for pdu in page.events {
                    next_frontier.extend(pdu.auth_events.iter().cloned());
                    next_frontier.extend(pdu.prev_events.iter().cloned());
                    self.insert_into_arena(room, Arc::new(pdu)).await;
                }
            }
            if self.arena_snapshot(room).await.contains_key(event_id) {
                return Ok(());
            }
            frontier = next_frontier;
        }

        Err(Error::UnknownEvent(event_id.to_string()))
    }

    /// Spec §2's supplemented room summary (see `SPEC_FULL.md` §2).
    pub async fn room_summary(&self, room: &RoomId) -> Result<RoomSummary> {
        if let Some(entry) = self.cache.get(room) {
            return Ok(entry.summary);
        }

        let ids = self.current_ids(room).await?;
        self.resolve_ids(room, ids.values().cloned().collect()).await?;
        let arena = self.arena_snapshot(room).await;
        let state = RoomState::from_entries(ids);
        let summary = build_summary(room, &state, &arena);
        let power_levels = state.power_levels(&arena);
        self.cache.insert(room.clone(), state, power_levels, summary.clone());
        Ok(summary)
    }
}

fn content_str(arena: &RoomEventArena, id: Option<&EventId>, field: &str) -> Option<String> {
    let event = arena.get(id?)?;
    event.content().get(field).and_then(JsonValue::as_str).map(str::to_owned)
}

fn build_summary(room: &RoomId, state: &RoomState, arena: &RoomEventArena) -> RoomSummary {
    let name_key = (EventType::from(EventType::ROOM_NAME), String::new());
    let topic_key = (EventType::from(EventType::ROOM_TOPIC), String::new());
    let avatar_key = (EventType::from(EventType::ROOM_AVATAR), String::new());
    let join_rules_key = (EventType::from(EventType::ROOM_JOIN_RULES), String::new());
    let create_key = (EventType::from(EventType::ROOM_CREATE), String::new());
    let encryption_key = (EventType::from(EventType::ROOM_ENCRYPTION), String::new());

    RoomSummary {
        room_id: Some(room.clone()),
        name: content_str(arena, state.entries().get(&name_key), "name"),
        topic: content_str(arena, state.entries().get(&topic_key), "topic"),
        avatar_url: content_str(arena, state.entries().get(&avatar_key), "url"),
        joined_member_count: state.members(MembershipState::Join, arena).len(),
        creator: content_str(arena, state.entries().get(&create_key), "creator")
            .and_then(|s| UserId::try_from(s).ok()),
        is_encrypted: state.entries().contains_key(&encryption_key),
        join_rule: content_str(arena, state.entries().get(&join_rules_key), "join_rule"),
    }
}

impl<S: StorageRepository> Subscriptions for StateManager<S> {
    fn subscribe(&self, room: &RoomId) -> Subscription {
        let mut channels = self.room_channels.lock().expect("room channel map lock poisoned");
        let sender = channels
            .entry(room.clone())
            .or_insert_with(|| broadcast::channel(self.config.subscription_buffer).0);
        Subscription { receiver: sender.subscribe() }
    }

    fn subscribe_user(&self, user: &UserId) -> Subscription {
        let mut channels = self.user_channels.lock().expect("user channel map lock poisoned");
        let sender = channels
            .entry(user.clone())
            .or_insert_with(|| broadcast::channel(self.config.subscription_buffer).0);
        Subscription { receiver: sender.subscribe() }
    }
}

impl<S: StorageRepository> FederationIngest for StateManager<S> {
    async fn accept_pdu(&self, pdu: PduEvent, origin_server: ServerName) -> Result<Acceptance> {
        match self.submit_event(pdu, Origin::Federation { origin_server }).await {
            Ok(acceptance) => Ok(acceptance),
            Err(Error::MalformedEvent(reason)) => {
                tracing::warn!(reason, "accept_pdu: malformed PDU from peer, dropping without propagating");
                Ok(Acceptance::Rejected { reason })
            }
            Err(other) => Err(other),
        }
    }
}
