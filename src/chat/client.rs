use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::api::error::ApiError;
use crate::api::events::{HubEvent, IncomingEvent};
use crate::api::models::{ChatMessage, ChatRoom, RoomType, SendMessagePayload};
use crate::api::services::ChatApi;
use crate::chat::bus::{MessageBus, Subscription};
use crate::chat::history::{merge_messages, pick_support_room, HistorySync};
use crate::chat::hub::{HubConnector, HubLink, Invocation};
use crate::storage::Store;
use crate::utils::spawn_async;

/// Delays before successive reconnect attempts; the last one repeats.
pub const RECONNECT_DELAYS: [Duration; 4] = [
    Duration::from_secs(0),
    Duration::from_secs(2),
    Duration::from_secs(10),
    Duration::from_secs(30),
];

pub const DEFAULT_PAGE_SIZE: u32 = 50;
const RECENT_IDS: usize = 512;

pub fn reconnect_delay(attempt: usize) -> Duration {
    RECONNECT_DELAYS[attempt.min(RECONNECT_DELAYS.len() - 1)]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

type PendingConnect = Shared<BoxFuture<'static, bool>>;

struct ConnState {
    status: ConnectionState,
    pending: Option<PendingConnect>,
    invoker: Option<mpsc::UnboundedSender<Invocation>>,
    joined: HashSet<i64>,
    generation: u64,
    shut_down: bool,
}

struct Inner {
    api: ChatApi,
    store: Arc<Store>,
    connector: Arc<dyn HubConnector>,
    bus: MessageBus,
    page_size: u32,
    conn: Mutex<ConnState>,
    recent: Mutex<VecDeque<String>>,
}

/// Keeps one hub connection per session, fans inbound messages out through the
/// [`MessageBus`] and reconciles room history across cache, REST and live push.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<Inner>,
}

impl ChatClient {
    pub fn new(api: ChatApi, store: Arc<Store>, connector: Arc<dyn HubConnector>, bus: MessageBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                connector,
                bus,
                page_size: DEFAULT_PAGE_SIZE,
                conn: Mutex::new(ConnState {
                    status: ConnectionState::Disconnected,
                    pending: None,
                    invoker: None,
                    joined: HashSet::new(),
                    generation: 0,
                    shut_down: false,
                }),
                recent: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn bus(&self) -> &MessageBus {
        &self.inner.bus
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.conn().map(|c| c.status).unwrap_or(ConnectionState::Disconnected)
    }

    /// Connects to the hub. Concurrent callers share one attempt; once connected
    /// this returns immediately. Without an access token nothing is attempted.
    pub async fn connect(&self) -> ConnectionState {
        let pending = {
            let Some(mut conn) = self.inner.conn() else {
                return ConnectionState::Disconnected;
            };
            if conn.status == ConnectionState::Connected {
                return ConnectionState::Connected;
            }
            if let Some(in_flight) = conn.pending.clone() {
                in_flight
            } else {
                let Some(token) = self.inner.api.client().access_token() else {
                    log::warn!("No access token; chat hub connection skipped");
                    return conn.status;
                };
                conn.status = ConnectionState::Connecting;
                conn.shut_down = false;
                let inner = self.inner.clone();
                let fut = Inner::establish(inner, token).boxed().shared();
                conn.pending = Some(fut.clone());
                fut
            }
        };
        pending.await;
        self.state()
    }

    /// Closes the hub connection and stops reconnecting.
    pub fn disconnect(&self) {
        if let Some(mut conn) = self.inner.conn() {
            conn.shut_down = true;
            conn.invoker = None;
            conn.pending = None;
            conn.status = ConnectionState::Disconnected;
        }
    }

    pub fn join_room(&self, room_id: i64) {
        let invoker = self.inner.conn().and_then(|mut conn| {
            conn.joined.insert(room_id);
            Self::live_invoker(&conn)
        });
        Self::invoke(invoker, Invocation::new("JoinRoom", vec![json!(room_id)]));
    }

    pub fn leave_room(&self, room_id: i64) {
        let invoker = self.inner.conn().and_then(|mut conn| {
            conn.joined.remove(&room_id);
            Self::live_invoker(&conn)
        });
        Self::invoke(invoker, Invocation::new("LeaveRoom", vec![json!(room_id)]));
    }

    pub fn start_typing(&self, room_id: i64) {
        let invoker = self.inner.conn().and_then(|conn| Self::live_invoker(&conn));
        Self::invoke(invoker, Invocation::new("StartTyping", vec![json!(room_id)]));
    }

    pub fn stop_typing(&self, room_id: i64) {
        let invoker = self.inner.conn().and_then(|conn| Self::live_invoker(&conn));
        Self::invoke(invoker, Invocation::new("StopTyping", vec![json!(room_id)]));
    }

    fn live_invoker(conn: &ConnState) -> Option<mpsc::UnboundedSender<Invocation>> {
        if conn.status == ConnectionState::Connected { conn.invoker.clone() } else { None }
    }

    fn invoke(invoker: Option<mpsc::UnboundedSender<Invocation>>, invocation: Invocation) {
        match invoker {
            Some(tx) => {
                if let Err(e) = tx.send(invocation) {
                    log::warn!("Hub invoke {} dropped: connection closing", e.0.method);
                }
            }
            None => log::debug!("Hub not connected; {} skipped", invocation.method),
        }
    }

    pub fn on_message_received<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(callback)
    }

    /// Sends over REST, then delivers the stored message through the same path
    /// as messages pushed by the hub.
    pub async fn send_message(&self, room_id: i64, payload: &SendMessagePayload) -> Result<ChatMessage, ApiError> {
        let message = self.inner.api.send(room_id, payload).await?;
        self.inner.accept(message.clone());
        Ok(message)
    }

    pub fn cached_history(&self, room_id: i64) -> Vec<ChatMessage> {
        self.inner.store.cached_messages(room_id).unwrap_or_else(|e| {
            log::warn!("Message cache for room {room_id} unreadable: {e}");
            Vec::new()
        })
    }

    /// Fetches one history page and merges it with the cache and with anything
    /// that arrived live while the fetch was in flight. The merge becomes the
    /// new cache. A failed fetch keeps the cached set.
    pub async fn sync_history(&self, room_id: i64, page: u32) -> HistorySync {
        let cached = self.cached_history(room_id);
        let live: Arc<Mutex<Vec<ChatMessage>>> = Arc::default();
        let sink = live.clone();
        let capture = self.inner.bus.subscribe(move |m| {
            if m.room_id == room_id {
                if let Ok(mut buf) = sink.lock() {
                    buf.push(m.clone());
                }
            }
        });
        let fetched = self.inner.api.history(room_id, page, self.inner.page_size).await;
        capture.cancel();
        let live = live.lock().map(|mut l| std::mem::take(&mut *l)).unwrap_or_default();

        match fetched {
            Ok(page) => {
                let fresh = merge_messages([&page[..], &live[..]]);
                let messages = self.inner.store.merge_room_messages(room_id, &fresh).unwrap_or_else(|e| {
                    log::warn!("Could not cache room {room_id}: {e}");
                    merge_messages([&cached[..], &fresh[..]])
                });
                HistorySync { messages, error: None }
            }
            Err(e) => {
                log::warn!("History fetch for room {room_id} failed; showing cached messages");
                HistorySync { messages: merge_messages([&cached[..], &live[..]]), error: Some(e) }
            }
        }
    }

    /// Finds the user's support room, creating one when none exists.
    pub async fn ensure_support_room(&self) -> Result<ChatRoom, ApiError> {
        let rooms = self.inner.api.rooms().await?;
        if let Some(room) = pick_support_room(&rooms) {
            return Ok(room.clone());
        }
        log::info!("No support room yet; creating one");
        let created = self.inner.api.create_room(RoomType::Support, &[]).await?;
        // a concurrent creator may have won; converge on the highest id
        match self.inner.api.rooms().await {
            Ok(rooms) => Ok(pick_support_room(&rooms).cloned().unwrap_or(created)),
            Err(_) => Ok(created),
        }
    }

    pub fn rooms_api(&self) -> &ChatApi {
        &self.inner.api
    }
}

impl Inner {
    fn conn(&self) -> Option<MutexGuard<'_, ConnState>> {
        self.conn.lock().ok()
    }

    async fn establish(inner: Arc<Inner>, token: String) -> bool {
        match inner.connector.connect(&token).await {
            Ok(link) => {
                Inner::on_connected(&inner, link);
                true
            }
            Err(e) => {
                log::warn!("{e}; chat continues over REST only");
                if let Some(mut conn) = inner.conn() {
                    conn.status = ConnectionState::Disconnected;
                    conn.pending = None;
                }
                false
            }
        }
    }

    fn on_connected(inner: &Arc<Inner>, link: HubLink) {
        let HubLink { invocations, events } = link;
        let (generation, rooms) = {
            let Some(mut conn) = inner.conn() else { return };
            if conn.shut_down {
                // disconnect() raced the handshake
                conn.pending = None;
                return;
            }
            conn.generation += 1;
            conn.status = ConnectionState::Connected;
            conn.pending = None;
            conn.invoker = Some(invocations.clone());
            (conn.generation, conn.joined.iter().copied().collect::<Vec<_>>())
        };
        for room in rooms {
            ChatClient::invoke(Some(invocations.clone()), Invocation::new("JoinRoom", vec![json!(room)]));
        }
        spawn_async(Inner::pump(inner.clone(), events, generation));
    }

    async fn pump(inner: Arc<Inner>, mut events: mpsc::UnboundedReceiver<IncomingEvent>, generation: u64) {
        while let Some(raw) = events.recv().await {
            match HubEvent::from_incoming(raw) {
                HubEvent::MessageReceived(message) => inner.accept(message),
                HubEvent::Error(e) => {
                    log::warn!("Hub error: {e}");
                    inner.bus.publish_event(HubEvent::Error(e));
                }
                other => inner.bus.publish_event(other),
            }
        }

        let reconnect = match inner.conn() {
            Some(mut conn) if conn.generation == generation => {
                conn.status = ConnectionState::Disconnected;
                conn.invoker = None;
                !conn.shut_down
            }
            _ => false,
        };
        if reconnect {
            log::info!("Chat hub dropped; reconnecting");
            spawn_async(Inner::reconnect(inner));
        }
    }

    async fn reconnect(inner: Arc<Inner>) {
        let client = ChatClient { inner };
        let mut attempt = 0;
        loop {
            let delay = reconnect_delay(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let stop = client.inner.conn().map(|c| c.shut_down).unwrap_or(true);
            if stop || client.inner.api.client().access_token().is_none() {
                return;
            }
            if client.connect().await == ConnectionState::Connected {
                log::info!("Chat hub reconnected after {} attempt(s)", attempt + 1);
                return;
            }
            attempt += 1;
        }
    }

    /// Folds a message into its room cache and publishes it, once per id.
    fn accept(&self, message: ChatMessage) {
        if !message.id.is_empty() {
            let Ok(mut recent) = self.recent.lock() else { return };
            if recent.contains(&message.id) {
                return;
            }
            recent.push_back(message.id.clone());
            if recent.len() > RECENT_IDS {
                recent.pop_front();
            }
        }
        if let Err(e) = self.store.merge_room_messages(message.room_id, std::slice::from_ref(&message)) {
            log::warn!("Could not cache message {}: {e}", message.id);
        }
        self.bus.publish(&message);
    }
}
