/// Conversation synchronizer: the merged view of one active conversation
///
/// Reconciles the local cache, the paginated pull API and the live push
/// channel into a single gap-free, duplicate-free, time-ordered list. All
/// state lives behind `&mut self`: each event's merge, including cache
/// persistence, completes before the next one is applied, so merges never
/// interleave. Page fetches run on spawned tasks and come back as events
/// tagged with the conversation key and a request epoch; anything stale is
/// discarded on arrival.
use crate::cache::CacheStore;
use crate::config::SyncConfig;
use crate::error::{ChatError, Result};
use crate::live::{ConnectionState, LiveSender};
use crate::merge::{is_ordered, merge};
use crate::message::{ChatMessage, ConversationKey};
use crate::pagination::{PageFetcher, PageResponse, PaginationCursor};
use crate::session::SessionHandle;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Internal events produced by spawned page fetches
#[derive(Debug)]
enum SyncEvent {
    PageFetched {
        key: ConversationKey,
        epoch: u64,
        page: u32,
        backfill: bool,
        result: Result<PageResponse>,
    },
}

pub struct ConversationSynchronizer {
    user_id: i64,
    session: SessionHandle,
    cache: CacheStore,
    fetcher: Arc<dyn PageFetcher>,
    live: Option<Arc<dyn LiveSender>>,

    active: Option<ConversationKey>,
    merged: Vec<ChatMessage>,
    cursor: PaginationCursor,
    loading_older: bool,

    /// Bumped on every conversation switch; stale fetch results carry an
    /// older value and are dropped.
    epoch: u64,
    seq_counter: u64,
    connection: ConnectionState,
    /// Sends accepted while the live channel was down, flushed on reconnect
    outbox: VecDeque<ChatMessage>,

    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events_rx: mpsc::UnboundedReceiver<SyncEvent>,

    page_size: u32,
}

impl ConversationSynchronizer {
    pub fn new(
        session: SessionHandle,
        cache: CacheStore,
        fetcher: Arc<dyn PageFetcher>,
        config: &SyncConfig,
    ) -> Result<Self> {
        let user_id = session
            .user_id()
            .ok_or_else(|| ChatError::Validation("No active session".to_string()))?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            user_id,
            session,
            cache,
            fetcher,
            live: None,
            active: None,
            merged: Vec::new(),
            cursor: PaginationCursor::new(config.page_size),
            loading_older: false,
            epoch: 0,
            seq_counter: 0,
            connection: ConnectionState::Disconnected,
            outbox: VecDeque::new(),
            events_tx,
            events_rx,
            page_size: config.page_size,
        })
    }

    /// Wire the live channel sender in (kept optional so the engine also
    /// works pull-and-cache-only)
    pub fn attach_live(&mut self, live: Arc<dyn LiveSender>) {
        self.live = Some(live);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.merged
    }

    pub fn cursor(&self) -> &PaginationCursor {
        &self.cursor
    }

    pub fn active_conversation(&self) -> Option<ConversationKey> {
        self.active
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn queued_sends(&self) -> usize {
        self.outbox.len()
    }

    /// Switch to the conversation with `peer_id`.
    ///
    /// The cached history is shown immediately; the first page is fetched in
    /// the background and merged in when it resolves (apply it with
    /// [`pump_one`](Self::pump_one) / [`try_pump`](Self::try_pump)). Any
    /// fetch still in flight for the previous conversation is discarded on
    /// arrival.
    pub fn select_conversation(&mut self, peer_id: i64) -> &[ChatMessage] {
        let key = ConversationKey::new(self.user_id, peer_id);
        self.epoch += 1;
        self.active = Some(key);
        self.cursor.reset();
        self.loading_older = false;

        let cached = self.cache.load(&key);
        // Keep the insertion counter ahead of anything replayed from disk
        if let Some(max_seq) = cached.iter().map(|m| m.seq).max() {
            self.seq_counter = self.seq_counter.max(max_seq);
        }
        self.merged = merge(&[], &cached);
        debug!(
            "Selected conversation {:?}: {} cached messages",
            key,
            self.merged.len()
        );

        self.spawn_fetch(key, 0, false);
        &self.merged
    }

    /// Integrate one message pushed over the live channel.
    ///
    /// Transport echoes of our own sends are ignored: the optimistic copy is
    /// already in the list. A message for a conversation that is not open is
    /// persisted into that conversation's cache slot without touching the
    /// visible list.
    pub fn on_live_message(&mut self, mut msg: ChatMessage) {
        if msg.recipient_id != self.user_id {
            debug!("Ignoring transport echo of own message");
            return;
        }

        msg.seq = self.next_seq();
        let key = ConversationKey::of_message(&msg);

        if self.active == Some(key) {
            self.merged = merge(&self.merged, std::slice::from_ref(&msg));
            debug_assert!(is_ordered(&self.merged));
            self.persist_active();
        } else {
            let existing = self.cache.load(&key);
            let updated = merge(&existing, std::slice::from_ref(&msg));
            if let Err(e) = self.cache.save(&key, &updated) {
                warn!("Failed to cache message for {:?}: {}", key, e);
            }
        }
    }

    /// Create and send a message to the active conversation.
    ///
    /// The optimistic copy is inserted and persisted before any network
    /// activity. While the live channel is down the message is queued and
    /// flushed on the next reconnect; it is never silently dropped.
    pub fn send_message(&mut self, content: &str) -> Result<ChatMessage> {
        let key = self
            .active
            .ok_or_else(|| ChatError::Validation("No conversation selected".to_string()))?;
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::Validation("Message content is empty".to_string()));
        }

        let seq = self.next_seq();
        let msg = ChatMessage::outgoing(self.user_id, key.peer_of(self.user_id), content, seq);

        self.merged = merge(&self.merged, std::slice::from_ref(&msg));
        self.persist_active();
        self.deliver(msg.clone());
        Ok(msg)
    }

    /// Backfill: request the next older page of the active conversation.
    ///
    /// Returns `Ok(false)` without any network call when the history is
    /// exhausted or a backfill is already in flight. On fetch failure the
    /// page number is rolled back and `has_more` is left unchanged, so the
    /// call can simply be retried.
    pub fn load_older(&mut self) -> Result<bool> {
        let key = self
            .active
            .ok_or_else(|| ChatError::Validation("No conversation selected".to_string()))?;
        if !self.cursor.has_more || self.loading_older {
            return Ok(false);
        }

        self.loading_older = true;
        self.cursor.page += 1;
        self.spawn_fetch(key, self.cursor.page, true);
        Ok(true)
    }

    /// Track the live channel state; entering `Connected` flushes the outbox.
    pub fn on_connection_change(&mut self, state: ConnectionState) {
        let was = self.connection;
        self.connection = state;
        if was != ConnectionState::Connected && state == ConnectionState::Connected {
            self.flush_outbox();
        }
    }

    /// Logout lifecycle: drop the visible list, the credentials and every
    /// cached conversation.
    pub fn invalidate_session(&mut self) {
        self.epoch += 1;
        self.active = None;
        self.merged.clear();
        self.cursor.reset();
        self.loading_older = false;
        self.outbox.clear();
        self.session.invalidate();
        if let Err(e) = self.cache.clear() {
            warn!("Failed to clear conversation cache on logout: {}", e);
        }
        info!("Session invalidated, local chat state cleared");
    }

    /// Apply the next pending fetch result, waiting for one to arrive
    pub async fn pump_one(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.apply(event);
                true
            }
            None => false,
        }
    }

    /// Apply one pending fetch result if any, without waiting
    pub fn try_pump(&mut self) -> bool {
        match self.events_rx.try_recv() {
            Ok(event) => {
                self.apply(event);
                true
            }
            Err(_) => false,
        }
    }

    fn apply(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::PageFetched {
                key,
                epoch,
                page,
                backfill,
                result,
            } => self.apply_page(key, epoch, page, backfill, result),
        }
    }

    fn apply_page(
        &mut self,
        key: ConversationKey,
        epoch: u64,
        page: u32,
        backfill: bool,
        result: Result<PageResponse>,
    ) {
        // Stale-response guard: the conversation changed while the request
        // was in flight.
        if epoch != self.epoch || self.active != Some(key) {
            debug!("Discarding stale page {} for {:?}", page, key);
            return;
        }

        if backfill {
            self.loading_older = false;
        }

        match result {
            Ok(resp) => {
                self.merged = merge(&self.merged, &resp.content);
                debug_assert!(is_ordered(&self.merged));
                self.cursor.advance(&resp);
                // Self-healing: re-persist the merged set so a partial or
                // stale cache entry is overwritten.
                self.persist_active();
                debug!(
                    "Merged page {} of {:?}: {} visible, has_more={}",
                    page,
                    key,
                    self.merged.len(),
                    self.cursor.has_more
                );
            }
            Err(e) => {
                warn!("Page {} fetch for {:?} failed: {}", page, key, e);
                if backfill {
                    // Roll back so the same page can be retried; the
                    // conversation stays usable with what is merged.
                    self.cursor.page = self.cursor.page.saturating_sub(1);
                }
            }
        }
    }

    fn spawn_fetch(&self, key: ConversationKey, page: u32, backfill: bool) {
        let fetcher = self.fetcher.clone();
        let events = self.events_tx.clone();
        let epoch = self.epoch;
        let requester = self.user_id;
        let peer = key.peer_of(self.user_id);
        let size = self.page_size;

        tokio::spawn(async move {
            let result = fetcher.fetch_page(requester, peer, page, size).await;
            let _ = events.send(SyncEvent::PageFetched {
                key,
                epoch,
                page,
                backfill,
                result,
            });
        });
    }

    fn deliver(&mut self, msg: ChatMessage) {
        if self.connection == ConnectionState::Connected {
            if let Some(live) = &self.live {
                match live.send(&msg) {
                    Ok(()) => return,
                    Err(e) => debug!("Live send failed, queueing: {}", e),
                }
            }
        }
        info!("Live channel unavailable, message queued for delivery");
        self.outbox.push_back(msg);
    }

    fn flush_outbox(&mut self) {
        let Some(live) = self.live.clone() else {
            return;
        };
        while let Some(msg) = self.outbox.pop_front() {
            if let Err(e) = live.send(&msg) {
                warn!("Outbox flush interrupted: {}", e);
                self.outbox.push_front(msg);
                break;
            }
        }
        if self.outbox.is_empty() {
            debug!("Outbox flushed");
        }
    }

    fn persist_active(&mut self) {
        if let Some(key) = self.active {
            if let Err(e) = self.cache.save(&key, &self.merged) {
                warn!("Failed to persist conversation {:?}: {}", key, e);
            }
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq_counter += 1;
        self.seq_counter
    }
}
