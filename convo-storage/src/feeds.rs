//! Live-insert fan-out shared by the store implementations.
//!
//! Each subscription is an [`InsertFeed`] backed by an unbounded channel; the
//! registry removes a subscriber when its feed closes, and prunes dead
//! receivers on fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use convo_core::{InsertFeed, Message};
use tokio::sync::mpsc;
use tracing::debug;

struct Subscriber {
    id: u64,
    sender: mpsc::UnboundedSender<Message>,
}

struct RegistryInner {
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

/// Per-conversation registry of open insert feeds.
#[derive(Clone)]
pub(crate) struct FeedRegistry {
    inner: Arc<RegistryInner>,
}

impl FeedRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    // The lock is only held for map edits; recover from poisoning instead of
    // propagating a panic from an unrelated thread.
    fn subscribers(&self) -> MutexGuard<'_, HashMap<String, Vec<Subscriber>>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a new feed for the conversation; closing the feed deregisters it.
    pub(crate) fn subscribe(&self, conversation_id: &str) -> InsertFeed {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.subscribers()
            .entry(conversation_id.to_string())
            .or_default()
            .push(Subscriber { id, sender });

        debug!(conversation_id, subscriber_id = id, "insert feed opened");

        let registry = self.clone();
        let conversation = conversation_id.to_string();
        InsertFeed::new(receiver, move || registry.deregister(&conversation, id))
    }

    fn deregister(&self, conversation_id: &str, id: u64) {
        let mut map = self.subscribers();
        if let Some(subs) = map.get_mut(conversation_id) {
            subs.retain(|s| s.id != id);
            if subs.is_empty() {
                map.remove(conversation_id);
            }
        }
        debug!(conversation_id, subscriber_id = id, "insert feed closed");
    }

    /// Delivers a confirmed row to every open feed for its conversation.
    pub(crate) fn notify(&self, message: &Message) {
        let mut map = self.subscribers();
        if let Some(subs) = map.get_mut(&message.conversation_id) {
            subs.retain(|s| s.sender.send(message.clone()).is_ok());
            if subs.is_empty() {
                map.remove(&message.conversation_id);
            }
        }
    }

    /// Number of currently open feeds across all conversations.
    pub(crate) fn active(&self) -> usize {
        self.subscribers().values().map(Vec::len).sum()
    }
}
