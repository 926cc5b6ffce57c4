//! In-memory message store for testing and development.
//!
//! Same contract as the SQLite store, plus test affordances:
//! [`InMemoryMessageStore::fail_next_inserts`] and
//! [`InMemoryMessageStore::fail_next_lists`] to exercise the append and
//! history-load error paths, and
//! [`InMemoryMessageStore::active_subscriptions`] to assert feed teardown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use convo_core::{ConvoError, InsertFeed, Message, MessageStore, NewMessage, Result};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory [`MessageStore`]; data is lost on drop.
#[derive(Clone)]
pub struct InMemoryMessageStore {
    messages: Arc<RwLock<HashMap<String, Vec<Message>>>>,
    feeds: crate::feeds::FeedRegistry,
    fail_inserts: Arc<AtomicU32>,
    fail_lists: Arc<AtomicU32>,
}

impl InMemoryMessageStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            messages: Arc::new(RwLock::new(HashMap::new())),
            feeds: crate::feeds::FeedRegistry::new(),
            fail_inserts: Arc::new(AtomicU32::new(0)),
            fail_lists: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Makes the next `count` calls to `insert_message` fail. For tests.
    pub fn fail_next_inserts(&self, count: u32) {
        self.fail_inserts.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` calls to `list_messages` fail. For tests.
    pub fn fail_next_lists(&self, count: u32) {
        self.fail_lists.store(count, Ordering::SeqCst);
    }

    /// Number of currently open insert feeds. For teardown assertions in tests.
    pub fn active_subscriptions(&self) -> usize {
        self.feeds.active()
    }

    /// Total number of stored messages across conversations.
    pub async fn len(&self) -> usize {
        self.messages.read().await.values().map(Vec::len).sum()
    }

    /// Returns true if no messages are stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        if consume_failure(&self.fail_lists) {
            return Err(ConvoError::Store("injected list failure".to_string()));
        }

        let map = self.messages.read().await;
        Ok(map.get(conversation_id).cloned().unwrap_or_default())
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message> {
        if consume_failure(&self.fail_inserts) {
            return Err(ConvoError::Store("injected insert failure".to_string()));
        }

        let confirmed = Message {
            id: Some(Uuid::new_v4().to_string()),
            temp_id: None,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content,
            created_at: Utc::now(),
            status: None,
        };

        self.messages
            .write()
            .await
            .entry(confirmed.conversation_id.clone())
            .or_default()
            .push(confirmed.clone());

        self.feeds.notify(&confirmed);
        Ok(confirmed)
    }

    async fn subscribe_inserts(&self, conversation_id: &str) -> Result<InsertFeed> {
        Ok(self.feeds.subscribe(conversation_id))
    }
}

/// Decrements the injected-failure counter; true while failures remain.
fn consume_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}
