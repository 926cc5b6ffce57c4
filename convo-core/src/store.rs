//! Message store abstraction: durable append-only persistence plus a live
//! insert feed per conversation.
//!
//! [`MessageStore`] is backend-agnostic; convo-storage provides SQLite and
//! in-memory implementations. [`InsertFeed`] is the disposable subscription
//! handle: it must be closed (or dropped) when the conversation view goes
//! away, and closing is exactly-once.

use crate::error::Result;
use crate::types::{Message, NewMessage};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

/// Durable append-only message persistence, keyed by conversation.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Returns the confirmed history of a conversation, ascending by creation time.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// Durably appends a message and returns the confirmed row (store-assigned
    /// id and timestamp). The confirmed row is also delivered to every open
    /// insert feed for the conversation.
    async fn insert_message(&self, message: NewMessage) -> Result<Message>;

    /// Opens a live feed of confirmed inserts scoped to one conversation.
    /// Reconnection after a lost transport is the implementation's concern.
    async fn subscribe_inserts(&self, conversation_id: &str) -> Result<InsertFeed>;
}

/// Live subscription handle returned by [`MessageStore::subscribe_inserts`].
///
/// Yields confirmed messages in delivery order. Closing releases the store-side
/// registration; dropping an open feed closes it.
pub struct InsertFeed {
    receiver: mpsc::UnboundedReceiver<Message>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl InsertFeed {
    /// Wraps a receiver with a deregistration callback invoked exactly once on close.
    pub fn new(
        receiver: mpsc::UnboundedReceiver<Message>,
        on_close: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            on_close: Some(Box::new(on_close)),
        }
    }

    /// Waits for the next confirmed insert. Returns `None` once the feed is
    /// closed (either side).
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    /// Closes the feed and deregisters from the store. Idempotent.
    pub fn close(&mut self) {
        self.receiver.close();
        if let Some(on_close) = self.on_close.take() {
            debug!("insert feed closed");
            on_close();
        }
    }
}

impl Drop for InsertFeed {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for InsertFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsertFeed")
            .field("closed", &self.on_close.is_none())
            .finish()
    }
}
