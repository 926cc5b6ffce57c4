//! The conversation feed: one instance per open conversation view.

use std::sync::Arc;

use convo_core::{
    ConvoError, IdentityProvider, InsertFeed, Message, MessageStore, NewMessage, Result,
};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::FeedSnapshot;

/// Reconciled, ordered view of one conversation's messages.
///
/// Opening a feed loads confirmed history and listens to the store's live
/// insert feed; `send`/`retry`/`dismiss` mutate the optimistic entries. The
/// feed is the sole mutator of its snapshot. [`ConversationFeed::close`] must
/// be called when the conversation view is torn down; it releases the live
/// subscription exactly once.
pub struct ConversationFeed {
    conversation_id: String,
    user_id: String,
    store: Arc<dyn MessageStore>,
    state: Arc<watch::Sender<FeedSnapshot>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ConversationFeed {
    /// Opens the feed: resolves the current user, subscribes to live inserts,
    /// loads confirmed history, and starts the listener task.
    ///
    /// Subscribing happens before the history read so no insert is missed in
    /// the gap; any overlap is removed by id-level dedup.
    pub async fn open(
        store: Arc<dyn MessageStore>,
        identity: Arc<dyn IdentityProvider>,
        conversation_id: impl Into<String>,
    ) -> Result<Self> {
        let conversation_id = conversation_id.into();
        let user_id = identity.current_user_id().ok_or(ConvoError::Identity)?;

        let state = Arc::new(watch::Sender::new(FeedSnapshot::loading()));

        let feed = store
            .subscribe_inserts(&conversation_id)
            .await
            .map_err(|e| ConvoError::Load(e.to_string()))?;

        let history = store
            .list_messages(&conversation_id)
            .await
            .map_err(|e| ConvoError::Load(e.to_string()))?;

        info!(
            conversation_id = %conversation_id,
            history_len = history.len(),
            "conversation feed opened"
        );

        state.send_modify(|s| {
            s.messages = history;
            s.is_loading = false;
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let listener = tokio::spawn(listen(feed, Arc::clone(&state), user_id.clone(), shutdown_rx));

        Ok(Self {
            conversation_id,
            user_id,
            store,
            state,
            shutdown: Mutex::new(Some(shutdown_tx)),
            listener: Mutex::new(Some(listener)),
        })
    }

    /// Stages a message and issues the append in the background.
    ///
    /// The optimistic entry is visible in the snapshot before this function
    /// returns; the caller never waits on I/O. Returns the entry's `temp_id`.
    /// Trimmed-empty content is rejected.
    pub fn send(&self, content: &str) -> Result<String> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ConvoError::EmptyContent);
        }

        let temp_id = Uuid::new_v4().to_string();
        let message = Message::pending(&temp_id, &self.conversation_id, &self.user_id, content);

        self.state.send_modify(|s| s.stage(message));
        debug!(temp_id = %temp_id, conversation_id = %self.conversation_id, "message staged");

        self.spawn_append(temp_id.clone(), content.to_string());
        Ok(temp_id)
    }

    /// Re-issues the append for a failed entry. Silent no-op (logged at debug)
    /// for unknown ids or entries not in the error state; those are stale UI
    /// callbacks, not faults.
    pub fn retry(&self, temp_id: &str) {
        let mut content = None;
        self.state.send_if_modified(|s| {
            content = s.reset_for_retry(temp_id);
            content.is_some()
        });

        match content {
            Some(content) => {
                info!(temp_id = %temp_id, "retrying failed message");
                self.spawn_append(temp_id.to_string(), content);
            }
            None => debug!(temp_id = %temp_id, "retry ignored: no failed entry"),
        }
    }

    /// Permanently removes a failed entry. Idempotent; unknown or non-failed
    /// ids are a silent no-op.
    pub fn dismiss(&self, temp_id: &str) {
        let removed = self.state.send_if_modified(|s| s.remove_failed(temp_id));
        if removed {
            info!(temp_id = %temp_id, "failed message dismissed");
        } else {
            debug!(temp_id = %temp_id, "dismiss ignored: no failed entry");
        }
    }

    /// Current snapshot: reconciled messages plus the initial-load flag.
    pub fn snapshot(&self) -> FeedSnapshot {
        self.state.borrow().clone()
    }

    /// Current reconciled message sequence.
    pub fn messages(&self) -> Vec<Message> {
        self.state.borrow().messages.clone()
    }

    /// True until the initial history load has been published.
    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    /// Watch channel over the snapshot, for render loops.
    pub fn watch(&self) -> watch::Receiver<FeedSnapshot> {
        self.state.subscribe()
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Tears down the feed: stops the listener and closes the live
    /// subscription. Idempotent; after it returns no feed activity can touch
    /// the snapshot.
    pub async fn close(&self) {
        if let Some(shutdown) = self.shutdown.lock().await.take() {
            let _ = shutdown.send(());
        }
        if let Some(listener) = self.listener.lock().await.take() {
            if listener.await.is_err() {
                debug!("listener task did not exit cleanly");
            }
            info!(conversation_id = %self.conversation_id, "conversation feed closed");
        }
    }

    fn spawn_append(&self, temp_id: String, content: String) {
        let store = Arc::clone(&self.store);
        let state = Arc::clone(&self.state);
        let request = NewMessage {
            conversation_id: self.conversation_id.clone(),
            sender_id: self.user_id.clone(),
            content,
        };

        tokio::spawn(async move {
            match store.insert_message(request).await {
                Ok(confirmed) => {
                    state.send_if_modified(|s| s.confirm_append(&temp_id, confirmed));
                }
                Err(err) => {
                    // Caught at the store boundary: the only user-visible
                    // outcome is the per-entry error marker.
                    let err = ConvoError::Send(err.to_string());
                    warn!(temp_id = %temp_id, error = %err, "message append failed");
                    state.send_if_modified(|s| s.mark_failed(&temp_id));
                }
            }
        });
    }
}

impl Drop for ConversationFeed {
    fn drop(&mut self) {
        // Last-resort cleanup for feeds dropped without close(): aborting the
        // listener drops the InsertFeed, whose Drop releases the subscription.
        if let Ok(mut listener) = self.listener.try_lock() {
            if let Some(listener) = listener.take() {
                listener.abort();
            }
        }
    }
}

async fn listen(
    mut feed: InsertFeed,
    state: Arc<watch::Sender<FeedSnapshot>>,
    user_id: String,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                feed.close();
                break;
            }
            next = feed.recv() => match next {
                Some(confirmed) => {
                    state.send_if_modified(|s| s.apply_confirmed(confirmed, &user_id));
                }
                // Upstream closed the feed; reconnection is the store's
                // concern, not ours.
                None => break,
            },
        }
    }
}
