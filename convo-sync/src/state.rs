//! Snapshot state and the merge rules that keep it duplicate-free.
//!
//! All mutation happens through the methods here; [`crate::ConversationFeed`]
//! wraps a snapshot in a watch channel and is its sole mutator. Confirmed rows
//! can reach the snapshot on two paths (the append call's own result and the
//! live insert feed); every rule below is written so the two paths converge
//! on the same state regardless of arrival order.

use convo_core::{DeliveryStatus, Message};

/// Observable state of one conversation: the reconciled, ordered message
/// sequence plus the initial-load flag.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    pub messages: Vec<Message>,
    pub is_loading: bool,
}

impl FeedSnapshot {
    pub(crate) fn loading() -> Self {
        Self {
            messages: Vec::new(),
            is_loading: true,
        }
    }

    /// Appends a freshly staged pending entry. Staged entries carry the
    /// current client time, which is never behind anything already present.
    pub(crate) fn stage(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Merges a confirmed row arriving on the live feed.
    ///
    /// Order of precedence:
    /// 1. A row whose id is already present only clears any leftover status
    ///    marker (the append result got there first).
    /// 2. A row authored by the current user replaces the oldest still-sending
    ///    entry with the same content, in place. FIFO keeps two rapid
    ///    identical sends in the order they were staged.
    /// 3. Anything else (counterpart, or this user in another session) is
    ///    inserted at its sorted position, ties after existing entries.
    ///
    /// Returns true if the snapshot changed.
    pub(crate) fn apply_confirmed(&mut self, confirmed: Message, current_user_id: &str) -> bool {
        if let Some(id) = confirmed.id.as_deref() {
            if let Some(existing) = self
                .messages
                .iter_mut()
                .find(|m| m.id.as_deref() == Some(id))
            {
                let changed = existing.status.is_some();
                existing.status = None;
                return changed;
            }
        }

        if confirmed.sender_id == current_user_id {
            let matched = self.messages.iter().position(|m| {
                m.is_sending()
                    && m.sender_id == confirmed.sender_id
                    && m.content == confirmed.content
            });
            if let Some(pos) = matched {
                // Replace in place: re-sorting by the adopted server timestamp
                // could swap the sender's observed order when the server
                // stamps this row after a later optimistic entry.
                let temp_id = self.messages[pos].temp_id.take();
                self.messages[pos] = Message {
                    temp_id,
                    status: None,
                    ..confirmed
                };
                return true;
            }
        }

        let at = self
            .messages
            .partition_point(|m| m.created_at <= confirmed.created_at);
        self.messages.insert(at, confirmed);
        true
    }

    /// Adopts the confirmed row returned by this client's own append call.
    ///
    /// Exact `temp_id` linkage; marks the entry `Sent` until the feed echo of
    /// the same id clears it. A no-op when the feed already confirmed the
    /// entry, so the two paths converge.
    pub(crate) fn confirm_append(&mut self, temp_id: &str, confirmed: Message) -> bool {
        if let Some(entry) = self.find_mut(temp_id) {
            if entry.is_sending() {
                let temp_id = entry.temp_id.take();
                *entry = Message {
                    temp_id,
                    status: Some(DeliveryStatus::Sent),
                    ..confirmed
                };
                return true;
            }
        }
        false
    }

    /// Records an append failure. Ignored if the feed confirmed the entry
    /// while the failure report was in flight.
    pub(crate) fn mark_failed(&mut self, temp_id: &str) -> bool {
        if let Some(entry) = self.find_mut(temp_id) {
            if entry.is_sending() {
                entry.status = Some(DeliveryStatus::Error);
                return true;
            }
        }
        false
    }

    /// Flips a failed entry back to sending and returns its content for the
    /// re-issued append. `None` when `temp_id` is unknown or not failed.
    pub(crate) fn reset_for_retry(&mut self, temp_id: &str) -> Option<String> {
        let entry = self.find_mut(temp_id)?;
        if !entry.is_failed() {
            return None;
        }
        // created_at keeps its first-attempt value so history does not reorder.
        entry.status = Some(DeliveryStatus::Sending);
        Some(entry.content.clone())
    }

    /// Removes a failed entry. Returns false (no-op) for unknown ids or
    /// entries in any other state.
    pub(crate) fn remove_failed(&mut self, temp_id: &str) -> bool {
        let before = self.messages.len();
        self.messages
            .retain(|m| !(m.is_failed() && m.temp_id.as_deref() == Some(temp_id)));
        self.messages.len() != before
    }

    fn find_mut(&mut self, temp_id: &str) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .find(|m| m.temp_id.as_deref() == Some(temp_id))
    }
}
