//! Core types: message, delivery status, and append request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client-side delivery state of a locally-originated message.
///
/// Confirmed history rows carry no status at all (`Message::status == None`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Staged locally, append in flight.
    Sending,
    /// Append acknowledged; awaiting the live-feed echo of the confirmed row.
    Sent,
    /// Append failed; stays visible until retried or dismissed.
    Error,
}

/// A single chat message, either confirmed by the store or staged locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned id; `None` while the message is only staged locally.
    pub id: Option<String>,
    /// Client-generated reconciliation key, assigned at send time and never
    /// reused within a session. Retained after confirmation so the append
    /// callback and the live feed converge on the same entry.
    pub temp_id: Option<String>,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    /// Client clock while pending; store clock once confirmed.
    pub created_at: DateTime<Utc>,
    pub status: Option<DeliveryStatus>,
}

impl Message {
    /// Stages a new pending message under the given `temp_id` with the current time.
    pub fn pending(
        temp_id: impl Into<String>,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Self {
        Self {
            id: None,
            temp_id: Some(temp_id.into()),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
            status: Some(DeliveryStatus::Sending),
        }
    }

    /// True while the append for this entry is in flight.
    pub fn is_sending(&self) -> bool {
        self.status == Some(DeliveryStatus::Sending)
    }

    /// True once the append for this entry has failed.
    pub fn is_failed(&self) -> bool {
        self.status == Some(DeliveryStatus::Error)
    }
}

/// Append request handed to a [`crate::MessageStore`]; the store assigns id
/// and timestamp on the confirmed row it returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
}
