//! # convo-sync
//!
//! Optimistic message delivery and reconciliation for one conversation.
//!
//! [`ConversationFeed`] owns the ordered view of a conversation: it blends
//! confirmed history with locally staged sends, keeps exactly one live entry
//! per logical message while appends confirm, and exposes the send/retry/
//! dismiss surface the presentation layer needs. Persistence and identity are
//! injected collaborators ([`convo_core::MessageStore`],
//! [`convo_core::IdentityProvider`]).

mod feed;
mod state;

pub use feed::ConversationFeed;
pub use state::FeedSnapshot;
