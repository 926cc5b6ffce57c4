//! # convo-core
//!
//! Core types and traits for the optimistic chat delivery stack: [`Message`], the
//! [`MessageStore`] and [`IdentityProvider`] collaborator traits, error types, and
//! tracing initialization. Backend-agnostic; used by convo-storage and convo-sync.

pub mod error;
pub mod identity;
pub mod logger;
pub mod store;
pub mod types;

pub use error::{ConvoError, Result};
pub use identity::{IdentityProvider, StaticIdentity};
pub use logger::init_tracing;
pub use store::{InsertFeed, MessageStore};
pub use types::{DeliveryStatus, Message, NewMessage};
