//! Storage crate: [`convo_core::MessageStore`] implementations.
//!
//! ## Modules
//!
//! - [`feeds`] – per-conversation live-insert fan-out
//! - [`sqlite`] – SqliteMessageStore (durable, sqlx)
//! - [`inmemory`] – InMemoryMessageStore (testing and development)

mod feeds;
mod inmemory;
mod sqlite;

pub use inmemory::InMemoryMessageStore;
pub use sqlite::SqliteMessageStore;
