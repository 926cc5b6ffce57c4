//! Integration tests for [`convo_sync::ConversationFeed`].
//!
//! Covers: optimistic visibility, deduplication on confirmation, order
//! preservation, failure isolation, retry and dismiss semantics, and
//! subscription teardown, all against `InMemoryMessageStore`.

use std::sync::Arc;
use std::time::Duration;

use convo_core::{ConvoError, MessageStore, NewMessage, StaticIdentity};
use convo_storage::InMemoryMessageStore;
use convo_sync::{ConversationFeed, FeedSnapshot};
use tokio::time::{sleep, timeout};

const CONV: &str = "conv1";
const USER: &str = "userA";
const PEER: &str = "userB";

async fn open_feed(store: &InMemoryMessageStore, user: &str) -> ConversationFeed {
    ConversationFeed::open(
        Arc::new(store.clone()),
        Arc::new(StaticIdentity::new(user)),
        CONV,
    )
    .await
    .expect("Failed to open feed")
}

/// Waits until the snapshot satisfies the predicate, watching for updates.
async fn wait_for(
    feed: &ConversationFeed,
    what: &str,
    pred: impl Fn(&FeedSnapshot) -> bool,
) -> FeedSnapshot {
    let mut rx = feed.watch();
    timeout(Duration::from_secs(2), async {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if pred(&snapshot) {
                return snapshot;
            }
            rx.changed().await.expect("snapshot channel closed");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", what))
}

fn peer_message(content: &str) -> NewMessage {
    NewMessage {
        conversation_id: CONV.to_string(),
        sender_id: PEER.to_string(),
        content: content.to_string(),
    }
}

/// **Test: Opening a feed loads confirmed history in order.**
///
/// **Setup:** Store with two pre-existing messages (peer first, then user).
/// **Action:** `ConversationFeed::open`.
/// **Expected:** Not loading; both messages present, ascending by creation
/// time, no status markers.
#[tokio::test]
async fn test_open_loads_history() {
    let store = InMemoryMessageStore::new();
    store
        .insert_message(peer_message("hello"))
        .await
        .expect("Failed to insert");
    store
        .insert_message(NewMessage {
            conversation_id: CONV.to_string(),
            sender_id: USER.to_string(),
            content: "hi back".to_string(),
        })
        .await
        .expect("Failed to insert");

    let feed = open_feed(&store, USER).await;

    assert!(!feed.is_loading());
    let messages = feed.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "hello");
    assert_eq!(messages[1].content, "hi back");
    assert!(messages.iter().all(|m| m.status.is_none()));
    assert!(messages[0].created_at <= messages[1].created_at);

    feed.close().await;
}

/// **Test: Send stages the message synchronously.**
///
/// **Setup:** Feed over an empty store.
/// **Action:** `send("hello")`, then inspect the snapshot with no await in
/// between.
/// **Expected:** One entry with the sent content, `Sending` status, no server
/// id, authored by the current user.
#[tokio::test]
async fn test_send_is_optimistically_visible() {
    let store = InMemoryMessageStore::new();
    let feed = open_feed(&store, USER).await;

    let temp_id = feed.send("hello").expect("send rejected");

    // No await since send: the append task cannot have run yet.
    let snapshot = feed.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    let staged = &snapshot.messages[0];
    assert_eq!(staged.content, "hello");
    assert!(staged.is_sending());
    assert_eq!(staged.id, None);
    assert_eq!(staged.sender_id, USER);
    assert_eq!(staged.temp_id.as_deref(), Some(temp_id.as_str()));

    feed.close().await;
}

/// **Test: Confirmation replaces the pending entry, no duplicate.**
///
/// **Setup:** Feed over an empty store.
/// **Action:** `send("hello")`, wait for the append and feed echo to settle.
/// **Expected:** Exactly one entry with that content; it has a server id and
/// no status marker.
#[tokio::test]
async fn test_confirmation_does_not_duplicate() {
    let store = InMemoryMessageStore::new();
    let feed = open_feed(&store, USER).await;

    let temp_id = feed.send("hello").expect("send rejected");

    let snapshot = wait_for(&feed, "confirmation", |s| {
        s.messages.len() == 1 && s.messages[0].id.is_some() && s.messages[0].status.is_none()
    })
    .await;

    assert_eq!(snapshot.messages[0].content, "hello");
    assert_eq!(snapshot.messages[0].temp_id.as_deref(), Some(temp_id.as_str()));
    assert_eq!(store.len().await, 1);

    feed.close().await;
}

/// **Test: Rapid sends keep their staged order through confirmation.**
///
/// **Setup:** Feed over an empty store.
/// **Action:** `send("a")` then `send("b")`; wait until both are confirmed.
/// **Expected:** Order stays `[a, b]`.
#[tokio::test]
async fn test_rapid_sends_preserve_order() {
    let store = InMemoryMessageStore::new();
    let feed = open_feed(&store, USER).await;

    feed.send("a").expect("send rejected");
    feed.send("b").expect("send rejected");

    let snapshot = wait_for(&feed, "both confirmations", |s| {
        s.messages.len() == 2 && s.messages.iter().all(|m| m.id.is_some() && m.status.is_none())
    })
    .await;

    let contents: Vec<&str> = snapshot.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["a", "b"]);

    feed.close().await;
}

/// **Test: Two identical sends confirm without merging into one.**
///
/// **Setup:** Feed over an empty store.
/// **Action:** `send("dup")` twice; wait until both are confirmed.
/// **Expected:** Two entries remain, staged order preserved, with distinct
/// server ids.
#[tokio::test]
async fn test_identical_sends_stay_distinct() {
    let store = InMemoryMessageStore::new();
    let feed = open_feed(&store, USER).await;

    let first = feed.send("dup").expect("send rejected");
    let second = feed.send("dup").expect("send rejected");

    let snapshot = wait_for(&feed, "both confirmations", |s| {
        s.messages.len() == 2 && s.messages.iter().all(|m| m.id.is_some() && m.status.is_none())
    })
    .await;

    assert_eq!(snapshot.messages[0].temp_id.as_deref(), Some(first.as_str()));
    assert_eq!(snapshot.messages[1].temp_id.as_deref(), Some(second.as_str()));
    assert_ne!(snapshot.messages[0].id, snapshot.messages[1].id);
    assert_eq!(store.len().await, 2);

    feed.close().await;
}

/// **Test: One failed append does not affect other pending entries.**
///
/// **Setup:** Store set to fail the next insert.
/// **Action:** `send("doomed")`, wait for the error; then `send("fine")` and
/// wait for its confirmation.
/// **Expected:** "doomed" is in error state, "fine" confirms normally.
#[tokio::test]
async fn test_failure_is_isolated_per_entry() {
    let store = InMemoryMessageStore::new();
    let feed = open_feed(&store, USER).await;

    store.fail_next_inserts(1);
    let doomed = feed.send("doomed").expect("send rejected");
    wait_for(&feed, "append failure", |s| {
        s.messages.iter().any(|m| m.is_failed())
    })
    .await;

    feed.send("fine").expect("send rejected");
    let snapshot = wait_for(&feed, "second confirmation", |s| {
        s.messages
            .iter()
            .any(|m| m.content == "fine" && m.id.is_some() && m.status.is_none())
    })
    .await;

    assert_eq!(snapshot.messages.len(), 2);
    let failed = snapshot
        .messages
        .iter()
        .find(|m| m.temp_id.as_deref() == Some(doomed.as_str()))
        .expect("failed entry missing");
    assert!(failed.is_failed());
    assert_eq!(failed.id, None);

    feed.close().await;
}

/// **Test: Retry of a failed entry reconciles like a fresh send.**
///
/// **Setup:** Store fails the first insert; one failed entry in the feed.
/// **Action:** `retry(temp_id)`; wait for confirmation. Also retry an unknown
/// id.
/// **Expected:** The single entry ends confirmed with a server id; the
/// unknown retry is a silent no-op.
#[tokio::test]
async fn test_retry_reconciles_failed_entry() {
    let store = InMemoryMessageStore::new();
    let feed = open_feed(&store, USER).await;

    store.fail_next_inserts(1);
    let temp_id = feed.send("hi").expect("send rejected");
    wait_for(&feed, "append failure", |s| {
        s.messages.iter().any(|m| m.is_failed())
    })
    .await;

    feed.retry(&temp_id);
    let snapshot = wait_for(&feed, "retry confirmation", |s| {
        s.messages.len() == 1 && s.messages[0].id.is_some() && s.messages[0].status.is_none()
    })
    .await;
    assert_eq!(snapshot.messages[0].content, "hi");

    feed.retry("not-a-temp-id");
    assert_eq!(feed.messages().len(), 1);

    feed.close().await;
}

/// **Test: Dismiss removes a failed entry permanently and is idempotent.**
///
/// **Setup:** Store fails the first insert; one failed entry in the feed.
/// **Action:** `dismiss(temp_id)` twice; also dismiss a still-sending entry.
/// **Expected:** The failed entry is gone after the first call; the second
/// call and the dismiss of a non-failed entry are no-ops.
#[tokio::test]
async fn test_dismiss_is_final_and_idempotent() {
    let store = InMemoryMessageStore::new();
    let feed = open_feed(&store, USER).await;

    store.fail_next_inserts(1);
    let temp_id = feed.send("bye").expect("send rejected");
    wait_for(&feed, "append failure", |s| {
        s.messages.iter().any(|m| m.is_failed())
    })
    .await;

    feed.dismiss(&temp_id);
    assert!(feed.messages().is_empty());

    feed.dismiss(&temp_id); // no-op, must not panic
    assert!(feed.messages().is_empty());

    // A sending entry is not dismissible.
    let keep = feed.send("keep").expect("send rejected");
    feed.dismiss(&keep);
    assert_eq!(feed.messages().len(), 1);

    feed.close().await;
}

/// **Test: Close releases the subscription and detaches the snapshot.**
///
/// **Setup:** Open feed over an empty store.
/// **Action:** `close()`, then insert a message directly into the store.
/// **Expected:** The store reports zero open subscriptions; the snapshot does
/// not change; a second `close()` is a no-op.
#[tokio::test]
async fn test_close_releases_subscription() {
    let store = InMemoryMessageStore::new();
    let feed = open_feed(&store, USER).await;
    assert_eq!(store.active_subscriptions(), 1);

    feed.close().await;
    assert_eq!(store.active_subscriptions(), 0);

    store
        .insert_message(peer_message("after close"))
        .await
        .expect("Failed to insert");
    sleep(Duration::from_millis(50)).await;
    assert!(feed.messages().is_empty());

    feed.close().await; // idempotent
    assert_eq!(store.active_subscriptions(), 0);
}

/// **Test: Messages from the counterpart arrive through the live feed.**
///
/// **Setup:** Open feed as userA.
/// **Action:** Insert a message from userB directly into the store.
/// **Expected:** It appears in the snapshot as a confirmed entry.
#[tokio::test]
async fn test_counterpart_messages_arrive() {
    let store = InMemoryMessageStore::new();
    let feed = open_feed(&store, USER).await;

    store
        .insert_message(peer_message("hey"))
        .await
        .expect("Failed to insert");

    let snapshot = wait_for(&feed, "counterpart message", |s| s.messages.len() == 1).await;
    assert_eq!(snapshot.messages[0].sender_id, PEER);
    assert!(snapshot.messages[0].status.is_none());

    feed.close().await;
}

/// **Test: Whitespace-only content is rejected before staging.**
///
/// **Setup:** Open feed over an empty store.
/// **Action:** `send("   ")`.
/// **Expected:** `EmptyContent` error; nothing staged.
#[tokio::test]
async fn test_empty_content_is_rejected() {
    let store = InMemoryMessageStore::new();
    let feed = open_feed(&store, USER).await;

    let err = feed.send("   ").expect_err("empty send accepted");
    assert!(matches!(err, ConvoError::EmptyContent));
    assert!(feed.messages().is_empty());

    feed.close().await;
}

/// **Test: Opening without a signed-in user fails.**
///
/// **Setup:** Anonymous identity provider.
/// **Action:** `ConversationFeed::open`.
/// **Expected:** `Identity` error; no subscription left open.
#[tokio::test]
async fn test_open_requires_identity() {
    let store = InMemoryMessageStore::new();
    let result = ConversationFeed::open(
        Arc::new(store.clone()),
        Arc::new(StaticIdentity::anonymous()),
        CONV,
    )
    .await;

    assert!(matches!(result, Err(ConvoError::Identity)));
    assert_eq!(store.active_subscriptions(), 0);
}

/// **Test: A failed history load aborts open and releases the subscription.**
///
/// **Setup:** Store set to fail the next `list_messages` call.
/// **Action:** `ConversationFeed::open`, then open again once the failure is
/// consumed.
/// **Expected:** The first open returns a load error and leaves no
/// subscription registered; the second open succeeds.
#[tokio::test]
async fn test_open_surfaces_history_load_failure() {
    let store = InMemoryMessageStore::new();
    store.fail_next_lists(1);

    let result = ConversationFeed::open(
        Arc::new(store.clone()),
        Arc::new(StaticIdentity::new(USER)),
        CONV,
    )
    .await;

    assert!(matches!(result, Err(ConvoError::Load(_))));
    assert_eq!(store.active_subscriptions(), 0);

    let feed = open_feed(&store, USER).await;
    assert!(!feed.is_loading());
    assert_eq!(store.active_subscriptions(), 1);
    feed.close().await;
}
