//! Event-sourcing and scheduling properties of the cart aggregate.

use actor_runtime::mock::{AppendRecord, RecordingEventStore, RecordingReminderService, Registration};
use actor_runtime::{
    fold_all, ActivationFailurePolicy, ActorId, Aggregate, EventStore, InMemoryEventStore,
    ReminderKey, RuntimeConfig, HEARTBEAT_PERIOD, NO_STREAM,
};
use cart_sample::cart_actor::{ABANDONED_CART_CHECK, ABANDONED_CHECK_PERIOD};
use cart_sample::lifecycle::CartSystem;
use cart_sample::model::{Cart, CartAbandoned, CartEvent, CartLine};
use std::sync::Arc;
use std::time::Duration;

fn cart_id(key: &str) -> ActorId {
    ActorId::of::<Aggregate<Cart>>(key)
}

fn system_with(store: Arc<RecordingEventStore<CartEvent>>) -> CartSystem {
    CartSystem::builder(RuntimeConfig::default())
        .store(store)
        .stock("X", 10)
        .build()
        .expect("Failed to build cart system")
}

/// Cart-1 with no prior events receives AddItem(X, 2).
#[tokio::test]
async fn test_first_add_item_appends_at_version_zero() {
    let store = Arc::new(RecordingEventStore::<CartEvent>::new());
    let system = system_with(store.clone());
    assert_eq!(store.version("Cart-1"), NO_STREAM);

    let view = system
        .carts
        .add_item("1", "X", 2)
        .await
        .expect("Failed to add item");

    assert_eq!(view.version, 0);
    assert_eq!(view.items, vec![CartLine::new("X", 2)]);
    assert_eq!(
        store.appends(),
        vec![AppendRecord {
            stream: "Cart-1".into(),
            expected_version: -1,
            count: 1,
            accepted: true,
        }]
    );
    assert_eq!(store.loads(), vec!["Cart-1".to_string()]);
    assert_eq!(
        store.events("Cart-1"),
        vec![CartEvent::ItemAdded {
            sku: "X".into(),
            qty: 2,
        }]
    );
}

/// State after a sequence of commands equals the fold of the recorded events.
#[tokio::test]
async fn test_state_is_the_fold_of_the_stream() {
    let store = Arc::new(RecordingEventStore::<CartEvent>::new());
    let system = system_with(store.clone());

    system.carts.add_item("1", "X", 2).await.unwrap();
    system.carts.add_item("1", "Y", 1).await.unwrap();
    system.carts.remove_item("1", "X", 1).await.unwrap();
    system.carts.add_item("1", "Z", 3).await.unwrap();
    let view = system.carts.remove_item("1", "Y", 1).await.unwrap();

    let folded = fold_all(&store.events("Cart-1"));
    assert_eq!(view.items, folded.items);
    assert_eq!(view.items, vec![CartLine::new("X", 1), CartLine::new("Z", 3)]);
    assert_eq!(view.version, 4);
}

/// Deactivate and reactivate: the reloaded aggregate matches the old one.
#[tokio::test]
async fn test_reactivation_restores_committed_state() {
    let store = Arc::new(RecordingEventStore::<CartEvent>::new());
    let system = system_with(store.clone());

    for (sku, qty) in [("X", 1), ("Y", 2), ("X", 3), ("Z", 1), ("W", 5)] {
        system.carts.add_item("1", sku, qty).await.unwrap();
    }
    let before = system.carts.get("1").await.unwrap();

    let host = system
        .runtime()
        .host::<Aggregate<Cart>>()
        .expect("Cart host missing");
    assert!(host.deactivate("1").await);

    let after = system.carts.get("1").await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after.version, 4);
    assert_eq!(store.loads().len(), 2);

    let store: Arc<dyn EventStore<CartEvent>> = store;
    let reloaded = Aggregate::<Cart>::load(cart_id("1"), store, ActivationFailurePolicy::Fail)
        .await
        .expect("Failed to load cart");
    assert_eq!(reloaded.original().len(), 5);
    assert!(reloaded.changes().is_empty());
    assert_eq!(reloaded.state().items, before.items);
}

/// Cart-1 at version 0 receives two concurrent AddItem calls, on two nodes
/// that both loaded version 0.
#[tokio::test]
async fn test_concurrent_turns_conflict_and_loser_is_discarded() {
    let store = Arc::new(InMemoryEventStore::<CartEvent>::new());
    let node_a = CartSystem::builder(RuntimeConfig::default().with_node_name("a"))
        .store(store.clone())
        .build()
        .expect("Failed to build node a");
    let node_b = CartSystem::builder(RuntimeConfig::default().with_node_name("b"))
        .store(store.clone())
        .build()
        .expect("Failed to build node b");

    node_a.carts.add_item("1", "X", 2).await.unwrap();
    let loaded = node_b.carts.get("1").await.unwrap();
    assert_eq!(loaded.version, 0);

    let (from_a, from_b) = tokio::join!(
        node_a.carts.add_item("1", "Y", 1),
        node_b.carts.add_item("1", "Z", 1),
    );

    let (winner, loser, losing_sku) = match (from_a, from_b) {
        (Ok(view), Err(error)) => (view, error, "Z"),
        (Err(error), Ok(view)) => (view, error, "Y"),
        (a, b) => panic!("Expected exactly one success, got {a:?} and {b:?}"),
    };
    assert_eq!(winner.version, 1);
    assert!(loser.is_concurrency_conflict());

    let events = store.events("Cart-1");
    assert_eq!(events.len(), 2);
    assert!(!fold_all(&events).items.iter().any(|line| line.sku == losing_sku));

    // The losing node reloads on the next message and can resubmit.
    let retry = if losing_sku == "Z" {
        node_b.carts.add_item("1", "Z", 1).await
    } else {
        node_a.carts.add_item("1", "Y", 1).await
    };
    let retry = retry.expect("Resubmission failed");
    assert_eq!(retry.version, 2);
    assert_eq!(retry.items.len(), 3);
}

/// The 30s abandoned-cart check runs on a local timer with a heartbeat, and
/// the heartbeat brings the timer back after deactivation.
#[tokio::test(start_paused = true)]
async fn test_abandoned_cart_check_is_promoted_to_timer() {
    let reminders = Arc::new(RecordingReminderService::new());
    let system = CartSystem::builder(RuntimeConfig::default())
        .reminders(reminders.clone())
        .build()
        .expect("Failed to build cart system");
    let id = cart_id("1");

    system.carts.add_item("1", "X", 2).await.unwrap();
    let heartbeat = ReminderKey::heartbeat(ABANDONED_CART_CHECK, ABANDONED_CHECK_PERIOD);
    assert_eq!(
        reminders.registered(&id),
        vec![Registration {
            key: heartbeat.clone(),
            due: HEARTBEAT_PERIOD,
            period: HEARTBEAT_PERIOD,
        }]
    );

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(
        system.ledger().abandoned(),
        vec![CartAbandoned {
            cart_id: "1".into(),
            items: 2,
        }]
    );

    let host = system
        .runtime()
        .host::<Aggregate<Cart>>()
        .expect("Cart host missing");
    assert!(host.deactivate("1").await);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(system.ledger().abandoned().len(), 1);

    reminders.fire(&id, heartbeat).await;
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(host.is_active("1").await);
    assert_eq!(system.ledger().abandoned().len(), 2);
}

/// ClearCart sends RemoveItem to its own cart; the sends are interleaved and
/// each one commits on its own.
#[tokio::test]
async fn test_clear_cart_self_sends_do_not_deadlock() {
    let store = Arc::new(RecordingEventStore::<CartEvent>::new());
    let system = system_with(store.clone());

    system.carts.add_item("1", "X", 2).await.unwrap();
    system.carts.add_item("1", "Y", 1).await.unwrap();

    let cleared = tokio::time::timeout(Duration::from_secs(5), system.carts.clear("1"))
        .await
        .expect("ClearCart deadlocked")
        .expect("ClearCart failed");
    assert!(cleared.items.is_empty());
    assert_eq!(cleared.version, 3);

    let expected: Vec<i64> = store
        .appends()
        .iter()
        .map(|append| append.expected_version)
        .collect();
    assert_eq!(expected, vec![-1, 0, 1, 2]);
    assert!(fold_all(&store.events("Cart-1")).is_empty());
}
