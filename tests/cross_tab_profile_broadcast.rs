//! Two `ConfigStore`s sharing one `BroadcastBus`, simulating two host tabs:
//! a save in one must reach the other's subscription but never echo back to
//! the tab that originated it.

use queue_engine::broadcast::{BroadcastBus, BusMessage, Origin};
use queue_engine::config::store::ConfigStore;
use queue_engine::config::Profile;

#[tokio::test]
async fn save_in_one_tab_is_observed_by_another_but_not_the_originator() {
    let dir = tempfile::tempdir().unwrap();
    let bus = BroadcastBus::new();

    let tab_a_id: u64 = 1;
    let tab_b_id: u64 = 2;
    let store_a = ConfigStore::with_bus(dir.path(), bus.clone()).await.unwrap();
    let store_b = ConfigStore::with_bus(dir.path(), bus.clone()).await.unwrap();

    let mut sub_a = bus.subscribe(tab_a_id);
    let mut sub_b = bus.subscribe(tab_b_id);

    // The active profile ("Default") changes from tab A, excluding itself.
    let mut profile = store_a.get_config().await.unwrap();
    profile.queue_delay_minutes = 42;
    store_a
        .save_config("Default", profile, Origin::Inline, Some(tab_a_id))
        .await
        .unwrap();

    let received = sub_b.recv().await.unwrap();
    match received {
        BusMessage::ProfileChanged { profile_name, origin } => {
            assert_eq!(profile_name, "Default");
            assert_eq!(origin, Origin::Inline);
        }
        other => panic!("unexpected message: {other:?}"),
    }

    let result = tokio::time::timeout(std::time::Duration::from_millis(50), sub_a.recv()).await;
    assert!(result.is_err(), "originating tab must not receive its own broadcast");

    // Both stores observe the same persisted value regardless of which tab wrote it.
    let reloaded = store_b.get_config().await.unwrap();
    assert_eq!(reloaded.queue_delay_minutes, 42);
}

#[tokio::test]
async fn saving_non_active_profile_does_not_broadcast() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::open(dir.path()).await.unwrap();
    let mut sub = store.bus().subscribe(1);

    let mut other = Profile::default_named();
    other.name = "Archived".to_string();
    store.save_config("Archived", other, Origin::Panel, None).await.unwrap();

    let result = tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv()).await;
    assert!(result.is_err(), "saving an inactive profile must not broadcast");
}
