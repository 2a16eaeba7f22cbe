//! Contract Test: Concurrent Update Check
//!
//! Verifies that the fan-out update check returns the same result no matter
//! which query finishes first, and that failures stay local to one add-on.
//!
//! Constraints verified:
//! - Only add-ons whose remote tag differs from the recorded version are returned
//! - The result does not depend on completion order
//! - A failing query skips that add-on without aborting the batch
//! - The bulk variant agrees with the per-add-on variant
//! - The manager writes the in-game notification for what it found

mod common;

use addon_core::checker::UpdateChecker;
use addon_core::engine::ManagerEvent;
use addon_core::types::InstalledAddon;
use addon_core::MemoryManagedStore;
use common::*;
use std::sync::Arc;

fn managed(name: &str, version: &str) -> InstalledAddon {
    let mut record = InstalledAddon::detected(name);
    record.version = version.to_string();
    record.is_managed = true;
    record
}

#[tokio::test]
async fn only_changed_versions_are_reported_in_any_completion_order() {
    // (delay for A, delay for B) in milliseconds
    let orders = [(0, 0), (40, 0), (0, 40), (25, 10), (10, 25)];

    for (delay_a, delay_b) in orders {
        let client = MockManifestClient::new();
        client.publish("A", "v1");
        client.publish("B", "v3");
        client.set_delay("A", delay_a);
        client.set_delay("B", delay_b);

        let checker = UpdateChecker::new(Arc::new(client.clone()));
        let updates = checker
            .check(vec![managed("A", "v1"), managed("B", "v2")])
            .await;

        assert_eq!(updates.len(), 1, "delays ({}, {})", delay_a, delay_b);
        assert_eq!(updates["B"].version, "v3");
        assert_eq!(updates["B"].alias, "B");
        assert_eq!(client.latest_call_count(), 2);
    }
}

#[tokio::test]
async fn failing_query_is_skipped() {
    let client = MockManifestClient::new();
    client.publish("A", "v2");
    client.publish("B", "v2");
    client.fail_releases_for("A");

    let checker = UpdateChecker::new(Arc::new(client.clone()));
    let updates = checker
        .check(vec![
            managed("A", "v1"),
            managed("B", "v1"),
            managed("Unpublished", "v1"),
        ])
        .await;

    assert_eq!(updates.keys().collect::<Vec<_>>(), vec!["B"]);
}

#[tokio::test]
async fn empty_local_version_counts_as_outdated() {
    let client = MockManifestClient::new();
    client.publish("A", "v1");

    let checker = UpdateChecker::new(Arc::new(client));
    let updates = checker.check(vec![managed("A", "")]).await;
    assert_eq!(updates["A"].version, "v1");
}

#[tokio::test]
async fn bulk_check_matches_per_addon_check() {
    let client = MockManifestClient::new();
    client.publish("A", "v1");
    client.publish("B", "v3");
    client.fail_releases_for("C");

    let checker = UpdateChecker::new(Arc::new(client.clone()));
    let addons = vec![managed("A", "v1"), managed("B", "v2"), managed("C", "v1")];

    let bulk = tokio_test::assert_ok!(checker.check_bulk(addons.clone()).await);
    let fanned = checker.check(addons).await;

    assert_eq!(bulk, fanned);
    assert_eq!(client.bulk_call_count(), 1);

    let empty = checker.check_bulk(Vec::new()).await.unwrap();
    assert!(empty.is_empty());
    assert_eq!(client.bulk_call_count(), 1, "no request for an empty batch");
}

#[tokio::test]
async fn manager_check_writes_notification_and_emits_event() {
    let env = TestEnv::new();
    let client = MockManifestClient::new();
    let fetcher = MockArchiveFetcher::new();
    let store = MemoryManagedStore::with_records([
        managed("Raid_Frames", "v1"),
        managed("Chat", "v1"),
        // Unmanaged records are never checked
        InstalledAddon::detected("Local_Tool"),
    ]);

    client.publish("Raid_Frames", "v2");
    client.publish("Chat", "v1");
    client.publish("Local_Tool", "v9");

    let (manager, mut events) = env.manager(&client, &fetcher, Box::new(store)).await;

    let updates = manager.check_for_updates().await.unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(client.latest_call_count(), 2);

    let helper = env.addon_dir().join("AddonUpdateNotification");
    let table = std::fs::read_to_string(helper.join("updates.lua")).unwrap();
    assert_eq!(
        table,
        "{\n    ['Raid_Frames'] = {name=\"Raid Frames\", version=\"v2\"},\n}\n"
    );
    assert_eq!(env.addons_txt(), "AddonUpdateNotification");
    assert!(manager.list_addons().await.unwrap().is_empty());

    assert!(drain_events(&mut events).contains(&ManagerEvent::UpdatesFound {
        names: vec!["Raid_Frames".to_string()],
    }));

    let bulk = manager.check_for_updates_bulk().await.unwrap();
    assert_eq!(bulk, updates);
}

#[tokio::test]
async fn notification_can_be_disabled() {
    let mut env = TestEnv::new();
    env.config.notify_updates = false;

    let client = MockManifestClient::new();
    client.publish("A", "v2");
    let store = MemoryManagedStore::with_records([managed("A", "v1")]);

    let (manager, _events) = env
        .manager(&client, &MockArchiveFetcher::new(), Box::new(store))
        .await;

    assert_eq!(manager.check_for_updates().await.unwrap().len(), 1);
    assert!(!env.addon_dir().join("AddonUpdateNotification").exists());
}
