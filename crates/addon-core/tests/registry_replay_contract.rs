//! Contract Test: Registry Replay
//!
//! Verifies that `addons.txt` written by one registry reads back, after a
//! restart, exactly as replaying the same operations on an empty list.
//!
//! Constraints verified:
//! - Order is insertion order and survives restarts
//! - Adds are idempotent; removes of absent names are no-ops
//! - The update helper line survives every rewrite but is never returned

use addon_core::registry::{InstalledSetRegistry, UPDATE_HELPER_NAME};
use tempfile::tempdir;

#[derive(Debug, Clone, Copy)]
enum Op {
    Add(&'static str),
    Remove(&'static str),
}

fn replay(ops: &[Op]) -> Vec<String> {
    let mut model: Vec<String> = Vec::new();
    for op in ops {
        match op {
            Op::Add(name) => {
                if !model.iter().any(|line| line == name) {
                    model.push(name.to_string());
                }
            }
            Op::Remove(name) => model.retain(|line| line != name),
        }
    }
    model
}

async fn apply(registry: &InstalledSetRegistry, ops: &[Op]) {
    for op in ops {
        match op {
            Op::Add(name) => registry.add(name).await.unwrap(),
            Op::Remove(name) => registry.remove(name).await.unwrap(),
        }
    }
}

#[tokio::test]
async fn restart_reads_back_the_replayed_sequence() {
    let sequences: Vec<Vec<Op>> = vec![
        vec![Op::Add("A"), Op::Add("B"), Op::Add("C")],
        vec![Op::Add("A"), Op::Add("A"), Op::Remove("A"), Op::Add("A")],
        vec![
            Op::Add("Raid_Frames"),
            Op::Add("Chat"),
            Op::Remove("Missing"),
            Op::Add("Nameplates"),
            Op::Remove("Chat"),
            Op::Add("Chat"),
        ],
        vec![Op::Remove("A"), Op::Add("B"), Op::Remove("B")],
    ];

    for ops in sequences {
        let dir = tempdir().unwrap();

        let registry = InstalledSetRegistry::in_dir(dir.path());
        registry.create().await.unwrap();
        apply(&registry, &ops).await;
        drop(registry);

        let restarted = InstalledSetRegistry::in_dir(dir.path());
        let loaded = restarted.load().await.unwrap();
        assert_eq!(loaded, replay(&ops), "sequence {:?}", ops);
        assert_eq!(restarted.names().await, loaded);
    }
}

#[tokio::test]
async fn helper_line_survives_restarts_and_stays_hidden() {
    let dir = tempdir().unwrap();

    let registry = InstalledSetRegistry::in_dir(dir.path());
    registry.create().await.unwrap();
    registry.add("A").await.unwrap();
    registry.add(UPDATE_HELPER_NAME).await.unwrap();
    registry.add("B").await.unwrap();
    registry.remove("A").await.unwrap();

    let restarted = InstalledSetRegistry::in_dir(dir.path());
    assert_eq!(restarted.load().await.unwrap(), vec!["B"]);

    restarted.add("C").await.unwrap();
    let on_disk = std::fs::read_to_string(restarted.path()).unwrap();
    assert_eq!(on_disk, format!("{}\nB\nC", UPDATE_HELPER_NAME));
}

#[tokio::test]
async fn concurrent_adds_all_land_once() {
    let dir = tempdir().unwrap();
    let registry = std::sync::Arc::new(InstalledSetRegistry::in_dir(dir.path()));
    registry.create().await.unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..16 {
        let registry = std::sync::Arc::clone(&registry);
        tasks.spawn(async move {
            let name = format!("Addon_{}", i % 8);
            registry.add(&name).await.unwrap();
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    let restarted = InstalledSetRegistry::in_dir(dir.path());
    let mut loaded = restarted.load().await.unwrap();
    assert_eq!(loaded.len(), 8);
    loaded.sort();
    loaded.dedup();
    assert_eq!(loaded.len(), 8);
}
