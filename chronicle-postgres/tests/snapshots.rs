//! Integration tests for the snapshot lifecycle.

mod common;

use chrono::{Duration, Utc};
use chronicle_core::snapshot::Snapshot;
use common::{TestDb, command, commit, descriptor, my_event, my_event_at};
use uuid::Uuid;

fn snapshot(aggregate_id: Uuid, sequence_number: i32) -> Snapshot {
    Snapshot::new(
        aggregate_id,
        sequence_number,
        "test-aggregate",
        &serde_json::json!({"upto": sequence_number}),
    )
    .unwrap()
}

#[tokio::test]
async fn storing_a_snapshot_takes_the_aggregate_out_of_the_needs_set() {
    let db = TestDb::new().await;
    let store = db.store().await;
    common::register_event_types();

    let aggregate_id = Uuid::new_v4();
    store
        .commit_events(&command(aggregate_id, "create"), vec![(
            descriptor(aggregate_id).mark_snapshot_outdated(),
            vec![my_event(aggregate_id, 1, "one")],
        )])
        .await
        .unwrap();

    let needing = store
        .aggregates_that_need_snapshots(None, None)
        .await
        .unwrap();
    assert!(needing.contains(&aggregate_id));

    store
        .store_snapshots(&[snapshot(aggregate_id, 1)])
        .await
        .unwrap();

    let needing = store
        .aggregates_that_need_snapshots(None, None)
        .await
        .unwrap();
    assert!(!needing.contains(&aggregate_id));

    let latest = store
        .load_latest_snapshot(aggregate_id)
        .await
        .unwrap()
        .expect("just stored");
    assert_eq!(latest.sequence_number, 1);
}

#[tokio::test]
async fn load_latest_snapshot_picks_the_highest_sequence() {
    let db = TestDb::new().await;
    let store = db.store().await;
    common::register_event_types();

    let aggregate_id = Uuid::new_v4();
    commit(&store, aggregate_id, vec![
        my_event(aggregate_id, 1, "one"),
        my_event(aggregate_id, 2, "two"),
    ])
    .await;
    store
        .store_snapshots(&[snapshot(aggregate_id, 1), snapshot(aggregate_id, 2)])
        .await
        .unwrap();

    let latest = store
        .load_latest_snapshot(aggregate_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.sequence_number, 2);
    assert_eq!(latest.payload["upto"], 2);

    assert!(
        store
            .load_latest_snapshot(Uuid::new_v4())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn delete_all_snapshots_remarks_only_aggregates_with_events() {
    let db = TestDb::new().await;
    let store = db.store().await;
    common::register_event_types();

    let with_events = Uuid::new_v4();
    commit(&store, with_events, vec![my_event(with_events, 1, "one")]).await;
    store
        .store_snapshots(&[snapshot(with_events, 1)])
        .await
        .unwrap();

    // A stream that never produced events cannot need a snapshot.
    let without_events = Uuid::new_v4();
    store
        .commit_events(&command(without_events, "create-empty"), vec![(
            descriptor(without_events),
            Vec::new(),
        )])
        .await
        .unwrap();
    store
        .store_snapshots(&[snapshot(without_events, 1)])
        .await
        .unwrap();

    store.delete_all_snapshots().await.unwrap();

    assert!(store.load_latest_snapshot(with_events).await.unwrap().is_none());
    let needing = store
        .aggregates_that_need_snapshots(None, None)
        .await
        .unwrap();
    assert!(needing.contains(&with_events));
    assert!(!needing.contains(&without_events));
}

#[tokio::test]
async fn delete_snapshots_before_remarks_once_the_last_snapshot_is_gone() {
    let db = TestDb::new().await;
    let store = db.store().await;
    common::register_event_types();

    let aggregate_id = Uuid::new_v4();
    commit(&store, aggregate_id, vec![
        my_event(aggregate_id, 1, "one"),
        my_event(aggregate_id, 2, "two"),
    ])
    .await;
    store
        .store_snapshots(&[snapshot(aggregate_id, 1), snapshot(aggregate_id, 2)])
        .await
        .unwrap();

    store.delete_snapshots_before(aggregate_id, 2).await.unwrap();
    let needing = store
        .aggregates_that_need_snapshots(None, None)
        .await
        .unwrap();
    assert!(
        !needing.contains(&aggregate_id),
        "a snapshot at sequence 2 survives"
    );

    store.delete_snapshots_before(aggregate_id, 3).await.unwrap();
    let needing = store
        .aggregates_that_need_snapshots(None, None)
        .await
        .unwrap();
    assert!(needing.contains(&aggregate_id));
}

#[tokio::test]
async fn mark_and_clear_toggle_the_needs_set_and_clear_drops_snapshots() {
    let db = TestDb::new().await;
    let store = db.store().await;
    common::register_event_types();

    let aggregate_id = Uuid::new_v4();
    commit(&store, aggregate_id, vec![my_event(aggregate_id, 1, "one")]).await;
    store
        .store_snapshots(&[snapshot(aggregate_id, 1)])
        .await
        .unwrap();

    store
        .mark_aggregate_for_snapshotting(aggregate_id)
        .await
        .unwrap();
    assert!(
        store
            .aggregates_that_need_snapshots(None, None)
            .await
            .unwrap()
            .contains(&aggregate_id)
    );

    store
        .clear_aggregate_for_snapshotting(aggregate_id)
        .await
        .unwrap();
    assert!(
        !store
            .aggregates_that_need_snapshots(None, None)
            .await
            .unwrap()
            .contains(&aggregate_id)
    );
    assert!(
        store
            .load_latest_snapshot(aggregate_id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn needs_snapshots_pages_in_id_order_and_prioritises_oldest_flags() {
    let db = TestDb::new().await;
    let store = db.store().await;
    common::register_event_types();

    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    commit(&store, first, vec![my_event(first, 1, "a")]).await;
    commit(&store, second, vec![my_event(second, 1, "b")]).await;

    store.mark_aggregate_for_snapshotting(first).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    store.mark_aggregate_for_snapshotting(second).await.unwrap();

    let by_id = store
        .aggregates_that_need_snapshots(None, Some(10))
        .await
        .unwrap();
    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(by_id, expected);

    // Paging strictly after the first id yields only the second.
    let page = store
        .aggregates_that_need_snapshots(Some(expected[0]), Some(10))
        .await
        .unwrap();
    assert_eq!(page, vec![expected[1]]);

    let limited = store
        .aggregates_that_need_snapshots(None, Some(1))
        .await
        .unwrap();
    assert_eq!(limited, vec![expected[0]]);

    // Priority order follows the outdated timestamps, not the ids.
    let by_priority = store
        .aggregates_that_need_snapshots_ordered_by_priority(Some(10))
        .await
        .unwrap();
    assert_eq!(by_priority, vec![first, second]);
}

#[tokio::test]
async fn cold_aggregates_are_cleared_by_the_time_based_sweep() {
    let db = TestDb::new().await;
    let store = db.store().await;
    common::register_event_types();

    let cold = Uuid::new_v4();
    let warm = Uuid::new_v4();
    let old = Utc::now() - Duration::hours(2);
    commit(&store, cold, vec![my_event_at(cold, 1, old, "old")]).await;
    commit(&store, warm, vec![my_event(warm, 1, "fresh")]).await;

    store.mark_aggregate_for_snapshotting(cold).await.unwrap();
    store.mark_aggregate_for_snapshotting(warm).await.unwrap();

    let cleared = store
        .clear_aggregates_for_snapshotting_with_last_event_before(Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(cleared, 1);

    let needing = store
        .aggregates_that_need_snapshots(None, None)
        .await
        .unwrap();
    assert!(!needing.contains(&cold));
    assert!(needing.contains(&warm));
}
