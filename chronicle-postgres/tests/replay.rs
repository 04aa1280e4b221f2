//! Integration tests for cursor-based replay against a real database.

mod common;

use std::sync::{Arc, Mutex};

use chronicle_core::{config::Configuration, handler::MessageHandler};
use common::{MyEvent, TestDb, commit, my_event};
use uuid::Uuid;

static GLOBAL_CONFIG: Mutex<()> = Mutex::new(());

#[tokio::test]
async fn replay_covers_every_event_with_block_progress() {
    let _guard = GLOBAL_CONFIG.lock().unwrap_or_else(|e| e.into_inner());
    let checkpoint = Configuration::current();

    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let handler = MessageHandler::builder("ReadModelBuilder")
        .on::<MyEvent, _>({
            let seen = Arc::clone(&seen);
            move |payload, _event| {
                seen.lock().unwrap().push(payload.data.clone());
                Ok(())
            }
        })
        .build();
    Configuration::configure(|config| config.event_handlers = vec![Arc::new(handler)]);
    common::register_event_types();

    let db = TestDb::new().await;
    let store = db.store().await;
    let aggregate_id = Uuid::new_v4();
    commit(
        &store,
        aggregate_id,
        (1..=5).map(|i| my_event(aggregate_id, i, &format!("e{i}"))).collect(),
    )
    .await;
    // The commit above already dispatched; replay must deliver again.
    seen.lock().unwrap().clear();

    let progress: Arc<Mutex<Vec<(u64, i64, Uuid)>>> = Arc::default();
    let total = store
        .replay_events_from_cursor(store.replay_cursor(None), 2, {
            let progress = Arc::clone(&progress);
            move |cumulative, last_xact_id, last_aggregate_id| {
                progress
                    .lock()
                    .unwrap()
                    .push((cumulative, last_xact_id, last_aggregate_id));
            }
        })
        .await
        .unwrap();

    assert_eq!(total, 5);
    assert_eq!(*seen.lock().unwrap(), vec!["e1", "e2", "e3", "e4", "e5"]);

    let progress = progress.lock().unwrap();
    let cumulative: Vec<u64> = progress.iter().map(|p| p.0).collect();
    assert_eq!(cumulative, vec![2, 4, 5]);
    for (_, xact_id, last_aggregate_id) in progress.iter() {
        assert!(*xact_id > 0, "xact_id comes from the committing transaction");
        assert_eq!(*last_aggregate_id, aggregate_id);
    }

    // Resuming strictly after the checkpointed aggregate finds nothing new.
    let resumed = store
        .replay_events_from_cursor(store.replay_cursor(Some(aggregate_id)), 2, |_, _, _| {
            panic!("no blocks expected after the checkpoint");
        })
        .await
        .unwrap();
    assert_eq!(resumed, 0);

    Configuration::restore(checkpoint);
}
