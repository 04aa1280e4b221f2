//! Shared fixtures for the integration tests.
//!
//! These tests require Docker to be running; each test spins up its own
//! `PostgreSQL` container via testcontainers.
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use chronicle_core::{
    command::Command,
    config::Configuration,
    event::{Event, EventPayload},
    stream::StreamDescriptor,
};
use chronicle_postgres::Store;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;

/// A throwaway database with the chronicle schema applied.
pub struct TestDb {
    _container: ContainerAsync<Postgres>,
    pub pool: PgPool,
}

impl TestDb {
    pub async fn new() -> Self {
        // The schema needs pg_current_xact_id and CREATE OR REPLACE TRIGGER.
        let container = Postgres::default().with_tag("16-alpine").start().await.unwrap();
        let host = container.get_host().await.unwrap();
        let port = container.get_host_port_ipv4(5432).await.unwrap();

        let connection_string = format!("postgres://postgres:postgres@{host}:{port}/postgres");
        let pool = PgPool::connect(&connection_string).await.unwrap();

        Self {
            _container: container,
            pool,
        }
    }

    /// Build a store on this database and apply the schema.
    pub async fn store(&self) -> Store {
        let store = Store::new(self.pool.clone());
        store.migrate().await.unwrap();
        store
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MyEvent {
    pub data: String,
}

impl EventPayload for MyEvent {
    const TYPE: &'static str = "my-event";
}

/// Register the shared test payloads with the installed configuration's
/// registry. Registration is additive and idempotent, so parallel tests can
/// call this freely.
pub fn register_event_types() {
    Configuration::current().event_types.register::<MyEvent>();
}

pub fn my_event(aggregate_id: Uuid, sequence_number: i32, data: &str) -> Event {
    my_event_at(aggregate_id, sequence_number, Utc::now(), data)
}

pub fn my_event_at(
    aggregate_id: Uuid,
    sequence_number: i32,
    created_at: DateTime<Utc>,
    data: &str,
) -> Event {
    Event::new(
        aggregate_id,
        sequence_number,
        created_at,
        MyEvent {
            data: data.to_string(),
        },
    )
    .unwrap()
}

pub fn command(aggregate_id: Uuid, command_type: &str) -> Command {
    Command::new(command_type, &serde_json::json!({}))
        .unwrap()
        .for_aggregate(aggregate_id)
}

pub fn descriptor(aggregate_id: Uuid) -> StreamDescriptor {
    StreamDescriptor::new(aggregate_id, "test-aggregate")
}

/// Commit a batch of events for one aggregate with a fresh command.
pub async fn commit(store: &Store, aggregate_id: Uuid, events: Vec<Event>) {
    store
        .commit_events(&command(aggregate_id, "test-command"), vec![(
            descriptor(aggregate_id),
            events,
        )])
        .await
        .unwrap();
}
