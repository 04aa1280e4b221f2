//! PostgreSQL-backed event-sourcing storage engine.
//!
//! This crate provides [`Store`], the durable half of chronicle:
//!
//! - transactional commits of commands and their events, with optimistic
//!   locking on the `(aggregate_id, sequence_number)` primary key
//! - stream loading from the latest snapshot, safe against concurrent
//!   partition-key changes
//! - snapshot bookkeeping (`snapshot_outdated_at` lifecycle)
//! - audited deletion (`saved_event_records` shadow table)
//! - chunked cursor replay for rebuilding read models
//!
//! Committed events are handed to the per-thread
//! [`EventPublisher`](chronicle_core::publisher::EventPublisher) after the
//! database transaction commits; replay dispatches to the configured handlers
//! directly, bypassing the publisher queue.

mod error;
mod store;

pub use error::Error;
pub use store::{ReplayRow, ReplayStream, Store};
