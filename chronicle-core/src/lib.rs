//! Core types for the chronicle event-sourcing engine.
//!
//! This crate provides the storage-agnostic half of chronicle:
//!
//! - [`event`] - The event envelope and payload typing (`Event`, `EventPayload`)
//! - [`command`] - The command record persisted alongside its events
//! - [`stream`] - Stream identity (`StreamDescriptor`, `StreamRecord`)
//! - [`snapshot`] - Materialized aggregate state at a sequence number
//! - [`registry`] - The `event_type -> deserializer` registry
//! - [`handler`] - Message handler dispatch (`MessageHandler`)
//! - [`publisher`] - Per-thread ordered event publication
//! - [`repository`] - The per-unit-of-work aggregate cache
//! - [`config`] - Process-wide configuration with save/restore
//!
//! Most users should depend on the `chronicle` crate, which re-exports these
//! types together with the PostgreSQL storage backend.

pub mod command;
pub mod config;
pub mod event;
pub mod handler;
pub mod publisher;
pub mod registry;
pub mod repository;
pub mod snapshot;
pub mod stream;
