#![doc = include_str!("../README.md")]

pub use chronicle_core::{
    command::Command,
    config::Configuration,
    event::{Event, EventPayload},
    handler::{HandlerError, HandlerResult, MessageHandler, MessageHandlerBuilder, SharedCallback},
    publisher::{EventPublisher, PublishEventError},
    registry::EventTypeRegistry,
    repository::AggregateRepository,
    snapshot::Snapshot,
    stream::{StreamDescriptor, StreamRecord},
};

#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod store {
    pub use chronicle_postgres::{Error, ReplayRow, ReplayStream, Store};
}
