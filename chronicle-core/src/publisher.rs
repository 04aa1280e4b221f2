//! In-process event publication.
//!
//! [`EventPublisher`] dispatches committed events to every configured handler
//! while preserving publication order within a thread. The queue and the
//! draining flag are thread-local: each thread drains its own queue and a
//! re-entrant publish (a handler committing further events while a drain is
//! in progress) only enqueues, leaving dispatch to the outer frame. The
//! observable order is therefore breadth-first across the thread's commit
//! tree: events of a nested commit never overtake the remaining events of the
//! commit that triggered them.
//!
//! When a handler fails, the drain stops and the remainder of the thread's
//! queue is discarded - stale events are never replayed by a later publish.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    thread,
};

use thiserror::Error;

use crate::{
    config::Configuration,
    event::Event,
    handler::HandlerError,
};

thread_local! {
    static QUEUE: RefCell<VecDeque<Event>> = RefCell::new(VecDeque::new());
    static DRAINING: Cell<bool> = const { Cell::new(false) };
}

/// A handler raised while dispatching an event.
#[derive(Debug, Error)]
#[error("event handler {event_handler} failed: {source}")]
pub struct PublishEventError {
    /// Name of the failing [`MessageHandler`](crate::handler::MessageHandler).
    pub event_handler: String,
    /// The event being dispatched when the handler failed.
    pub event: Event,
    #[source]
    pub source: HandlerError,
}

/// Dispatches committed events to the configured handlers in order.
#[derive(Clone, Copy, Debug, Default)]
pub struct EventPublisher;

impl EventPublisher {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Publish a batch of events to all configured handlers.
    ///
    /// Events are appended to the current thread's queue in input order and
    /// the queue is drained unless a drain is already in progress higher up
    /// the call stack.
    ///
    /// # Errors
    ///
    /// Returns a [`PublishEventError`] wrapping the first handler failure.
    /// Events still queued at that point are discarded.
    pub fn publish_events(
        &self,
        events: Vec<Event>,
        config: &Configuration,
    ) -> Result<(), PublishEventError> {
        if config.disable_event_handlers {
            return Ok(());
        }
        QUEUE.with(|queue| queue.borrow_mut().extend(events));
        Self::drain(config)
    }

    fn drain(config: &Configuration) -> Result<(), PublishEventError> {
        if DRAINING.with(Cell::get) {
            // A shallower frame owns the queue; it will pick these events up.
            return Ok(());
        }
        DRAINING.with(|draining| draining.set(true));
        let _guard = DrainGuard;

        let mut dispatched = 0_usize;
        loop {
            let Some(event) = QUEUE.with(|queue| queue.borrow_mut().pop_front()) else {
                tracing::trace!(dispatched, "publisher queue drained");
                return Ok(());
            };
            for handler in &config.event_handlers {
                if let Err(source) = handler.handle_message(&event) {
                    QUEUE.with(|queue| queue.borrow_mut().clear());
                    return Err(PublishEventError {
                        event_handler: handler.name().to_string(),
                        event,
                        source,
                    });
                }
            }
            dispatched += 1;
        }
    }
}

/// Clears the draining flag on exit; a panicking handler also forfeits the
/// rest of the thread's queue.
struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        DRAINING.with(|draining| draining.set(false));
        if thread::panicking() {
            QUEUE.with(|queue| queue.borrow_mut().clear());
        }
    }
}
