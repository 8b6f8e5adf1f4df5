//! Producer - the pull-based chunk source
//!
//! Holds a FIFO queue of not-yet-delivered chunks and an end-of-data flag.
//! In flowing mode the scheduler pump delivers one chunk per turn; in
//! paused mode chunks stay queued until flow is re-enabled.
//!
//! Delivery of a chunk emits `Data` to all current listeners, then the
//! `ChunkProduced` diagnostic event. When the queue runs dry, end-of-data
//! is set and the `End` emission is deferred one turn so that all data
//! deliveries of the current turn settle first.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::chunk::Chunk;
use crate::error::FlowError;
use crate::event::{EventChannel, EventName, EventPayload};
use crate::idgen::Handle;
use crate::scheduler::Scheduler;

struct ProducerState {
    queue: VecDeque<Chunk>,
    ended: bool,
    flowing: bool,
    pump_scheduled: bool,
}

/// Pull-based chunk source with flowing/paused delivery.
///
/// Cloning yields another handle to the same producer; listeners and
/// bindings hold clones without owning the producer.
///
/// # Thread Safety
///
/// State is guarded by `parking_lot::Mutex` and the lock is released
/// before any event is emitted, so listener callbacks may call back into
/// the producer (pause it, remove themselves) without deadlocking.
#[derive(Clone)]
pub struct Producer {
    shared: Arc<Mutex<ProducerState>>,
    events: EventChannel,
    scheduler: Scheduler,
    debug_hint: String,
}

impl Producer {
    /// Create a paused producer with an empty queue.
    #[must_use]
    pub fn new(scheduler: Scheduler, debug_hint: &str) -> Self {
        Self {
            shared: Arc::new(Mutex::new(ProducerState {
                queue: VecDeque::new(),
                ended: false,
                flowing: false,
                pump_scheduled: false,
            })),
            events: EventChannel::new(),
            scheduler,
            debug_hint: debug_hint.to_string(),
        }
    }

    /// Queue a chunk for later delivery.
    ///
    /// While flowing, delivery is scheduled on the next turn.
    ///
    /// # Errors
    ///
    /// `FlowError::PushAfterEnd` once end-of-data has been reached:
    /// nothing is ever queued or emitted after the end.
    pub fn push(&self, chunk: Chunk) -> Result<(), FlowError> {
        let flowing = {
            let mut state = self.shared.lock();
            if state.ended {
                return Err(FlowError::PushAfterEnd);
            }
            state.queue.push_back(chunk);
            state.flowing
        };
        if flowing {
            self.schedule_pump();
        }
        Ok(())
    }

    /// Perform one pull step.
    ///
    /// If a chunk is queued: dequeue it, emit `Data` to all current
    /// listeners, then emit the `ChunkProduced` diagnostic event. The queue
    /// advances even with zero listeners, so end-of-data stays reachable
    /// when nobody is attached.
    ///
    /// If the queue is empty: set end-of-data and defer the single `End`
    /// emission to the next turn. Pulling after the end is a no-op.
    pub fn pull(&self) {
        let pulled = {
            let mut state = self.shared.lock();
            if state.ended {
                return;
            }
            match state.queue.pop_front() {
                Some(chunk) => Some(chunk),
                None => {
                    state.ended = true;
                    None
                }
            }
        };

        match pulled {
            Some(chunk) => {
                self.events
                    .emit(EventName::Data, &EventPayload::Chunk(chunk.clone()));
                self.events
                    .emit(EventName::ChunkProduced, &EventPayload::Chunk(chunk));
            }
            None => {
                // Let data deliveries already queued this turn settle before
                // anyone observes the end.
                log::debug!("producer[{}]: end of data, deferring end event", self.debug_hint);
                let events = self.events.clone();
                let hint = format!("producer[{}].end", self.debug_hint);
                self.scheduler.defer(&hint, move || {
                    events.emit(EventName::End, &EventPayload::Empty);
                });
            }
        }
    }

    /// Switch between flowing and paused.
    ///
    /// Switching to flowing schedules delivery of pending chunks; switching
    /// to paused halts further pulls until re-enabled. Either direction is
    /// idempotent.
    pub fn set_flowing(&self, flowing: bool) {
        {
            let mut state = self.shared.lock();
            if state.flowing == flowing {
                return;
            }
            state.flowing = flowing;
        }
        log::debug!("producer[{}]: flowing={flowing}", self.debug_hint);
        if flowing {
            self.schedule_pump();
        }
    }

    /// Whether the producer is currently in flowing mode
    #[must_use]
    pub fn is_flowing(&self) -> bool {
        self.shared.lock().flowing
    }

    /// Whether end-of-data has been reached
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.shared.lock().ended
    }

    /// Number of chunks queued and not yet delivered
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Register an observer for delivered chunks.
    ///
    /// Observers are invoked in registration order and each sees the full
    /// chunk sequence from registration until its own removal.
    pub fn add_data_listener(
        &self,
        debug_hint: &str,
        callback: impl Fn(&EventPayload) + Send + Sync + 'static,
    ) -> Handle {
        self.events.add_listener(EventName::Data, debug_hint, callback)
    }

    /// Remove a data observer. Takes effect for all future deliveries.
    pub fn remove_data_listener(&self, handle: Handle) -> bool {
        self.events.remove_listener(EventName::Data, handle)
    }

    /// Number of registered data observers
    #[must_use]
    pub fn data_listener_count(&self) -> usize {
        self.events.listener_count(EventName::Data)
    }

    /// The producer's event channel, for `End` and `ChunkProduced` subscribers
    #[must_use]
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    /// Schedule the pump task if flowing and not already scheduled.
    ///
    /// The pump performs one pull per turn and re-defers itself while the
    /// producer stays flowing, so a pause taking effect mid-stream stops
    /// delivery at a turn boundary.
    fn schedule_pump(&self) {
        {
            let mut state = self.shared.lock();
            if state.pump_scheduled || !state.flowing || state.ended {
                return;
            }
            state.pump_scheduled = true;
        }

        let this = self.clone();
        let hint = format!("producer[{}].pump", self.debug_hint);
        self.scheduler.defer(&hint, move || {
            {
                let mut state = this.shared.lock();
                state.pump_scheduled = false;
                if !state.flowing || state.ended {
                    return;
                }
            }
            this.pull();
            this.schedule_pump();
        });
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        write!(
            f,
            "Producer(hint={}, pending={}, flowing={}, ended={}, data_listeners={})",
            self.debug_hint,
            state.queue.len(),
            state.flowing,
            state.ended,
            self.events.listener_count(EventName::Data)
        )
    }
}
