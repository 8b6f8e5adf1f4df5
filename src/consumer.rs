//! Consumer - the push-based chunk sink
//!
//! Accepts chunks, simulates the I/O commit as a deferred completion task,
//! and reports a capacity signal used by bindings for backpressure. A
//! consumer whose in-flight count reaches its high-water mark reports
//! `Saturated`; once completions bring it back below the mark, the
//! consumer's channel emits `Drain`.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::chunk::Chunk;
use crate::event::{EventChannel, EventName, EventPayload};
use crate::scheduler::Scheduler;

/// Capacity signal returned by [`Consume::accept`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// The consumer can take more chunks immediately
    Ready,
    /// The consumer is temporarily saturated; pause until it drains
    Saturated,
}

/// Capability contract for anything that can sit at the receiving end of
/// a binding: accept chunks, be told about unbinding, and expose a channel
/// carrying `Drain` and `Unbind` events. No base type required.
pub trait Consume: Send + Sync {
    /// Take one chunk. Always succeeds; the return value is a capacity
    /// signal, not an error path.
    fn accept(&self, chunk: &Chunk) -> Capacity;

    /// Notification that a binding detached from this consumer.
    /// End-of-data does not trigger this.
    fn on_unbind(&self);

    /// The consumer's event channel
    fn events(&self) -> &EventChannel;
}

struct ConsumerState {
    received: u64,
    bytes_received: u64,
    in_flight: usize,
    unbound: bool,
}

/// Chunk sink with simulated deferred I/O and a high-water capacity mark.
///
/// Cloning yields another handle to the same consumer.
#[derive(Clone)]
pub struct Consumer {
    shared: Arc<Mutex<ConsumerState>>,
    events: EventChannel,
    scheduler: Scheduler,
    high_water: usize,
    debug_hint: String,
}

impl Consumer {
    /// Create a consumer that never saturates (every accept reports
    /// `Ready`), matching a sink that commits writes synchronously.
    #[must_use]
    pub fn new(scheduler: Scheduler, debug_hint: &str) -> Self {
        Self::with_high_water(scheduler, debug_hint, usize::MAX)
    }

    /// Create a consumer that reports `Saturated` once `high_water` accepted
    /// chunks are awaiting their deferred completion.
    ///
    /// The mark is the readiness-timing knob: completions run one turn after
    /// the accept, so a low mark throttles the producer to the consumer's
    /// simulated commit rate.
    #[must_use]
    pub fn with_high_water(scheduler: Scheduler, debug_hint: &str, high_water: usize) -> Self {
        Self {
            shared: Arc::new(Mutex::new(ConsumerState {
                received: 0,
                bytes_received: 0,
                in_flight: 0,
                unbound: false,
            })),
            events: EventChannel::new(),
            scheduler,
            high_water,
            debug_hint: debug_hint.to_string(),
        }
    }

    /// Total chunks accepted so far
    #[must_use]
    pub fn received_count(&self) -> u64 {
        self.shared.lock().received
    }

    /// Total payload bytes accepted so far
    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.shared.lock().bytes_received
    }

    /// Chunks accepted whose completion has not run yet
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.lock().in_flight
    }

    /// Whether a binding has detached from this consumer
    #[must_use]
    pub fn is_unbound(&self) -> bool {
        self.shared.lock().unbound
    }

    /// Finish one simulated write. Emits `Drain` when the in-flight count
    /// crosses back below the high-water mark.
    fn complete_one(&self) {
        let drained = {
            let mut state = self.shared.lock();
            if state.in_flight == 0 {
                log::warn!(
                    "consumer[{}]: completion with nothing in flight",
                    self.debug_hint
                );
                return;
            }
            let was_saturated = state.in_flight >= self.high_water;
            state.in_flight -= 1;
            was_saturated && state.in_flight < self.high_water
        };
        if drained {
            log::debug!("consumer[{}]: drained", self.debug_hint);
            self.events.emit(EventName::Drain, &EventPayload::Empty);
        }
    }
}

impl Consume for Consumer {
    fn accept(&self, chunk: &Chunk) -> Capacity {
        let in_flight = {
            let mut state = self.shared.lock();
            state.received += 1;
            state.bytes_received += chunk.len() as u64;
            state.in_flight += 1;
            state.in_flight
        };

        // Commit happens a turn later; saturation is never permanent
        // because the completion is queued before it is reported.
        let this = self.clone();
        let hint = format!("consumer[{}].write-complete", self.debug_hint);
        self.scheduler.defer(&hint, move || this.complete_one());

        if in_flight >= self.high_water {
            log::debug!(
                "consumer[{}]: saturated at {in_flight} in flight",
                self.debug_hint
            );
            Capacity::Saturated
        } else {
            Capacity::Ready
        }
    }

    fn on_unbind(&self) {
        {
            let mut state = self.shared.lock();
            state.unbound = true;
        }
        self.events.emit(EventName::Unbind, &EventPayload::Empty);
    }

    fn events(&self) -> &EventChannel {
        &self.events
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        write!(
            f,
            "Consumer(hint={}, received={}, in_flight={}, high_water={}, unbound={})",
            self.debug_hint, state.received, state.in_flight, self.high_water, state.unbound
        )
    }
}
