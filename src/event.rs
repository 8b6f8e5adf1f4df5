//! Named-event publish/subscribe channel
//!
//! Every pipe entity (producer or consumer) owns one `EventChannel`.
//! Listeners register for a named event and are invoked in registration
//! order when that event is emitted. A listener is removed by the `Handle`
//! returned at registration.
//!
//! # Mutation during emission
//!
//! The listener list for an event is snapshotted at the start of each
//! emission pass, and callbacks run with the channel lock released. A
//! callback may therefore add or remove listeners on the same channel,
//! including removing itself, without corrupting the in-progress pass.
//! Removal takes effect for all future emissions, never retroactively:
//! a listener removed mid-pass still receives the event of that pass.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::chunk::Chunk;
use crate::idgen::{Handle, IdGen};

/// Events a pipe entity can emit on its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// A chunk is being delivered to listeners.
    Data,
    /// The producer has delivered everything it will ever deliver.
    /// Fires exactly once, after all data deliveries.
    End,
    /// Diagnostic: a chunk was dequeued from the producer's queue.
    /// Observability only, not part of the transport contract.
    ChunkProduced,
    /// The consumer regained capacity after reporting saturation.
    Drain,
    /// A binding detached from the consumer.
    Unbind,
}

/// Payload delivered with an event.
#[derive(Debug, Clone)]
pub enum EventPayload {
    Chunk(Chunk),
    Empty,
}

impl EventPayload {
    /// The chunk carried by this payload, if any
    #[must_use]
    pub fn chunk(&self) -> Option<&Chunk> {
        match self {
            Self::Chunk(chunk) => Some(chunk),
            Self::Empty => None,
        }
    }
}

type ListenerFn = Arc<dyn Fn(&EventPayload) + Send + Sync>;

struct RegisteredListener {
    handle: Handle,
    debug_hint: String,
    callback: ListenerFn,
}

impl fmt::Debug for RegisteredListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredListener")
            .field("handle", &self.handle)
            .field("debug_hint", &self.debug_hint)
            .finish_non_exhaustive()
    }
}

struct ChannelState {
    listeners: HashMap<EventName, Vec<RegisteredListener>>,
}

/// Named-event publish/subscribe channel
///
/// Cloning yields another handle to the same channel. All operations use
/// interior mutability with `parking_lot::Mutex` protection; the lock is
/// never held while listener callbacks execute.
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<Mutex<ChannelState>>,
    id_gen: Arc<IdGen>,
}

impl EventChannel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChannelState {
                listeners: HashMap::new(),
            })),
            id_gen: Arc::new(IdGen::new()),
        }
    }

    /// Register a listener for a named event.
    ///
    /// Listeners are invoked in registration order. The returned handle
    /// removes exactly this registration via [`remove_listener`].
    ///
    /// [`remove_listener`]: EventChannel::remove_listener
    pub fn add_listener(
        &self,
        event: EventName,
        debug_hint: &str,
        callback: impl Fn(&EventPayload) + Send + Sync + 'static,
    ) -> Handle {
        let handle = self.id_gen.next_handle();
        let mut state = self.inner.lock();
        state
            .listeners
            .entry(event)
            .or_default()
            .push(RegisteredListener {
                handle,
                debug_hint: debug_hint.to_string(),
                callback: Arc::new(callback),
            });
        handle
    }

    /// Remove a listener registration.
    ///
    /// Takes effect for all future emissions; an emission pass already in
    /// progress still delivers to the removed listener. Returns whether a
    /// registration was found. Removing an unknown handle is a no-op.
    pub fn remove_listener(&self, event: EventName, handle: Handle) -> bool {
        let mut state = self.inner.lock();
        let Some(listeners) = state.listeners.get_mut(&event) else {
            log::debug!("channel.remove_listener: no listeners for {event:?}");
            return false;
        };
        let Some(index) = listeners.iter().position(|l| l.handle == handle) else {
            log::debug!("channel.remove_listener: handle {handle:?} not registered for {event:?}");
            return false;
        };
        listeners.remove(index);
        true
    }

    /// Emit a named event to all currently-registered listeners.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, event: EventName, payload: &EventPayload) -> usize {
        // Snapshot the listener list, then invoke outside the lock.
        let snapshot: Vec<ListenerFn> = {
            let state = self.inner.lock();
            state.listeners.get(&event).map_or_else(Vec::new, |listeners| {
                listeners.iter().map(|l| Arc::clone(&l.callback)).collect()
            })
        };

        log::debug!(
            "channel.emit: {event:?}, payload={payload:?}, listeners: {}",
            snapshot.len()
        );

        for callback in &snapshot {
            callback(payload);
        }
        snapshot.len()
    }

    /// Number of listeners currently registered for an event
    #[must_use]
    pub fn listener_count(&self, event: EventName) -> usize {
        let state = self.inner.lock();
        state.listeners.get(&event).map_or(0, Vec::len)
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        let counts: Vec<(EventName, usize)> = state
            .listeners
            .iter()
            .map(|(event, listeners)| (*event, listeners.len()))
            .collect();
        write!(f, "EventChannel(listeners={counts:?})")
    }
}
