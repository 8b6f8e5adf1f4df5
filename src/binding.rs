//! PipeBinding - the flow-control coordinator
//!
//! Created by attaching a consumer to a producer. While attached it
//! forwards every delivered chunk to the consumer, translates the
//! consumer's capacity signal into the producer's flowing mode, and tears
//! itself down on end-of-data or an explicit detach.
//!
//! A binding owns neither endpoint: it registers its own listeners on the
//! producer's and consumer's channels and removes exactly those
//! registrations on teardown, so independent observers and other bindings
//! on the same producer are never disturbed.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::consumer::{Capacity, Consume};
use crate::event::{EventName, EventPayload};
use crate::idgen::Handle;
use crate::producer::Producer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindState {
    Attached,
    /// Terminal. Reached on end-of-data or detach.
    Detached,
}

struct BindingCore {
    state: BindState,
    data_listener: Option<Handle>,
    end_listener: Option<Handle>,
    drain_listener: Option<Handle>,
    /// Whether this binding paused the producer and has not yet resumed it
    paused_by_us: bool,
}

struct BindingInner {
    producer: Producer,
    consumer: Arc<dyn Consume>,
    core: Mutex<BindingCore>,
}

/// Handle to one producer-to-consumer binding.
///
/// Cloning yields another handle to the same binding; `detach` through any
/// clone tears the binding down for all of them.
#[derive(Clone)]
pub struct PipeBinding {
    inner: Arc<BindingInner>,
}

impl PipeBinding {
    /// Bind a consumer to a producer and start the flow.
    ///
    /// Registers this binding's data/end listeners on the producer and its
    /// drain listener on the consumer, then switches the producer to
    /// flowing mode.
    pub fn attach(producer: &Producer, consumer: Arc<dyn Consume>) -> Self {
        let inner = Arc::new(BindingInner {
            producer: producer.clone(),
            consumer,
            core: Mutex::new(BindingCore {
                state: BindState::Attached,
                data_listener: None,
                end_listener: None,
                drain_listener: None,
                paused_by_us: false,
            }),
        });

        let data_listener = {
            let inner = Arc::clone(&inner);
            producer
                .events()
                .add_listener(EventName::Data, "binding.data", move |payload| {
                    Self::on_data(&inner, payload);
                })
        };
        let end_listener = {
            let inner = Arc::clone(&inner);
            producer
                .events()
                .add_listener(EventName::End, "binding.end", move |_payload| {
                    tracing::debug!("binding: producer ended, tearing down");
                    Self::teardown(&inner, false);
                })
        };
        let drain_listener = {
            let consumer_events = inner.consumer.events().clone();
            let inner = Arc::clone(&inner);
            consumer_events.add_listener(EventName::Drain, "binding.drain", move |_payload| {
                Self::on_drain(&inner);
            })
        };

        {
            let mut core = inner.core.lock();
            core.data_listener = Some(data_listener);
            core.end_listener = Some(end_listener);
            core.drain_listener = Some(drain_listener);
        }

        producer.set_flowing(true);
        Self { inner }
    }

    /// Whether the binding is still forwarding chunks
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner.core.lock().state == BindState::Attached
    }

    /// Sever the binding.
    ///
    /// Effective immediately for future chunks; nothing already delivered
    /// is recalled. Removes only this binding's own listeners, notifies the
    /// consumer via `on_unbind`, and - if this binding had paused the
    /// producer - resumes it so remaining observers keep receiving data.
    ///
    /// Idempotent: returns `false` when the binding was already detached.
    /// May be called from within a listener callback, including from the
    /// delivery this binding is currently handling.
    pub fn detach(&self) -> bool {
        Self::teardown(&self.inner, true)
    }

    fn on_data(inner: &Arc<BindingInner>, payload: &EventPayload) {
        let Some(chunk) = payload.chunk() else {
            return;
        };
        if inner.core.lock().state == BindState::Detached {
            return;
        }

        let capacity = inner.consumer.accept(chunk);
        if capacity == Capacity::Saturated {
            // The consumer may have detached us from inside accept();
            // pausing on its behalf would then strand the producer.
            let pause = {
                let mut core = inner.core.lock();
                if core.state == BindState::Attached {
                    core.paused_by_us = true;
                    true
                } else {
                    false
                }
            };
            if pause {
                tracing::debug!("binding: consumer saturated, pausing producer");
                inner.producer.set_flowing(false);
            }
        }
    }

    fn on_drain(inner: &Arc<BindingInner>) {
        let resume = {
            let mut core = inner.core.lock();
            if core.state == BindState::Attached && core.paused_by_us {
                core.paused_by_us = false;
                true
            } else {
                false
            }
        };
        if resume {
            tracing::debug!("binding: consumer drained, resuming producer");
            inner.producer.set_flowing(true);
        }
    }

    /// Shared teardown for end-of-data and explicit detach.
    ///
    /// End-of-data is not an unbind, so only an explicit detach notifies
    /// the consumer. Returns `false` if already detached.
    fn teardown(inner: &Arc<BindingInner>, notify_unbind: bool) -> bool {
        let (data, end, drain, resume) = {
            let mut core = inner.core.lock();
            if core.state == BindState::Detached {
                tracing::trace!("binding: teardown on detached binding is a no-op");
                return false;
            }
            core.state = BindState::Detached;
            let resume = core.paused_by_us;
            core.paused_by_us = false;
            (
                core.data_listener.take(),
                core.end_listener.take(),
                core.drain_listener.take(),
                resume,
            )
        };

        // Scoped strictly to this binding's own registrations.
        if let Some(handle) = data {
            inner.producer.events().remove_listener(EventName::Data, handle);
        }
        if let Some(handle) = end {
            inner.producer.events().remove_listener(EventName::End, handle);
        }
        if let Some(handle) = drain {
            inner
                .consumer
                .events()
                .remove_listener(EventName::Drain, handle);
        }

        if resume {
            inner.producer.set_flowing(true);
        }
        if notify_unbind {
            inner.consumer.on_unbind();
        }
        true
    }
}

impl fmt::Debug for PipeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.core.lock();
        write!(
            f,
            "PipeBinding(state={:?}, paused_by_us={})",
            core.state, core.paused_by_us
        )
    }
}
