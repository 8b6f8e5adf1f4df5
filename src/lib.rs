//! Flow-controlled chunk pipe
//!
//! Moves discrete chunks from a pull-based producer to any number of
//! push-based consumers, applying backpressure so the producer never
//! outpaces a consumer, and allowing any single producer/consumer binding
//! to be severed mid-stream without losing queued data or disturbing the
//! producer's other observers.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  Data/End   ┌─────────────┐  accept   ┌────────────┐
//! │  Producer  │────────────▶│ PipeBinding │──────────▶│  Consumer  │
//! │ queue+flow │◀────────────│ (per pair)  │◀──────────│  capacity  │
//! └────────────┘ set_flowing └─────────────┘   Drain   └────────────┘
//!        │                                                   │
//!        └────────── EventChannel per entity ────────────────┘
//!                              │
//!                    Scheduler (deferred turns)
//! ```
//!
//! All cross-entity coordination happens through per-entity
//! [`EventChannel`]s; "later" always means a later [`Scheduler`] turn, so
//! delivery and lifecycle ordering is deterministic.

pub mod binding;
pub mod chunk;
pub mod consumer;
pub mod error;
pub mod event;
pub mod idgen;
pub mod producer;
pub mod scheduler;

// Re-export the pipe surface for convenience
pub use binding::PipeBinding;
pub use chunk::Chunk;
pub use consumer::{Capacity, Consume, Consumer};
pub use error::FlowError;
pub use event::{EventChannel, EventName, EventPayload};
pub use idgen::{Handle, IdGen};
pub use producer::Producer;
pub use scheduler::Scheduler;
