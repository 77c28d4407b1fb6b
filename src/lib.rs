//! Persistent, multi-publisher / multi-subscriber message queue over an
//! embedded memory-mapped transactional store.
//!
//! Each published message is delivered exactly once to every subscriber
//! registered at the time it was sent. Messages survive process restarts;
//! retention (time, count, and size based) runs synchronously inside
//! `put` so there is no background sweeper thread to reason about.

pub mod codec;
pub mod control;
pub mod environment;
pub mod error;
mod liveness;
pub mod publisher;
pub mod queue;
pub mod queue_data;
pub mod schema;
pub mod store;
pub mod subscriber;

pub use control::Control;
pub use environment::{initialize, Environment};
pub use error::{Error, Result};
pub use publisher::Publisher;
pub use queue::Queue;
pub use queue_data::{HighWaterMark, QueueData, Strategy};
pub use subscriber::{Received, Subscriber};
