//! Broker trait + consumer interface.
//!
//! The source protocol is callback-shaped (`startConsuming(callback)` /
//! `stopConsuming`); here consumption is a pull-based [`Consumer`] handle,
//! which is the natural Rust shape for a single-threaded worker loop:
//! `while let Some(delivery) = consumer.next()? { ... consumer.ack(..)? }`.

use crate::error::Result;
use crate::message::{Delivery, Message};

/// The engine-facing broker surface.
///
/// Invariants:
/// - `send` to the same queue from one producer preserves order; no
///   ordering holds across producers.
/// - Implementations must be shareable across operator sinks
///   (`Send + Sync`); workers themselves stay single-threaded.
pub trait Broker: Send + Sync {
    /// Publish one message to a queue, creating the queue if needed.
    fn send(&self, queue: &str, message: Message) -> Result<()>;

    /// Open a consumption stream on a queue.
    fn start_consuming(&self, queue: &str) -> Result<Box<dyn Consumer>>;

    /// Close the broker connection; later operations fail `Disconnected`.
    fn close(&self) -> Result<()>;

    /// Delete a queue and everything still buffered in it.
    fn delete(&self, queue: &str) -> Result<()>;
}

/// One consumption slot on one queue.
pub trait Consumer {
    /// The next delivery, or `None` once consumption has ended for this
    /// slot (stopped, or the backend has nothing further to deliver).
    fn next(&mut self) -> Result<Option<Delivery>>;

    /// Acknowledge a delivery. Workers ack only after the batch is fully
    /// folded into accumulator state or forwarded — redelivery of an
    /// unacked batch is the broker's at-least-once contract.
    fn ack(&mut self, tag: u64) -> Result<()>;

    /// Stop this consumption slot; `next` returns `None` afterwards.
    fn stop(&mut self) -> Result<()>;
}
