//! In-memory broker backend for tests and the local pipeline runner.
//!
//! Queues are plain FIFO buffers behind one mutex. `Consumer::next`
//! drains: it returns `None` when the queue is currently empty, which
//! lets a single thread run one stage to quiescence before starting the
//! next — the delivery-order guarantees match the real-broker contract
//! (FIFO per queue, nothing across queues).
//!
//! Unacked deliveries are tracked and put back at the front of the queue
//! when a consumer is dropped without acking, approximating at-least-once
//! redelivery.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::broker::{Broker, Consumer};
use crate::error::{BrokerError, Result};
use crate::message::{Delivery, Message};

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<Message>>,
    closed: bool,
    next_tag: u64,
}

/// Thread-safe in-memory broker.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently buffered in a queue.
    pub fn depth(&self, queue: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.queues.get(queue).map(VecDeque::len).unwrap_or(0)
    }

    /// Names of all queues that have ever received a message.
    pub fn queues(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state.queues.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Broker for InMemoryBroker {
    fn send(&self, queue: &str, message: Message) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(BrokerError::Disconnected("broker is closed".into()));
        }
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(message);
        Ok(())
    }

    fn start_consuming(&self, queue: &str) -> Result<Box<dyn Consumer>> {
        let state = self.state.lock().unwrap();
        if state.closed {
            return Err(BrokerError::Disconnected("broker is closed".into()));
        }
        drop(state);
        Ok(Box::new(MemoryConsumer {
            state: Arc::clone(&self.state),
            queue: queue.to_string(),
            unacked: HashMap::new(),
            stopped: false,
        }))
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(BrokerError::Close("broker already closed".into()));
        }
        state.closed = true;
        Ok(())
    }

    fn delete(&self, queue: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .queues
            .remove(queue)
            .map(|_| ())
            .ok_or_else(|| BrokerError::Delete(format!("unknown queue '{queue}'")))
    }
}

struct MemoryConsumer {
    state: Arc<Mutex<BrokerState>>,
    queue: String,
    unacked: HashMap<u64, Message>,
    stopped: bool,
}

impl Consumer for MemoryConsumer {
    fn next(&mut self) -> Result<Option<Delivery>> {
        if self.stopped {
            return Ok(None);
        }
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(BrokerError::Disconnected("broker is closed".into()));
        }
        let Some(message) = state.queues.get_mut(&self.queue).and_then(VecDeque::pop_front)
        else {
            return Ok(None);
        };
        state.next_tag += 1;
        let tag = state.next_tag;
        drop(state);
        self.unacked.insert(tag, message.clone());
        Ok(Some(Delivery { message, tag }))
    }

    fn ack(&mut self, tag: u64) -> Result<()> {
        self.unacked
            .remove(&tag)
            .map(|_| ())
            .ok_or_else(|| BrokerError::Message(format!("unknown delivery tag {tag}")))
    }

    fn stop(&mut self) -> Result<()> {
        self.stopped = true;
        Ok(())
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        if self.unacked.is_empty() {
            return;
        }
        // Requeue unacked deliveries, oldest tag first, at the queue head.
        let mut state = self.state.lock().unwrap();
        let queue = state.queues.entry(self.queue.clone()).or_default();
        let mut tags: Vec<u64> = self.unacked.keys().copied().collect();
        tags.sort_unstable();
        for tag in tags.into_iter().rev() {
            if let Some(message) = self.unacked.remove(&tag) {
                queue.push_front(message);
            }
        }
    }
}
