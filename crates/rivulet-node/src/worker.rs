//! The consumption loop shared by every worker role.

use std::sync::Arc;

use rivulet_broker::{Broker, Message};
use rivulet_core::barrier::{BarrierState, CompletionBarrier};
use rivulet_core::config::RuntimeConfig;
use rivulet_core::envelope::{ChannelEnvelope, ChannelOutcome};
use rivulet_core::row::decode_rows;
use rivulet_operators::spec::NodeSpec;
use rivulet_operators::TypeRouter;

use crate::error::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerStats {
    /// Batches consumed and acknowledged.
    pub batches: u64,
    /// Channels that reached a terminal state (finished or aborted).
    pub channels_closed: u64,
}

/// One worker process: one queue, one router, one completion barrier.
pub struct Worker {
    name: String,
    broker: Arc<dyn Broker>,
    queue: String,
    default_tag: Option<String>,
    strict: bool,
    router: TypeRouter,
    barrier: CompletionBarrier,
    stats: WorkerStats,
}

impl Worker {
    pub fn new(broker: Arc<dyn Broker>, spec: &NodeSpec, config: &RuntimeConfig) -> Result<Self> {
        let router = spec.compile(Arc::clone(&broker), config)?;
        Ok(Self {
            name: spec.name.clone(),
            broker,
            queue: spec.queue.clone(),
            default_tag: spec.default_tag.clone(),
            strict: config.strict_messages,
            router,
            barrier: CompletionBarrier::new(),
            stats: WorkerStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consume until the broker reports no further deliveries.
    ///
    /// A batch is acknowledged only after it is fully folded into
    /// accumulator state or forwarded; a crash in between means the broker
    /// redelivers it (at-least-once — the barrier does not dedupe).
    pub fn run(&mut self) -> Result<WorkerStats> {
        let mut consumer = self.broker.start_consuming(&self.queue)?;
        while let Some(delivery) = consumer.next()? {
            match self.handle(&delivery.message) {
                Ok(()) => {
                    consumer.ack(delivery.tag)?;
                    self.stats.batches += 1;
                }
                Err(e) if e.is_fatal() || self.strict => {
                    tracing::error!(worker = %self.name, error = %e, "worker aborting");
                    return Err(e);
                }
                Err(e) => {
                    // defined non-fatal class: log, drop the message, go on
                    tracing::warn!(worker = %self.name, error = %e, "skipping malformed message");
                    consumer.ack(delivery.tag)?;
                }
            }
        }
        consumer.stop()?;
        Ok(self.stats)
    }

    fn handle(&mut self, message: &Message) -> Result<()> {
        let envelope =
            ChannelEnvelope::from_headers(&message.headers, self.default_tag.as_deref())?;
        let rows = decode_rows(&message.body)?;

        for channel in envelope.channels() {
            if self.barrier.is_settled(&channel) {
                tracing::warn!(
                    worker = %self.name,
                    channel = %channel,
                    "batch for a settled channel dropped"
                );
                continue;
            }
            // fold data first; an empty payload is a delivery-partition
            // boundary and only feeds the tally
            if !rows.is_empty() {
                self.router.dispatch_rows(&channel, &rows)?;
            }
            let producers = self.router.producers_for(&channel.tag);
            match self.barrier.observe(&channel, &envelope.completion, producers) {
                BarrierState::Open => {}
                BarrierState::Complete => {
                    tracing::info!(worker = %self.name, channel = %channel, "channel complete");
                    self.router
                        .dispatch_complete(&channel, &ChannelOutcome::Finished)?;
                    self.stats.channels_closed += 1;
                }
                BarrierState::Aborted { code } => {
                    tracing::warn!(
                        worker = %self.name,
                        channel = %channel,
                        code,
                        "channel aborted upstream"
                    );
                    self.router
                        .dispatch_complete(&channel, &ChannelOutcome::Aborted { code })?;
                    self.stats.channels_closed += 1;
                }
            }
        }
        Ok(())
    }
}
