//! Sharded output sinks with per-shard batch builders.
//!
//! Every operator writes through a [`ShardedSink`]: rows are routed to a
//! shard queue by the stable partition hash, buffered until the batch
//! builder reaches its row limit, and flushed as one wire batch. The sink
//! also owns the completion hand-off — on `finish` it flushes what is
//! buffered and emits one terminal batch per shard queue carrying exactly
//! the number of non-terminal batches it sent there, so the next stage can
//! apply the same counting barrier. Terminals go to every shard even when
//! a shard saw no data; a "fully filtered out" channel still completes
//! downstream.

use std::collections::HashMap;
use std::sync::Arc;

use rivulet_broker::{Broker, Message};
use rivulet_core::envelope::{ChannelEnvelope, ChannelId, ChannelOutcome, Completion};
use rivulet_core::partition::{route, shard_key};
use rivulet_core::row::{encode_rows, Row};

use crate::error::{OpError, Result};
use crate::spec::{index_of, SinkSpec};

/// Compiled sink parameters; the `key` columns are resolved against the
/// operator's output layout.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub queue: String,
    pub shards: u32,
    pub key: Vec<usize>,
    pub batch_rows: usize,
    pub tag: Option<String>,
}

impl SinkConfig {
    pub fn from_spec(spec: &SinkSpec, output_layout: &[String], default_batch: usize) -> Result<Self> {
        let mut key = Vec::with_capacity(spec.key.len());
        for name in &spec.key {
            key.push(index_of(output_layout, name).map_err(|_| {
                OpError::Config(format!(
                    "sink key column '{name}' is not in the output layout"
                ))
            })?);
        }
        let batch_rows = spec.batch_rows.unwrap_or(default_batch).max(1);
        Ok(Self {
            queue: spec.queue.clone(),
            shards: spec.shards.max(1),
            key,
            batch_rows,
            tag: spec.tag.clone(),
        })
    }

    /// Queue name for one shard. Unsharded sinks use the bare queue name.
    pub fn queue_for(&self, shard: u32) -> String {
        if self.shards <= 1 {
            self.queue.clone()
        } else {
            format!("{}.{}", self.queue, shard)
        }
    }
}

#[derive(Debug, Default, Clone)]
struct ShardBuffer {
    rows: Vec<Row>,
    sent: u64,
}

/// One operator's output fan: per outgoing channel, per shard, a batch
/// builder and the count of batches already emitted.
pub struct ShardedSink {
    broker: Arc<dyn Broker>,
    cfg: SinkConfig,
    state: HashMap<ChannelId, Vec<ShardBuffer>>,
}

impl ShardedSink {
    pub fn new(broker: Arc<dyn Broker>, cfg: SinkConfig) -> Self {
        Self {
            broker,
            cfg,
            state: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SinkConfig {
        &self.cfg
    }

    /// The channel outgoing batches are stamped with: same query, the
    /// sink's tag override (or the incoming tag when none).
    fn out_channel(&self, channel: &ChannelId) -> ChannelId {
        match &self.cfg.tag {
            Some(tag) => ChannelId::new(channel.query.clone(), tag.clone()),
            None => channel.clone(),
        }
    }

    fn shard_for(&self, out: &ChannelId, row: &[String]) -> u32 {
        if self.cfg.shards <= 1 {
            return 0;
        }
        let parts: Vec<&str> = self
            .cfg
            .key
            .iter()
            .map(|&i| row.get(i).map(String::as_str).unwrap_or(""))
            .collect();
        route(&shard_key(out, &parts), self.cfg.shards)
    }

    /// Buffer one output row; flushes the shard's builder when it reaches
    /// the configured row limit.
    pub fn push(&mut self, channel: &ChannelId, row: Row) -> Result<()> {
        let out = self.out_channel(channel);
        let shard = self.shard_for(&out, &row) as usize;
        let shards = self.cfg.shards as usize;
        let buffers = self
            .state
            .entry(out.clone())
            .or_insert_with(|| vec![ShardBuffer::default(); shards]);
        buffers[shard].rows.push(row);
        if buffers[shard].rows.len() >= self.cfg.batch_rows {
            self.flush_shard(&out, shard)?;
        }
        Ok(())
    }

    fn flush_shard(&mut self, out: &ChannelId, shard: usize) -> Result<()> {
        let Some(buffers) = self.state.get_mut(out) else {
            return Ok(());
        };
        if buffers[shard].rows.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(&mut buffers[shard].rows);
        buffers[shard].sent += 1;
        let body = encode_rows(&rows).into_bytes();
        let envelope =
            ChannelEnvelope::single(out.query.clone(), out.tag.clone(), Completion::Pending);
        self.broker
            .send(&self.cfg.queue_for(shard as u32), Message::new(envelope.to_headers(None), body))?;
        Ok(())
    }

    /// Close the channel: flush remaining builders and emit one terminal
    /// batch per shard queue. On abort, buffered output is discarded and
    /// the abort code propagates instead.
    pub fn finish(&mut self, channel: &ChannelId, outcome: &ChannelOutcome) -> Result<()> {
        let out = self.out_channel(channel);
        let shards = self.cfg.shards as usize;
        let mut buffers = self
            .state
            .remove(&out)
            .unwrap_or_else(|| vec![ShardBuffer::default(); shards]);

        for (shard, buffer) in buffers.iter_mut().enumerate() {
            let completion = match outcome {
                ChannelOutcome::Finished => {
                    if !buffer.rows.is_empty() {
                        let rows = std::mem::take(&mut buffer.rows);
                        buffer.sent += 1;
                        let body = encode_rows(&rows).into_bytes();
                        let envelope = ChannelEnvelope::single(
                            out.query.clone(),
                            out.tag.clone(),
                            Completion::Pending,
                        );
                        self.broker.send(
                            &self.cfg.queue_for(shard as u32),
                            Message::new(envelope.to_headers(None), body),
                        )?;
                    }
                    Completion::Finished { sent: buffer.sent }
                }
                ChannelOutcome::Aborted { code } => {
                    buffer.rows.clear();
                    Completion::Aborted { code: *code }
                }
            };
            let envelope =
                ChannelEnvelope::single(out.query.clone(), out.tag.clone(), completion);
            self.broker.send(
                &self.cfg.queue_for(shard as u32),
                Message::new(envelope.to_headers(None), Vec::new()),
            )?;
        }
        Ok(())
    }
}
