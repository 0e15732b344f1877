//! Dataset feeder: one CSV file into one (possibly sharded) select
//! queue, multiplexed over the queries that consume the table.
//!
//! The header line must match a registered table signature exactly.
//! Select is stateless, so shard fan-out is round-robin per batch; each
//! shard queue gets its own terminal carrying the count of batches that
//! went there.

use std::sync::Arc;

use rivulet_broker::{Broker, Message};
use rivulet_core::envelope::{ChannelEnvelope, Completion};
use rivulet_core::row::{encode_rows, Row};
use rivulet_core::schema::TableKind;
use rivulet_operators::spec::FeedSpec;

use crate::error::{NodeError, Result};

#[derive(Debug, Clone)]
pub struct FeedSummary {
    pub table: TableKind,
    pub rows: u64,
    /// Non-terminal batches sent to each shard queue.
    pub sent: Vec<u64>,
}

fn shard_queue(queue: &str, shards: u32, shard: u32) -> String {
    if shards <= 1 {
        queue.to_string()
    } else {
        format!("{queue}.{shard}")
    }
}

pub fn feed_csv(broker: &Arc<dyn Broker>, spec: &FeedSpec, default_batch: usize) -> Result<FeedSummary> {
    if spec.queries.is_empty() {
        return Err(NodeError::Feed(format!(
            "feed for '{}' lists no queries",
            spec.path
        )));
    }
    let mut reader = csv::Reader::from_path(&spec.path)?;
    let headers = reader.headers()?.clone();
    let fields: Vec<&str> = headers.iter().collect();
    let table = TableKind::from_header(&fields).ok_or_else(|| {
        NodeError::Feed(format!(
            "unrecognized header in '{}': {fields:?}",
            spec.path
        ))
    })?;

    let shards = spec.shards.max(1);
    let batch_rows = spec.batch_rows.unwrap_or(default_batch).max(1);
    let envelope = |completion: Completion| {
        // every channel listed for this feed shares the row payload
        ChannelEnvelope {
            queries: spec.queries.iter().map(|c| c.id.clone()).collect(),
            tags: spec.queries.iter().map(|c| c.tag.clone()).collect(),
            completion,
        }
    };

    let mut sent = vec![0u64; shards as usize];
    let mut rows_total = 0u64;
    let mut buffer: Vec<Row> = Vec::with_capacity(batch_rows);
    let mut next_shard = 0u32;

    let mut flush = |buffer: &mut Vec<Row>, shard: u32, sent: &mut Vec<u64>| -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        let body = encode_rows(buffer).into_bytes();
        buffer.clear();
        broker.send(
            &shard_queue(&spec.queue, shards, shard),
            Message::new(envelope(Completion::Pending).to_headers(None), body),
        )?;
        sent[shard as usize] += 1;
        Ok(())
    };

    for record in reader.records() {
        let record = record?;
        buffer.push(record.iter().map(str::to_string).collect());
        rows_total += 1;
        if buffer.len() >= batch_rows {
            flush(&mut buffer, next_shard, &mut sent)?;
            next_shard = (next_shard + 1) % shards;
        }
    }
    flush(&mut buffer, next_shard, &mut sent)?;

    for shard in 0..shards {
        let completion = Completion::Finished {
            sent: sent[shard as usize],
        };
        broker.send(
            &shard_queue(&spec.queue, shards, shard),
            Message::new(envelope(completion).to_headers(None), Vec::new()),
        )?;
    }

    tracing::info!(
        table = table.name(),
        rows = rows_total,
        queue = %spec.queue,
        shards,
        "dataset fed"
    );
    Ok(FeedSummary {
        table,
        rows: rows_total,
        sent,
    })
}
