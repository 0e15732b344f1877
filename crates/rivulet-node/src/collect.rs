//! Result collector: drain a result queue into one CSV file per query.
//!
//! The collector applies the same completion barrier as any worker; a
//! query's file is written only once its channel is complete, and an
//! aborted channel produces no file at all.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use rivulet_broker::Broker;
use rivulet_core::barrier::{BarrierState, CompletionBarrier};
use rivulet_core::envelope::ChannelEnvelope;
use rivulet_core::row::{decode_rows, Row};
use rivulet_operators::spec::CollectSpec;

use crate::error::Result;

#[derive(Debug, Default, Clone)]
pub struct CollectSummary {
    /// (query, row count) per file written.
    pub written: Vec<(String, u64)>,
    /// Queries whose channel aborted; no file is produced for them.
    pub aborted: Vec<String>,
    /// Channels that never completed before the queue drained.
    pub incomplete: usize,
}

pub fn collect(broker: &Arc<dyn Broker>, spec: &CollectSpec) -> Result<CollectSummary> {
    std::fs::create_dir_all(&spec.dir)?;

    let mut consumer = broker.start_consuming(&spec.queue)?;
    let mut barrier = CompletionBarrier::new();
    let mut pending: BTreeMap<String, Vec<Row>> = BTreeMap::new();
    let mut summary = CollectSummary::default();

    while let Some(delivery) = consumer.next()? {
        let envelope =
            ChannelEnvelope::from_headers(&delivery.message.headers, spec.default_tag.as_deref())?;
        let rows = decode_rows(&delivery.message.body)?;
        for channel in envelope.channels() {
            if barrier.is_settled(&channel) {
                tracing::warn!(channel = %channel, "result batch after completion dropped");
                continue;
            }
            if !rows.is_empty() {
                pending
                    .entry(channel.query.clone())
                    .or_default()
                    .extend(rows.iter().cloned());
            }
            match barrier.observe(&channel, &envelope.completion, spec.producers) {
                BarrierState::Open => {}
                BarrierState::Complete => {
                    let rows = pending.remove(&channel.query).unwrap_or_default();
                    let count = write_result(&spec.dir, &channel.query, &rows)?;
                    summary.written.push((channel.query.clone(), count));
                }
                BarrierState::Aborted { code } => {
                    pending.remove(&channel.query);
                    tracing::warn!(channel = %channel, code, "query aborted; no result file");
                    summary.aborted.push(channel.query.clone());
                }
            }
        }
        consumer.ack(delivery.tag)?;
    }
    consumer.stop()?;

    summary.incomplete = barrier.open_channels();
    Ok(summary)
}

fn write_result(dir: &str, query: &str, rows: &[Row]) -> Result<u64> {
    let path = Path::new(dir).join(format!("{query}.csv"));
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&path)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(rows.len() as u64)
}
