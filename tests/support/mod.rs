//! Shared helpers for the integration suite.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rivulet_broker::{Broker, InMemoryBroker, Message};
use rivulet_core::envelope::{ChannelEnvelope, Completion};
use rivulet_core::row::{decode_rows, encode_rows, Row};

static DIR_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Fresh scratch directory under the system temp dir.
pub fn create_temp_dir(label: &str) -> String {
    let seq = DIR_SEQ.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "rivulet-test-{label}-{}-{seq}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).expect("Failed to create temp dir");
    dir.to_string_lossy().into_owned()
}

pub fn rows(data: &[&[&str]]) -> Vec<Row> {
    data.iter()
        .map(|row| row.iter().map(|f| f.to_string()).collect())
        .collect()
}

/// Publish one wire batch for a single channel.
pub fn send_batch(
    broker: &Arc<dyn Broker>,
    queue: &str,
    query: &str,
    tag: &str,
    data: &[&[&str]],
    completion: Completion,
) {
    let envelope = ChannelEnvelope::single(query, tag, completion);
    let body = encode_rows(&rows(data)).into_bytes();
    broker
        .send(queue, Message::new(envelope.to_headers(None), body))
        .expect("send failed");
}

/// Drain a queue: every (envelope, rows) pair in delivery order.
pub fn drain_queue(broker: &InMemoryBroker, queue: &str) -> Vec<(ChannelEnvelope, Vec<Row>)> {
    let mut consumer = broker.start_consuming(queue).expect("consume failed");
    let mut out = Vec::new();
    while let Some(delivery) = consumer.next().expect("next failed") {
        let envelope =
            ChannelEnvelope::from_headers(&delivery.message.headers, None).expect("bad headers");
        let body = decode_rows(&delivery.message.body).expect("bad body");
        consumer.ack(delivery.tag).expect("ack failed");
        out.push((envelope, body));
    }
    out
}

/// All data rows seen on a queue, plus the terminal completions.
pub fn drain_rows(broker: &InMemoryBroker, queue: &str) -> (Vec<Row>, Vec<Completion>) {
    let mut data = Vec::new();
    let mut terminals = Vec::new();
    for (envelope, rows) in drain_queue(broker, queue) {
        data.extend(rows);
        if envelope.completion.is_terminal() {
            terminals.push(envelope.completion);
        }
    }
    (data, terminals)
}
