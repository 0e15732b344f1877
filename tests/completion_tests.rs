//! Completion-barrier behavior through a whole worker: out-of-order
//! terminals, multiple producers, aborts, stragglers.

mod support;

use std::sync::Arc;

use rivulet_broker::{Broker, InMemoryBroker};
use rivulet_core::config::RuntimeConfig;
use rivulet_core::envelope::Completion;
use rivulet_node::Worker;
use rivulet_operators::spec::parse_node;
use support::{drain_rows, send_batch};

fn count_node(producers: u32) -> String {
    format!(
        r#"
name: groupby-test
queue: in
routes:
  - tag: data
    producers: {producers}
    op:
      kind: group_by
      input: [k, v]
      group_by: [k]
      aggregates:
        - {{ field: v, reducer: sum }}
      sink: {{ queue: out }}
"#
    )
}

fn run_worker(broker: &InMemoryBroker, producers: u32) {
    let spec = parse_node(&count_node(producers)).unwrap();
    let shared: Arc<dyn Broker> = Arc::new(broker.clone());
    let mut worker = Worker::new(shared, &spec, &RuntimeConfig::default()).unwrap();
    worker.run().unwrap();
}

/// Every permutation of two data batches and the terminal must flush the
/// aggregate exactly once, with the same value.
#[test]
fn flush_happens_once_regardless_of_arrival_order() {
    let orders: &[&[(&str, Completion)]] = &[
        &[
            ("data1", Completion::Pending),
            ("data2", Completion::Pending),
            ("eof", Completion::Finished { sent: 2 }),
        ],
        &[
            ("data1", Completion::Pending),
            ("eof", Completion::Finished { sent: 2 }),
            ("data2", Completion::Pending),
        ],
        &[
            ("eof", Completion::Finished { sent: 2 }),
            ("data1", Completion::Pending),
            ("data2", Completion::Pending),
        ],
    ];

    for order in orders {
        let broker = InMemoryBroker::new();
        let shared: Arc<dyn Broker> = Arc::new(broker.clone());
        for (kind, completion) in order.iter() {
            let rows: &[&[&str]] = match *kind {
                "data1" => &[&["k1", "5"]],
                "data2" => &[&["k1", "7"], &["k2", "2"]],
                _ => &[],
            };
            send_batch(&shared, "in", "q1", "data", rows, *completion);
        }
        run_worker(&broker, 1);

        let (mut rows, terminals) = drain_rows(&broker, "out");
        rows.sort();
        assert_eq!(
            rows,
            vec![
                vec!["k1".to_string(), "12".to_string()],
                vec!["k2".to_string(), "2".to_string()],
            ],
            "order {order:?}"
        );
        assert_eq!(terminals.len(), 1, "order {order:?}");
    }
}

/// With two producers the channel stays open until both terminals arrive
/// and the summed counts are met, whatever the interleaving.
#[test]
fn two_producers_interleaved() {
    let broker = InMemoryBroker::new();
    let shared: Arc<dyn Broker> = Arc::new(broker.clone());

    send_batch(&shared, "in", "q1", "data", &[&["a", "1"]], Completion::Pending);
    // producer 1 terminates early, before producer 2 sent anything
    send_batch(&shared, "in", "q1", "data", &[], Completion::Finished { sent: 1 });
    send_batch(&shared, "in", "q1", "data", &[&["a", "2"]], Completion::Pending);
    send_batch(&shared, "in", "q1", "data", &[&["b", "4"]], Completion::Pending);
    send_batch(&shared, "in", "q1", "data", &[], Completion::Finished { sent: 2 });
    run_worker(&broker, 2);

    let (mut rows, terminals) = drain_rows(&broker, "out");
    rows.sort();
    assert_eq!(
        rows,
        vec![
            vec!["a".to_string(), "3".to_string()],
            vec!["b".to_string(), "4".to_string()],
        ]
    );
    assert_eq!(terminals, vec![Completion::Finished { sent: 1 }]);
}

/// The downstream terminal carries this stage's own batch count, so the
/// next stage can apply the same barrier recursively.
#[test]
fn downstream_terminal_counts_this_stages_batches() {
    let broker = InMemoryBroker::new();
    let shared: Arc<dyn Broker> = Arc::new(broker.clone());
    for i in 0..5 {
        send_batch(
            &shared,
            "in",
            "q1",
            "data",
            &[&[&format!("k{i}"), "1"]],
            Completion::Pending,
        );
    }
    send_batch(&shared, "in", "q1", "data", &[], Completion::Finished { sent: 5 });

    // batch_rows=2 forces the 5 output groups into 3 data batches
    let spec = parse_node(&count_node(1)).unwrap();
    let mut config = RuntimeConfig::default();
    config.batch_rows = 2;
    let mut worker = Worker::new(Arc::new(broker.clone()) as Arc<dyn Broker>, &spec, &config).unwrap();
    worker.run().unwrap();

    let (rows, terminals) = drain_rows(&broker, "out");
    assert_eq!(rows.len(), 5);
    assert_eq!(terminals, vec![Completion::Finished { sent: 3 }]);
}

/// An abort propagates downstream without flushing partial aggregates.
#[test]
fn abort_discards_partial_aggregates() {
    let broker = InMemoryBroker::new();
    let shared: Arc<dyn Broker> = Arc::new(broker.clone());
    send_batch(&shared, "in", "q1", "data", &[&["k1", "5"]], Completion::Pending);
    send_batch(&shared, "in", "q1", "data", &[], Completion::Aborted { code: -4 });
    run_worker(&broker, 1);

    let (rows, terminals) = drain_rows(&broker, "out");
    assert!(rows.is_empty());
    assert_eq!(terminals, vec![Completion::Aborted { code: -4 }]);
}

/// A batch arriving after its channel settled is dropped, not re-opened.
#[test]
fn straggler_after_completion_is_dropped() {
    let broker = InMemoryBroker::new();
    let shared: Arc<dyn Broker> = Arc::new(broker.clone());
    send_batch(&shared, "in", "q1", "data", &[&["k1", "5"]], Completion::Pending);
    send_batch(&shared, "in", "q1", "data", &[], Completion::Finished { sent: 1 });
    send_batch(&shared, "in", "q1", "data", &[&["k1", "50"]], Completion::Pending);
    run_worker(&broker, 1);

    let (rows, terminals) = drain_rows(&broker, "out");
    assert_eq!(rows, vec![vec!["k1".to_string(), "5".to_string()]]);
    assert_eq!(terminals.len(), 1);
}

/// An empty payload is a delivery-partition boundary: it counts toward
/// the tally but folds no rows.
#[test]
fn empty_payload_counts_toward_tally() {
    let broker = InMemoryBroker::new();
    let shared: Arc<dyn Broker> = Arc::new(broker.clone());
    send_batch(&shared, "in", "q1", "data", &[&["k1", "5"]], Completion::Pending);
    send_batch(&shared, "in", "q1", "data", &[], Completion::Pending);
    send_batch(&shared, "in", "q1", "data", &[], Completion::Finished { sent: 2 });
    run_worker(&broker, 1);

    let (rows, terminals) = drain_rows(&broker, "out");
    assert_eq!(rows, vec![vec!["k1".to_string(), "5".to_string()]]);
    assert_eq!(terminals.len(), 1);
}
