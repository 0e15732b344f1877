//! Operator semantics driven end-to-end through a worker: wire batches
//! in, wire batches out.

mod support;

use std::sync::Arc;

use rivulet_broker::{Broker, InMemoryBroker};
use rivulet_core::config::RuntimeConfig;
use rivulet_core::envelope::Completion;
use rivulet_node::Worker;
use rivulet_operators::spec::parse_node;
use support::{drain_rows, send_batch};

fn run_node(broker: &InMemoryBroker, yaml: &str) {
    let spec = parse_node(yaml).unwrap();
    let shared: Arc<dyn Broker> = Arc::new(broker.clone());
    let mut worker = Worker::new(shared, &spec, &RuntimeConfig::default()).unwrap();
    worker.run().unwrap();
}

#[test]
fn groupby_sum_count_avg() {
    let yaml = r#"
name: groupby-test
queue: in
routes:
  - tag: data
    op:
      kind: group_by
      input: [k, v]
      group_by: [k]
      aggregates:
        - { field: v, reducer: sum, alias: total }
        - { field: v, reducer: count, alias: n }
        - { field: v, reducer: avg, alias: mean }
        - { field: v, reducer: max, alias: peak }
      sink: { queue: out }
"#;
    let broker = InMemoryBroker::new();
    let shared: Arc<dyn Broker> = Arc::new(broker.clone());
    send_batch(
        &shared,
        "in",
        "q2",
        "data",
        &[&["k", "10"], &["k", "20"]],
        Completion::Pending,
    );
    send_batch(&shared, "in", "q2", "data", &[&["k", "30"]], Completion::Pending);
    send_batch(&shared, "in", "q2", "data", &[], Completion::Finished { sent: 2 });
    run_node(&broker, yaml);

    let (rows, terminals) = drain_rows(&broker, "out");
    // key ++ [sum, count, avg, max]
    assert_eq!(
        rows,
        vec![vec![
            "k".to_string(),
            "60".to_string(),
            "3".to_string(),
            "20".to_string(),
            "30".to_string(),
        ]]
    );
    assert_eq!(terminals.len(), 1);
}

#[test]
fn groupby_emits_one_row_per_key() {
    let yaml = r#"
name: groupby-test
queue: in
routes:
  - tag: data
    op:
      kind: group_by
      input: [k, v]
      group_by: [k]
      aggregates:
        - { field: v, reducer: count }
      sink: { queue: out }
"#;
    let broker = InMemoryBroker::new();
    let shared: Arc<dyn Broker> = Arc::new(broker.clone());
    send_batch(
        &shared,
        "in",
        "q2",
        "data",
        &[&["k1", "5"], &["k1", "7"], &["k2", "2"]],
        Completion::Pending,
    );
    send_batch(&shared, "in", "q2", "data", &[], Completion::Finished { sent: 1 });
    run_node(&broker, yaml);

    let (mut rows, _) = drain_rows(&broker, "out");
    rows.sort();
    assert_eq!(
        rows,
        vec![
            vec!["k1".to_string(), "2".to_string()],
            vec!["k2".to_string(), "1".to_string()],
        ]
    );
}

/// Tie-break: of the two value-10 rows the first-arrived survives the
/// truncation to two entries, and output preserves rank order.
#[test]
fn topk_tie_break_and_truncation() {
    let yaml = r#"
name: topk-test
queue: in
routes:
  - tag: ranked
    op:
      kind: top_k
      input: [g, score, label]
      group_by: [g]
      mode: keep_top_k
      comp_key: score
      limit: 2
      sink: { queue: out }
"#;
    let broker = InMemoryBroker::new();
    let shared: Arc<dyn Broker> = Arc::new(broker.clone());
    send_batch(
        &shared,
        "in",
        "q3",
        "ranked",
        &[
            &["g", "10", "first-ten"],
            &["g", "10", "second-ten"],
            &["g", "5", "five"],
        ],
        Completion::Pending,
    );
    send_batch(&shared, "in", "q3", "ranked", &[], Completion::Finished { sent: 1 });
    run_node(&broker, yaml);

    let (rows, terminals) = drain_rows(&broker, "out");
    assert_eq!(
        rows,
        vec![
            vec!["g".to_string(), "10".to_string(), "first-ten".to_string()],
            vec!["g".to_string(), "10".to_string(), "second-ten".to_string()],
        ]
    );
    assert_eq!(terminals.len(), 1);
}

/// TopK emits one row per retained entry — more than one per group.
#[test]
fn topk_expands_every_retained_row() {
    let yaml = r#"
name: topk-test
queue: in
routes:
  - tag: ranked
    op:
      kind: top_k
      input: [g, score]
      group_by: [g]
      mode: keep_least_k
      comp_key: score
      limit: 2
      sink: { queue: out }
"#;
    let broker = InMemoryBroker::new();
    let shared: Arc<dyn Broker> = Arc::new(broker.clone());
    send_batch(
        &shared,
        "in",
        "q3",
        "ranked",
        &[
            &["a", "9"],
            &["a", "3"],
            &["a", "7"],
            &["b", "1"],
        ],
        Completion::Pending,
    );
    send_batch(&shared, "in", "q3", "ranked", &[], Completion::Finished { sent: 1 });
    run_node(&broker, yaml);

    let (rows, _) = drain_rows(&broker, "out");
    assert_eq!(
        rows,
        vec![
            vec!["a".to_string(), "3".to_string()],
            vec!["a".to_string(), "7".to_string()],
            vec!["b".to_string(), "1".to_string()],
        ]
    );
}

#[test]
fn select_filters_projects_and_drops_malformed_rows() {
    let yaml = r#"
name: select-test
queue: in
default_tag: transactions
routes:
  - tag: transactions
    op:
      kind: select
      input: [transaction_id, final_amount, created_at]
      filters:
        - { field: final_amount, op: ">=", constants: ["75"] }
      derive:
        - { kind: half_year, from: created_at, alias: half_year }
      output: [half_year, transaction_id, final_amount]
      sink: { queue: out, tag: q1.selected }
"#;
    let broker = InMemoryBroker::new();
    let shared: Arc<dyn Broker> = Arc::new(broker.clone());
    send_batch(
        &shared,
        "in",
        "q1",
        "transactions",
        &[
            &["t1", "80", "2024-02-01 09:00:00"],
            &["t2", "not-a-number", "2024-02-01 09:00:00"],
            &["t3", "74.5", "2024-02-01 09:00:00"],
            &["t4", "100", "2024-09-15 17:30:00"],
        ],
        Completion::Pending,
    );
    send_batch(&shared, "in", "q1", "transactions", &[], Completion::Finished { sent: 1 });
    run_node(&broker, yaml);

    let (rows, terminals) = drain_rows(&broker, "out");
    assert_eq!(
        rows,
        vec![
            vec!["2024H1".to_string(), "t1".to_string(), "80".to_string()],
            vec!["2024H2".to_string(), "t4".to_string(), "100".to_string()],
        ]
    );
    assert_eq!(terminals, vec![Completion::Finished { sent: 1 }]);
}
