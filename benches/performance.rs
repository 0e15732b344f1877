use criterion::{criterion_group, criterion_main, Criterion};
use rivulet_core::envelope::ChannelId;
use rivulet_core::partition::{route, shard_key};
use rivulet_operators::select::SelectConfig;
use rivulet_operators::spec::{FilterOp, FilterSpec, RankMode, SelectSpec, SinkSpec};
use rivulet_operators::topk::RankedRows;

fn make_rows(n: usize) -> Vec<Vec<String>> {
    (0..n)
        .map(|i| {
            vec![
                format!("t{i}"),
                format!("s{}", i % 16),
                format!("{}", (i % 200) as f64 + 0.5),
                format!("2024-{:02}-15 10:00:00", (i % 12) + 1),
            ]
        })
        .collect()
}

fn bench_partitioner(c: &mut Criterion) {
    let channel = ChannelId::new("q1", "selected");
    let rows = make_rows(1024);
    c.bench_function("partition_route", |b| {
        b.iter(|| {
            let mut acc = 0u32;
            for row in &rows {
                acc = acc.wrapping_add(route(&shard_key(&channel, &[&row[1]]), 8));
            }
            acc
        })
    });
}

fn bench_select(c: &mut Criterion) {
    let spec = SelectSpec {
        input: vec![
            "transaction_id".into(),
            "store_id".into(),
            "final_amount".into(),
            "created_at".into(),
        ],
        filters: vec![FilterSpec {
            field: "final_amount".into(),
            op: FilterOp::Ge,
            constants: vec!["75".into()],
        }],
        derive: vec![],
        output: vec!["transaction_id".into(), "final_amount".into()],
        sink: SinkSpec {
            queue: "out".into(),
            shards: 1,
            key: vec![],
            batch_rows: None,
            tag: None,
        },
    };
    let cfg = SelectConfig::from_spec(&spec).unwrap();
    let rows = make_rows(1024);
    c.bench_function("select_apply", |b| {
        b.iter(|| {
            let mut kept = 0usize;
            for row in &rows {
                if cfg.apply(row).unwrap().is_some() {
                    kept += 1;
                }
            }
            kept
        })
    });
}

fn bench_topk_insert(c: &mut Criterion) {
    let rows = make_rows(1024);
    c.bench_function("topk_insert", |b| {
        b.iter(|| {
            let mut ranked = RankedRows::default();
            for (i, row) in rows.iter().enumerate() {
                ranked.insert(RankMode::KeepTopK, 10, (i % 200) as f64, row.clone());
            }
            ranked.len()
        })
    });
}

criterion_group!(engine, bench_partitioner, bench_select, bench_topk_insert);
criterion_main!(engine);
