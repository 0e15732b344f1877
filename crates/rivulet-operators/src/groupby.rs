//! GroupBy: reduce rows sharing a grouping-key tuple, one reducer per
//! declared aggregate.
//!
//! Reducer state is a typed sum, not a dynamic map, and is only ever
//! advanced by the matching reducer's combine step. Output is emitted at
//! most once per distinct key, only when the channel is known complete —
//! partial aggregates are meaningless downstream.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rivulet_broker::Broker;
use rivulet_core::envelope::{ChannelId, ChannelOutcome};
use rivulet_core::row::Row;

use crate::error::Result;
use crate::join::Side;
use crate::router::StreamOperator;
use crate::sink::{ShardedSink, SinkConfig};
use crate::spec::{index_of, GroupBySpec, ReducerKind};
use crate::value::{field, parse_f64, RowError};

/// Running reduction for one output field of one group.
#[derive(Debug, Clone, PartialEq)]
pub enum ReducerState {
    Sum(f64),
    Count(u64),
    Max(f64),
    Avg { n: u64, mean: f64 },
}

impl ReducerState {
    /// Seed from the first row's value (`None` for `count`).
    fn seed(kind: ReducerKind, value: Option<f64>) -> Self {
        match kind {
            ReducerKind::Sum => ReducerState::Sum(value.unwrap_or(0.0)),
            ReducerKind::Count => ReducerState::Count(1),
            ReducerKind::Max => ReducerState::Max(value.unwrap_or(0.0)),
            ReducerKind::Avg => ReducerState::Avg {
                n: 1,
                mean: value.unwrap_or(0.0),
            },
        }
    }

    /// Associative combine with one more value.
    fn combine(&mut self, value: Option<f64>) {
        match self {
            ReducerState::Sum(total) => *total += value.unwrap_or(0.0),
            ReducerState::Count(n) => *n += 1,
            ReducerState::Max(max) => {
                let v = value.unwrap_or(0.0);
                if v > *max {
                    *max = v;
                }
            }
            // Incremental mean; avoids overflow from a naive sum/n.
            ReducerState::Avg { n, mean } => {
                let v = value.unwrap_or(0.0);
                *mean += (v - *mean) / (*n as f64 + 1.0);
                *n += 1;
            }
        }
    }

    fn render(&self) -> String {
        match self {
            ReducerState::Sum(v) | ReducerState::Max(v) => v.to_string(),
            ReducerState::Count(n) => n.to_string(),
            ReducerState::Avg { mean, .. } => mean.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledAggregate {
    idx: usize,
    name: String,
    kind: ReducerKind,
}

impl CompiledAggregate {
    fn value(&self, row: &[String]) -> std::result::Result<Option<f64>, RowError> {
        match self.kind {
            // count only requires the field to exist
            ReducerKind::Count => field(row, self.idx, &self.name).map(|_| None),
            _ => parse_f64(row, self.idx, &self.name).map(Some),
        }
    }
}

/// Per-channel state: grouping tuple → one reducer state per aggregate.
/// BTreeMap so expansion order is deterministic.
pub type GroupAccumulator = BTreeMap<Vec<String>, Vec<ReducerState>>;

#[derive(Debug, Clone)]
pub struct GroupByConfig {
    input_len: usize,
    group: Vec<(usize, String)>,
    aggs: Vec<CompiledAggregate>,
}

impl GroupByConfig {
    pub fn from_spec(spec: &GroupBySpec) -> Result<Self> {
        let group = spec
            .group_by
            .iter()
            .map(|name| Ok((index_of(&spec.input, name)?, name.clone())))
            .collect::<Result<Vec<_>>>()?;
        let aggs = spec
            .aggregates
            .iter()
            .map(|agg| {
                Ok(CompiledAggregate {
                    idx: index_of(&spec.input, &agg.field)?,
                    name: agg.field.clone(),
                    kind: agg.reducer,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            input_len: spec.input.len(),
            group,
            aggs,
        })
    }

    /// The output layout: grouping key fields then aggregate fields.
    pub fn output_layout(spec: &GroupBySpec) -> Vec<String> {
        let mut layout = spec.group_by.clone();
        for agg in &spec.aggregates {
            layout.push(agg.alias.clone().unwrap_or_else(|| agg.field.clone()));
        }
        layout
    }

    fn fold(&self, acc: &mut GroupAccumulator, row: &[String]) -> std::result::Result<(), RowError> {
        if row.len() != self.input_len {
            return Err(RowError(format!(
                "expected {} fields, got {}",
                self.input_len,
                row.len()
            )));
        }
        // Parse every aggregate value first so a malformed row is dropped
        // atomically, before any state moves.
        let mut values = Vec::with_capacity(self.aggs.len());
        for agg in &self.aggs {
            values.push(agg.value(row)?);
        }
        let key: Vec<String> = self.group.iter().map(|(i, _)| row[*i].clone()).collect();
        match acc.get_mut(&key) {
            Some(states) => {
                for (state, value) in states.iter_mut().zip(values) {
                    state.combine(value);
                }
            }
            None => {
                let states = self
                    .aggs
                    .iter()
                    .zip(values)
                    .map(|(agg, value)| ReducerState::seed(agg.kind, value))
                    .collect();
                acc.insert(key, states);
            }
        }
        Ok(())
    }
}

pub struct GroupByOp {
    cfg: GroupByConfig,
    sink: ShardedSink,
    accs: HashMap<ChannelId, GroupAccumulator>,
}

impl GroupByOp {
    pub fn from_spec(spec: &GroupBySpec, broker: Arc<dyn Broker>, default_batch: usize) -> Result<Self> {
        let cfg = GroupByConfig::from_spec(spec)?;
        let layout = GroupByConfig::output_layout(spec);
        let sink_cfg = SinkConfig::from_spec(&spec.sink, &layout, default_batch)?;
        Ok(Self {
            cfg,
            sink: ShardedSink::new(broker, sink_cfg),
            accs: HashMap::new(),
        })
    }
}

impl StreamOperator for GroupByOp {
    fn name(&self) -> &'static str {
        "group_by"
    }

    fn on_rows(&mut self, channel: &ChannelId, _side: Option<Side>, rows: &[Row]) -> Result<()> {
        let acc = self.accs.entry(channel.clone()).or_default();
        for row in rows {
            if let Err(e) = self.cfg.fold(acc, row) {
                tracing::debug!(channel = %channel, error = %e, "dropping row");
            }
        }
        Ok(())
    }

    fn on_complete(
        &mut self,
        channel: &ChannelId,
        _side: Option<Side>,
        outcome: &ChannelOutcome,
    ) -> Result<()> {
        let acc = self.accs.remove(channel).unwrap_or_default();
        if matches!(outcome, ChannelOutcome::Finished) {
            for (key, states) in acc {
                let mut row = key;
                row.extend(states.iter().map(ReducerState::render));
                self.sink.push(channel, row)?;
            }
        }
        self.sink.finish(channel, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{AggregateSpec, SinkSpec};

    fn spec(reducer: ReducerKind) -> GroupBySpec {
        GroupBySpec {
            input: vec!["k".into(), "v".into()],
            group_by: vec!["k".into()],
            aggregates: vec![AggregateSpec {
                field: "v".into(),
                reducer,
                alias: None,
            }],
            sink: SinkSpec {
                queue: "out".into(),
                shards: 1,
                key: vec![],
                batch_rows: None,
                tag: None,
            },
        }
    }

    fn fold_all(cfg: &GroupByConfig, rows: &[(&str, &str)]) -> GroupAccumulator {
        let mut acc = GroupAccumulator::new();
        for (k, v) in rows {
            cfg.fold(&mut acc, &[k.to_string(), v.to_string()]).unwrap();
        }
        acc
    }

    #[test]
    fn sum_reducer() {
        let cfg = GroupByConfig::from_spec(&spec(ReducerKind::Sum)).unwrap();
        let acc = fold_all(&cfg, &[("k1", "5"), ("k1", "7"), ("k2", "2")]);
        assert_eq!(acc[&vec!["k1".to_string()]], vec![ReducerState::Sum(12.0)]);
        assert_eq!(acc[&vec!["k2".to_string()]], vec![ReducerState::Sum(2.0)]);
    }

    #[test]
    fn count_reducer_ignores_value() {
        let cfg = GroupByConfig::from_spec(&spec(ReducerKind::Count)).unwrap();
        let acc = fold_all(&cfg, &[("k1", "5"), ("k1", "not-numeric"), ("k2", "2")]);
        assert_eq!(acc[&vec!["k1".to_string()]], vec![ReducerState::Count(2)]);
        assert_eq!(acc[&vec!["k2".to_string()]], vec![ReducerState::Count(1)]);
    }

    #[test]
    fn avg_reducer_incremental_mean() {
        let cfg = GroupByConfig::from_spec(&spec(ReducerKind::Avg)).unwrap();
        let acc = fold_all(&cfg, &[("k", "10"), ("k", "20"), ("k", "30")]);
        match &acc[&vec!["k".to_string()]][0] {
            ReducerState::Avg { n, mean } => {
                assert_eq!(*n, 3);
                assert!((mean - 20.0).abs() < 1e-9);
            }
            other => panic!("expected avg state, got {other:?}"),
        }
    }

    #[test]
    fn max_reducer() {
        let cfg = GroupByConfig::from_spec(&spec(ReducerKind::Max)).unwrap();
        let acc = fold_all(&cfg, &[("k", "3.5"), ("k", "9"), ("k", "1")]);
        assert_eq!(acc[&vec!["k".to_string()]], vec![ReducerState::Max(9.0)]);
    }

    #[test]
    fn malformed_row_leaves_state_untouched() {
        let cfg = GroupByConfig::from_spec(&spec(ReducerKind::Sum)).unwrap();
        let mut acc = GroupAccumulator::new();
        cfg.fold(&mut acc, &["k".to_string(), "5".to_string()]).unwrap();
        assert!(cfg.fold(&mut acc, &["k".to_string(), "bad".to_string()]).is_err());
        assert_eq!(acc[&vec!["k".to_string()]], vec![ReducerState::Sum(5.0)]);
    }

    #[test]
    fn render_formats() {
        assert_eq!(ReducerState::Sum(12.0).render(), "12");
        assert_eq!(ReducerState::Sum(12.5).render(), "12.5");
        assert_eq!(ReducerState::Count(3).render(), "3");
        assert_eq!(ReducerState::Avg { n: 3, mean: 20.0 }.render(), "20");
    }
}
