//! TopK: keep the best K rows per grouping key by a comparison key.
//!
//! Insertion is an ordered binary search + truncate, so the retained list
//! is always sorted best-first. The search uses `>=`/`<=` to find the
//! position *after* equal keys: arrival order among ties is preserved,
//! and of several equal-score rows the first-arrived survives
//! truncation. That tie-break is load-bearing — do not tighten the
//! comparisons.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rivulet_broker::Broker;
use rivulet_core::envelope::{ChannelId, ChannelOutcome};
use rivulet_core::row::Row;

use crate::error::{OpError, Result};
use crate::join::Side;
use crate::router::StreamOperator;
use crate::sink::{ShardedSink, SinkConfig};
use crate::spec::{index_of, RankMode, TopKSpec};
use crate::value::{parse_f64, RowError};

/// Retained rows for one group, sorted best-first, capped at the limit.
#[derive(Debug, Clone, Default)]
pub struct RankedRows {
    entries: Vec<(f64, Row)>,
}

impl RankedRows {
    pub fn insert(&mut self, mode: RankMode, limit: usize, score: f64, row: Row) {
        match mode {
            RankMode::KeepAllRows => self.entries.push((score, row)),
            RankMode::KeepTopRow => match self.entries.first() {
                None => self.entries.push((score, row)),
                // strict greater-than: ties keep the incumbent
                Some((best, _)) if score > *best => self.entries[0] = (score, row),
                Some(_) => {}
            },
            RankMode::KeepTopK => {
                let pos = self.entries.partition_point(|(s, _)| *s >= score);
                self.entries.insert(pos, (score, row));
                self.entries.truncate(limit);
            }
            RankMode::KeepLeastK => {
                let pos = self.entries.partition_point(|(s, _)| *s <= score);
                self.entries.insert(pos, (score, row));
                self.entries.truncate(limit);
            }
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.entries.iter().map(|(_, row)| row)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-channel state: grouping tuple → retained rows, expanded in key
/// order on completion.
pub type RankAccumulator = BTreeMap<Vec<String>, RankedRows>;

#[derive(Debug, Clone)]
pub struct TopKConfig {
    input_len: usize,
    group: Vec<usize>,
    comp: Option<(usize, String)>,
    mode: RankMode,
    limit: usize,
}

impl TopKConfig {
    pub fn from_spec(spec: &TopKSpec) -> Result<Self> {
        let group = spec
            .group_by
            .iter()
            .map(|name| index_of(&spec.input, name))
            .collect::<Result<Vec<_>>>()?;
        let comp = match (&spec.comp_key, spec.mode) {
            (_, RankMode::KeepAllRows) => None,
            (Some(name), _) => Some((index_of(&spec.input, name)?, name.clone())),
            (None, mode) => {
                return Err(OpError::Config(format!(
                    "top-k mode {mode:?} needs a comp_key"
                )))
            }
        };
        let limit = match (spec.limit, spec.mode) {
            (_, RankMode::KeepAllRows) | (_, RankMode::KeepTopRow) => 1,
            (Some(limit), _) if limit > 0 => limit,
            _ => {
                return Err(OpError::Config(format!(
                    "top-k mode {:?} needs a positive limit",
                    spec.mode
                )))
            }
        };
        Ok(Self {
            input_len: spec.input.len(),
            group,
            comp,
            mode: spec.mode,
            limit,
        })
    }

    fn fold(&self, acc: &mut RankAccumulator, row: &[String]) -> std::result::Result<(), RowError> {
        if row.len() != self.input_len {
            return Err(RowError(format!(
                "expected {} fields, got {}",
                self.input_len,
                row.len()
            )));
        }
        let score = match &self.comp {
            Some((idx, name)) => parse_f64(row, *idx, name)?,
            None => 0.0,
        };
        let key: Vec<String> = self.group.iter().map(|&i| row[i].clone()).collect();
        acc.entry(key)
            .or_default()
            .insert(self.mode, self.limit, score, row.to_vec());
        Ok(())
    }
}

pub struct TopKOp {
    cfg: TopKConfig,
    sink: ShardedSink,
    accs: HashMap<ChannelId, RankAccumulator>,
}

impl TopKOp {
    pub fn from_spec(spec: &TopKSpec, broker: Arc<dyn Broker>, default_batch: usize) -> Result<Self> {
        let cfg = TopKConfig::from_spec(spec)?;
        // retained rows pass through unprojected; the sink key resolves
        // against the input layout
        let sink_cfg = SinkConfig::from_spec(&spec.sink, &spec.input, default_batch)?;
        Ok(Self {
            cfg,
            sink: ShardedSink::new(broker, sink_cfg),
            accs: HashMap::new(),
        })
    }
}

impl StreamOperator for TopKOp {
    fn name(&self) -> &'static str {
        "top_k"
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
            // one output row per retained entry, not one per group
            for ranked in acc.values() {
                for row in ranked.rows() {
                    self.sink.push(channel, row.clone())?;
                }
            }
        }
        self.sink.finish(channel, outcome)
    }
}
