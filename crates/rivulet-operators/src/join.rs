//! Join: buffering two-sided inner equality join.
//!
//! Both sides stream in and complete independently; there is no
//! coordinator. While both sides are open the operator only buffers.
//! When one side finishes, rows already buffered on the other side are
//! drained against the finished buffer exactly once (and that other
//! buffer is cleared so its own completion cannot re-match them); from
//! then on each arriving row of the still-open side joins immediately
//! against the frozen buffer and is not stored. Inputs buffer in full —
//! an intentional O(n·m) nested loop at this system's data volumes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rivulet_broker::Broker;
use rivulet_core::envelope::{ChannelId, ChannelOutcome};
use rivulet_core::row::Row;

use crate::error::{OpError, Result};
use crate::router::StreamOperator;
use crate::sink::{ShardedSink, SinkConfig};
use crate::spec::{index_of, JoinSpec, SideName};
use crate::value::{field, RowError};

/// Which input of a two-sided operator a batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// One side's buffered state. Once `finished`, `rows` is only read.
#[derive(Debug, Default)]
struct SideBuffer {
    rows: Vec<Row>,
    finished: bool,
}

/// Per-join-id state, shared across the two channels of the join.
#[derive(Debug, Default)]
pub struct JoinAccumulator {
    left: SideBuffer,
    right: SideBuffer,
}

impl JoinAccumulator {
    fn side(&self, side: Side) -> &SideBuffer {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut SideBuffer {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

/// Column projection resolved at configuration time: each output column
/// is an ordered (source side, source index) pair, so row assembly is a
/// single linear pass.
#[derive(Debug, Clone)]
pub struct JoinConfig {
    left_len: usize,
    right_len: usize,
    left_key: usize,
    right_key: usize,
    output: Vec<(Side, usize)>,
}

impl JoinConfig {
    pub fn from_spec(spec: &JoinSpec) -> Result<Self> {
        let left_key = index_of(&spec.left.fields, &spec.left.on)?;
        let right_key = index_of(&spec.right.fields, &spec.right.on)?;
        let output = spec
            .output
            .iter()
            .map(|col| {
                Ok(match col.side {
                    SideName::Left => (Side::Left, index_of(&spec.left.fields, &col.field)?),
                    SideName::Right => (Side::Right, index_of(&spec.right.fields, &col.field)?),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            left_len: spec.left.fields.len(),
            right_len: spec.right.fields.len(),
            left_key,
            right_key,
            output,
        })
    }

    fn expected_len(&self, side: Side) -> usize {
        match side {
            Side::Left => self.left_len,
            Side::Right => self.right_len,
        }
    }

    fn key_idx(&self, side: Side) -> usize {
        match side {
            Side::Left => self.left_key,
            Side::Right => self.right_key,
        }
    }

    fn assemble(&self, left: &[String], right: &[String]) -> Row {
        self.output
            .iter()
            .map(|(side, idx)| match side {
                Side::Left => left[*idx].clone(),
                Side::Right => right[*idx].clone(),
            })
            .collect()
    }

    /// Validate a row's shape and return its join key.
    fn check_row<'r>(&self, side: Side, row: &'r Row) -> std::result::Result<&'r str, RowError> {
        if row.len() != self.expected_len(side) {
            return Err(RowError(format!(
                "expected {} fields, got {}",
                self.expected_len(side),
                row.len()
            )));
        }
        field(row, self.key_idx(side), "join key")
    }
}

pub struct JoinOp {
    cfg: JoinConfig,
    sink: ShardedSink,
    /// Keyed by join id — the query id shared by both sides' channels.
    accs: HashMap<String, JoinAccumulator>,
    aborted: HashSet<String>,
}

impl JoinOp {
    pub fn from_spec(spec: &JoinSpec, broker: Arc<dyn Broker>, default_batch: usize) -> Result<Self> {
        if spec.sink.tag.is_none() {
            return Err(OpError::Config(
                "join sink must set a tag: both input tags converge on one outgoing channel"
                    .into(),
            ));
        }
        let cfg = JoinConfig::from_spec(spec)?;
        let layout: Vec<String> = spec.output.iter().map(|col| col.field.clone()).collect();
        let sink_cfg = SinkConfig::from_spec(&spec.sink, &layout, default_batch)?;
        Ok(Self {
            cfg,
            sink: ShardedSink::new(broker, sink_cfg),
            accs: HashMap::new(),
            aborted: HashSet::new(),
        })
    }
}

impl StreamOperator for JoinOp {
    fn name(&self) -> &'static str {
        "join"
    }

    fn on_rows(&mut self, channel: &ChannelId, side: Option<Side>, rows: &[Row]) -> Result<()> {
        let side = side.ok_or_else(|| {
            OpError::Invariant("join received a batch without a side marker".into())
        })?;
        if self.aborted.contains(&channel.query) {
            tracing::debug!(channel = %channel, "dropping rows for aborted join");
            return Ok(());
        }
        let acc = self.accs.entry(channel.query.clone()).or_default();
        let other_finished = acc.side(side.opposite()).finished;
        let mut matched: Vec<Row> = Vec::new();
        for row in rows {
            let key = match self.cfg.check_row(side, row) {
                Ok(key) => key,
                Err(e) => {
                    tracing::debug!(channel = %channel, error = %e, "dropping row");
                    continue;
                }
            };
            if other_finished {
                // nested loop against the frozen opposite buffer; the row
                // itself is not stored
                let key_idx = self.cfg.key_idx(side.opposite());
                for other_row in &acc.side(side.opposite()).rows {
                    if other_row.get(key_idx).map(String::as_str) == Some(key) {
                        matched.push(match side {
                            Side::Left => self.cfg.assemble(row, other_row),
                            Side::Right => self.cfg.assemble(other_row, row),
                        });
                    }
                }
            } else {
                acc.side_mut(side).rows.push(row.clone());
            }
        }
        for row in matched {
            self.sink.push(channel, row)?;
        }
        Ok(())
    }

    fn on_complete(
        &mut self,
        channel: &ChannelId,
        side: Option<Side>,
        outcome: &ChannelOutcome,
    ) -> Result<()> {
        let side = side.ok_or_else(|| {
            OpError::Invariant("join received a completion without a side marker".into())
        })?;
        let join_id = channel.query.clone();
        if self.aborted.contains(&join_id) {
            return Ok(());
        }
        if let ChannelOutcome::Aborted { .. } = outcome {
            // one abort terminates the whole join id; partial matches are
            // never flushed
            self.aborted.insert(join_id.clone());
            self.accs.remove(&join_id);
            return self.sink.finish(channel, outcome);
        }

        let acc = self.accs.entry(join_id.clone()).or_default();
        acc.side_mut(side).finished = true;

        // one-time drain: rows the opposite side buffered before this
        // completion, against this side's frozen buffer; the opposite
        // buffer is cleared so its own completion cannot re-match them
        let opposite_rows = std::mem::take(&mut acc.side_mut(side.opposite()).rows);
        let mut matched: Vec<Row> = Vec::new();
        {
            let this = acc.side(side);
            let key_this = self.cfg.key_idx(side);
            let key_opp = self.cfg.key_idx(side.opposite());
            for opp_row in &opposite_rows {
                let Some(opp_key) = opp_row.get(key_opp) else {
                    continue;
                };
                for this_row in &this.rows {
                    if this_row.get(key_this) == Some(opp_key) {
                        matched.push(match side {
                            Side::Left => self.cfg.assemble(this_row, opp_row),
                            Side::Right => self.cfg.assemble(opp_row, this_row),
                        });
                    }
                }
            }
        }
        let both_done = acc.left.finished && acc.right.finished;
        for row in matched {
            self.sink.push(channel, row)?;
        }
        if both_done {
            self.accs.remove(&join_id);
            self.sink.finish(channel, outcome)?;
        }
        Ok(())
    }
}
