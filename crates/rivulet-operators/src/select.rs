//! Select: per-row filter, derive, project. Stateless — only the sink's
//! routing/batching state persists between rows.

use std::sync::Arc;

use rivulet_broker::Broker;
use rivulet_core::envelope::{ChannelId, ChannelOutcome};
use rivulet_core::row::Row;

use crate::derive::Derivation;
use crate::error::{OpError, Result};
use crate::join::Side;
use crate::predicate::Predicate;
use crate::router::StreamOperator;
use crate::sink::{ShardedSink, SinkConfig};
use crate::spec::{index_of, SelectSpec};
use crate::value::RowError;

/// Where one projected column comes from.
#[derive(Debug, Clone, Copy)]
enum ColSource {
    Input(usize),
    Derived(usize),
}

/// Immutable per-type configuration, shared by every channel.
#[derive(Debug, Clone)]
pub struct SelectConfig {
    input_len: usize,
    predicate: Predicate,
    derives: Vec<Derivation>,
    projection: Vec<ColSource>,
}

impl SelectConfig {
    pub fn from_spec(spec: &SelectSpec) -> Result<Self> {
        let predicate = Predicate::compile(&spec.filters, &spec.input)?;
        let derives = spec
            .derive
            .iter()
            .map(|d| Derivation::compile(d, &spec.input))
            .collect::<Result<Vec<_>>>()?;

        let mut projection = Vec::with_capacity(spec.output.len());
        for name in &spec.output {
            if let Ok(idx) = index_of(&spec.input, name) {
                projection.push(ColSource::Input(idx));
            } else if let Some(idx) = derives.iter().position(|d| d.alias() == name) {
                projection.push(ColSource::Derived(idx));
            } else {
                return Err(OpError::Config(format!(
                    "output column '{name}' is neither an input nor a derived field"
                )));
            }
        }
        Ok(Self {
            input_len: spec.input.len(),
            predicate,
            derives,
            projection,
        })
    }

    /// Filter + derive + project one row. `Ok(None)` means filtered out;
    /// `Err` means the row is malformed and must be dropped.
    pub fn apply(&self, row: &[String]) -> std::result::Result<Option<Row>, RowError> {
        if row.len() != self.input_len {
            return Err(RowError(format!(
                "expected {} fields, got {}",
                self.input_len,
                row.len()
            )));
        }
        if !self.predicate.eval(row)? {
            return Ok(None);
        }
        let derived = self
            .derives
            .iter()
            .map(|d| d.eval(row))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let out = self
            .projection
            .iter()
            .map(|src| match src {
                ColSource::Input(i) => row[*i].clone(),
                ColSource::Derived(i) => derived[*i].clone(),
            })
            .collect();
        Ok(Some(out))
    }
}

pub struct SelectOp {
    cfg: SelectConfig,
    sink: ShardedSink,
}

impl SelectOp {
    pub fn from_spec(spec: &SelectSpec, broker: Arc<dyn Broker>, default_batch: usize) -> Result<Self> {
        let cfg = SelectConfig::from_spec(spec)?;
        let sink_cfg = SinkConfig::from_spec(&spec.sink, &spec.output, default_batch)?;
        Ok(Self {
            cfg,
            sink: ShardedSink::new(broker, sink_cfg),
        })
    }
}

impl StreamOperator for SelectOp {
    fn name(&self) -> &'static str {
        "select"
    }

    fn on_rows(&mut self, channel: &ChannelId, _side: Option<Side>, rows: &[Row]) -> Result<()> {
        for row in rows {
            match self.cfg.apply(row) {
                Ok(Some(out)) => self.sink.push(channel, out)?,
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(channel = %channel, error = %e, "dropping row");
                }
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
        self.sink.finish(channel, outcome)
    }
}
