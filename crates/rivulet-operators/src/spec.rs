//! Declarative operator and pipeline descriptions (YAML).
//!
//! Example node document:
//! ```yaml
//! name: groupby-0
//! queue: groupby.0
//! routes:
//!   - tag: q3.selected
//!     producers: 2
//!     op:
//!       kind: group_by
//!       input: [half_year, store_id, final_amount]
//!       group_by: [half_year, store_id]
//!       aggregates:
//!         - { field: final_amount, reducer: sum, alias: tpv }
//!       sink: { queue: topk, shards: 2, key: [half_year] }
//! ```
//!
//! Specs are pure data; compilation into runnable operators lives with
//! each operator module and resolves every field name to an index once.

use serde::{Deserialize, Serialize};

use crate::error::{OpError, Result};

fn default_one() -> u32 {
    1
}

/// Where an operator's output goes: a queue (sharded or not), the batch
/// builder size, and the routing-key columns that keep rows co-located.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkSpec {
    pub queue: String,
    #[serde(default = "default_one")]
    pub shards: u32,
    /// Output column names hashed (with channel identity) to pick the
    /// shard. Empty = route by channel identity alone.
    #[serde(default)]
    pub key: Vec<String>,
    /// Rows per output batch; `None` falls back to the runtime default.
    #[serde(default)]
    pub batch_rows: Option<usize>,
    /// Type tag stamped on outgoing batches; `None` keeps the input tag.
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "equals_any")]
    EqualsAny,
    #[serde(rename = "not_equals")]
    NotEquals,
}

/// One conjunctive filter term: `[field, op, constants]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub field: String,
    pub op: FilterOp,
    pub constants: Vec<String>,
}

/// Column derivations applied after filtering, before projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeriveSpec {
    /// Months elapsed since 1970-01, from a `YYYY-MM-...` date field.
    MonthsSinceEpoch { from: String, alias: String },
    /// `2024H1` / `2024H2` style half-year label from a date field.
    HalfYear { from: String, alias: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectSpec {
    /// Input column names, positional.
    pub input: Vec<String>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    #[serde(default)]
    pub derive: Vec<DeriveSpec>,
    /// Projected output columns (input or derived names).
    pub output: Vec<String>,
    pub sink: SinkSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReducerKind {
    Sum,
    Avg,
    Max,
    Count,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    /// Input column the reducer consumes (`count` ignores the value).
    pub field: String,
    pub reducer: ReducerKind,
    /// Output column name; defaults to `field`.
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBySpec {
    pub input: Vec<String>,
    pub group_by: Vec<String>,
    pub aggregates: Vec<AggregateSpec>,
    pub sink: SinkSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMode {
    KeepAllRows,
    KeepTopRow,
    KeepTopK,
    KeepLeastK,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopKSpec {
    pub input: Vec<String>,
    pub group_by: Vec<String>,
    pub mode: RankMode,
    /// Comparison-key column; required for every mode but `keep_all_rows`.
    #[serde(default)]
    pub comp_key: Option<String>,
    /// Retained rows per group; required for `keep_top_k`/`keep_least_k`.
    #[serde(default)]
    pub limit: Option<usize>,
    pub sink: SinkSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    InnerOnEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideName {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSideSpec {
    /// Type tag this side consumes.
    pub tag: String,
    /// Input column names, positional.
    pub fields: Vec<String>,
    /// Join-key column.
    pub on: String,
    /// Upstream instances feeding this side's channel.
    #[serde(default = "default_one")]
    pub producers: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinOutputSpec {
    pub side: SideName,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    pub mode: JoinMode,
    pub left: JoinSideSpec,
    pub right: JoinSideSpec,
    pub output: Vec<JoinOutputSpec>,
    /// Join sinks must set `sink.tag`: both input tags converge on one
    /// outgoing channel.
    pub sink: SinkSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OpSpec {
    Select(SelectSpec),
    GroupBy(GroupBySpec),
    TopK(TopKSpec),
    Join(JoinSpec),
}

impl OpSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            OpSpec::Select(_) => "select",
            OpSpec::GroupBy(_) => "group_by",
            OpSpec::TopK(_) => "top_k",
            OpSpec::Join(_) => "join",
        }
    }
}

/// One fan-out registration: a type tag and the operator fed by it.
/// Joins carry their two tags (and per-side producer counts) inside the
/// op spec instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSpec {
    #[serde(default)]
    pub tag: Option<String>,
    /// Upstream instances writing this tag into the node's queue.
    #[serde(default = "default_one")]
    pub producers: u32,
    pub op: OpSpec,
}

/// One worker's routing table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    /// Input queue this worker consumes.
    pub queue: String,
    /// Tag assumed when a batch omits the `types` header.
    #[serde(default)]
    pub default_tag: Option<String>,
    pub routes: Vec<RouteSpec>,
}

/// One logical channel a feed multiplexes: `ids[i]`/`types[i]` on the
/// wire. Queries that process the same table differently carry different
/// tags over the same row payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedChannelSpec {
    pub id: String,
    pub tag: String,
}

/// Dataset feed for the local runner: one CSV file into one (possibly
/// sharded) select queue, multiplexed over the listed channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSpec {
    pub path: String,
    pub queue: String,
    #[serde(default = "default_one")]
    pub shards: u32,
    pub queries: Vec<FeedChannelSpec>,
    #[serde(default)]
    pub batch_rows: Option<usize>,
}

/// Result drain for the local runner: one queue into per-query CSV files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectSpec {
    pub queue: String,
    #[serde(default = "default_one")]
    pub producers: u32,
    /// Directory receiving `<query>.csv` files.
    pub dir: String,
    #[serde(default)]
    pub default_tag: Option<String>,
}

/// A whole local pipeline: feeds, then nodes in drain order, then drains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub feeds: Vec<FeedSpec>,
    pub nodes: Vec<NodeSpec>,
    pub results: Vec<CollectSpec>,
}

pub fn parse_pipeline(yaml_src: &str) -> Result<PipelineSpec> {
    serde_yaml::from_str(yaml_src).map_err(|e| OpError::Config(format!("pipeline yaml: {e}")))
}

pub fn parse_node(yaml_src: &str) -> Result<NodeSpec> {
    serde_yaml::from_str(yaml_src).map_err(|e| OpError::Config(format!("node yaml: {e}")))
}

/// Resolve a column name against a positional layout.
pub fn index_of(layout: &[String], name: &str) -> Result<usize> {
    layout
        .iter()
        .position(|f| f == name)
        .ok_or_else(|| OpError::Config(format!("unknown column '{name}'")))
}
