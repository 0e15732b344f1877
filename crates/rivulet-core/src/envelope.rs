//! Channel envelopes: which logical streams a batch carries and whether
//! the sender is done with them.
//!
//! One physical batch may multiplex several channels — `queries[i]` and
//! `tags[i]` together name one logical stream, and every listed channel
//! sees the batch's full row payload. The wire form is a JSON header map
//! with keys `ids`, `types` (optional when the queue has a single default
//! type), and `partition` (signed; absent = not done, `>= 0` = normal
//! completion count, `< 0` = abort code).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Header key for the logical-query identifier list.
pub const H_IDS: &str = "ids";
/// Header key for the parallel type-tag list.
pub const H_TYPES: &str = "types";
/// Header key for the signed completion marker.
pub const H_PARTITION: &str = "partition";

/// One logical (query, type-tag) stream flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId {
    pub query: String,
    pub tag: String,
}

impl ChannelId {
    pub fn new(query: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            tag: tag.into(),
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.query, self.tag)
    }
}

/// Completion state carried by a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Completion {
    /// More data may follow.
    Pending,
    /// Terminal marker; `sent` is the number of non-terminal batches the
    /// sender emitted for this channel before this one.
    Finished { sent: u64 },
    /// Terminal marker for an upstream failure; downstream must propagate
    /// the abort instead of flushing partial aggregates.
    Aborted { code: i32 },
}

impl Completion {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Completion::Pending)
    }

    /// Decode from the signed wire header.
    pub fn from_partition(partition: Option<i64>) -> Self {
        match partition {
            None => Completion::Pending,
            Some(p) if p >= 0 => Completion::Finished { sent: p as u64 },
            Some(p) => Completion::Aborted { code: p as i32 },
        }
    }

    /// Encode to the signed wire header.
    pub fn to_partition(&self) -> Option<i64> {
        match self {
            Completion::Pending => None,
            Completion::Finished { sent } => Some(*sent as i64),
            Completion::Aborted { code } => Some(i64::from(*code)),
        }
    }
}

/// Terminal outcome of a channel, as seen by a consumer once its tally
/// closes (see [`crate::barrier`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOutcome {
    Finished,
    Aborted { code: i32 },
}

/// The envelope of one wire batch.
///
/// Invariant: `queries` and `tags` have equal length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEnvelope {
    pub queries: Vec<String>,
    pub tags: Vec<String>,
    pub completion: Completion,
}

impl ChannelEnvelope {
    pub fn new(queries: Vec<String>, tags: Vec<String>, completion: Completion) -> Result<Self> {
        if queries.len() != tags.len() {
            return Err(Error::Envelope(format!(
                "ids/types length mismatch: {} vs {}",
                queries.len(),
                tags.len()
            )));
        }
        if queries.is_empty() {
            return Err(Error::Envelope("envelope carries no channels".into()));
        }
        Ok(Self {
            queries,
            tags,
            completion,
        })
    }

    pub fn single(query: impl Into<String>, tag: impl Into<String>, completion: Completion) -> Self {
        Self {
            queries: vec![query.into()],
            tags: vec![tag.into()],
            completion,
        }
    }

    /// The channels this batch is addressed to.
    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.queries
            .iter()
            .zip(self.tags.iter())
            .map(|(q, t)| ChannelId::new(q.clone(), t.clone()))
    }

    /// Encode into the wire header map. `types` is written only when some
    /// tag differs from `default_tag`.
    pub fn to_headers(&self, default_tag: Option<&str>) -> Map<String, Value> {
        let mut headers = Map::new();
        headers.insert(
            H_IDS.to_string(),
            Value::Array(self.queries.iter().cloned().map(Value::String).collect()),
        );
        let all_default = match default_tag {
            Some(d) => self.tags.iter().all(|t| t == d),
            None => false,
        };
        if !all_default {
            headers.insert(
                H_TYPES.to_string(),
                Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some(p) = self.completion.to_partition() {
            headers.insert(H_PARTITION.to_string(), Value::from(p));
        }
        headers
    }

    /// Decode from the wire header map. When `types` is omitted every
    /// channel uses `default_tag`; omitting both is an envelope error.
    pub fn from_headers(headers: &Map<String, Value>, default_tag: Option<&str>) -> Result<Self> {
        let queries = string_list(headers, H_IDS)?
            .ok_or_else(|| Error::Envelope(format!("missing '{H_IDS}' header")))?;
        let tags = match string_list(headers, H_TYPES)? {
            Some(tags) => tags,
            None => {
                let tag = default_tag.ok_or_else(|| {
                    Error::Envelope(format!("missing '{H_TYPES}' header and no default type"))
                })?;
                vec![tag.to_string(); queries.len()]
            }
        };
        let partition = match headers.get(H_PARTITION) {
            None => None,
            Some(v) => Some(v.as_i64().ok_or_else(|| {
                Error::Envelope(format!("'{H_PARTITION}' header is not an integer: {v}"))
            })?),
        };
        Self::new(queries, tags, Completion::from_partition(partition))
    }
}

fn string_list(headers: &Map<String, Value>, key: &str) -> Result<Option<Vec<String>>> {
    let Some(value) = headers.get(key) else {
        return Ok(None);
    };
    let arr = value
        .as_array()
        .ok_or_else(|| Error::Envelope(format!("'{key}' header is not a list")))?;
    let mut out = Vec::with_capacity(arr.len());
    for v in arr {
        let s = v
            .as_str()
            .ok_or_else(|| Error::Envelope(format!("'{key}' header holds a non-string: {v}")))?;
        out.push(s.to_string());
    }
    Ok(Some(out))
}
