#![forbid(unsafe_code)]
//! rivulet-operators: the four stream operators (select/group-by/top-k/join),
//! their accumulators, the type-based fan-out router, and the sharded
//! output sink.
//!
//! Design intent:
//! - Operator configurations are compiled once at startup from the
//!   declarative specs in `spec`; field names resolve to indices there,
//!   so per-row work never looks anything up by name.
//! - Per-channel mutable state (accumulators) is owned by the operator
//!   and touched by exactly one worker thread; no locking.
//! - Row-level failures are logged and drop that row only; configuration
//!   failures are errors at compile time.

pub mod derive;
pub mod error;
pub mod groupby;
pub mod join;
pub mod predicate;
pub mod router;
pub mod select;
pub mod sink;
pub mod spec;
pub mod topk;
pub mod value;

pub use error::{OpError, Result};
pub use router::{StreamOperator, TypeRouter};
pub use sink::{ShardedSink, SinkConfig};
