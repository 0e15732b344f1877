#![forbid(unsafe_code)]
//! rivulet-node: the worker event loops.
//!
//! A worker consumes one queue, one batch at a time, on one thread:
//! decode the envelope, fan the rows out through the type router, fold
//! the completion marker into the barrier, acknowledge. Accumulator state
//! never needs locking because nothing else touches it — parallelism is
//! across shard processes, not within one.
//!
//! `feed` and `collect` are the edges of a local pipeline run: CSV files
//! in, per-query CSV results out.

pub mod collect;
pub mod error;
pub mod feed;
pub mod nodes;
pub mod worker;

pub use error::{NodeError, Result};
pub use nodes::{GroupByNode, JoinNode, SelectNode};
pub use worker::{Worker, WorkerStats};
