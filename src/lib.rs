#![forbid(unsafe_code)]
//! Rivulet: a partitioned stream-processing pipeline over a message
//! broker.
//!
//! Facade crate re-exporting the workspace pieces for the integration
//! suite, benches, and embedders. The interesting code lives in
//! `rivulet-core` (envelopes, completion tallies, partition hashing),
//! `rivulet-operators` (select/group-by/top-k/join + router + sinks),
//! `rivulet-broker` (transport boundary), and `rivulet-node` (worker
//! loops).

pub use rivulet_broker;
pub use rivulet_core;
pub use rivulet_node;
pub use rivulet_operators;
