//! Convenient re-exports for downstream crates.

pub use crate::barrier::{BarrierState, ChannelTally, CompletionBarrier};
pub use crate::config::RuntimeConfig;
pub use crate::envelope::{ChannelEnvelope, ChannelId, ChannelOutcome, Completion};
pub use crate::error::{Error, Result};
pub use crate::row::{decode_rows, encode_rows, Row};
pub use crate::schema::TableKind;
