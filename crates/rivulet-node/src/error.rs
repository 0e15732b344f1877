use thiserror::Error;

use rivulet_broker::BrokerError;
use rivulet_operators::OpError;

/// Canonical result for worker nodes.
pub type Result<T> = std::result::Result<T, NodeError>;

#[derive(Debug, Error)]
pub enum NodeError {
    /// Malformed wire batch (headers or body). Non-fatal by default: the
    /// worker logs, acks the poison message, and keeps consuming.
    #[error("{0}")]
    Core(#[from] rivulet_core::error::Error),

    #[error(transparent)]
    Op(#[from] OpError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Node spec routes an operator kind the role does not host.
    #[error("role error: {0}")]
    Role(String),

    /// Dataset feed problems (unrecognized header, bad file).
    #[error("feed error: {0}")]
    Feed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl NodeError {
    /// Whether the consumption loop must stop. Malformed messages are the
    /// defined non-fatal class; everything else (unknown tag, transport,
    /// config) aborts the worker so the orchestrator can restart it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, NodeError::Core(_))
    }
}
