use thiserror::Error;

use rivulet_broker::BrokerError;

/// Canonical result for operators.
pub type Result<T> = std::result::Result<T, OpError>;

#[derive(Debug, Error)]
pub enum OpError {
    /// Declarative spec does not compile (unknown field/reducer/mode,
    /// missing limit, ...). Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// A batch arrived for a type tag nothing is registered under. There
    /// is no default route to guess; callers treat this as fatal.
    #[error("unknown type tag '{0}'")]
    UnknownTag(String),

    /// Publishing output to the broker failed.
    #[error("transport error: {0}")]
    Transport(#[from] BrokerError),

    #[error("invariant failed: {0}")]
    Invariant(String),
}
