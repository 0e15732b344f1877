use thiserror::Error;

/// Standard broker result alias.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Transport-level failure taxonomy.
///
/// Classification guidance:
/// - [`BrokerError::Disconnected`]: the connection is gone; the worker
///   loop should abort and let the orchestrator restart the process
/// - [`BrokerError::Message`]: one publish/consume operation failed; a
///   worker may log and keep consuming
/// - [`BrokerError::Close`] / [`BrokerError::Delete`]: teardown failures,
///   surfaced so shutdown paths can report them
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker disconnected: {0}")]
    Disconnected(String),

    #[error("message error: {0}")]
    Message(String),

    #[error("close error: {0}")]
    Close(String),

    #[error("delete error: {0}")]
    Delete(String),
}
