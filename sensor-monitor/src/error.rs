//! Crate-level error type.

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("network worker already started for this context")]
    WorkerAlreadyStarted,
    #[error("giving up after {0} consecutive connection failures")]
    RetriesExhausted(u32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
