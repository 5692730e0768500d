use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    /// Failure reported by the billing service. The message is forwarded to the
    /// host untouched.
    #[error("{0}")]
    Adapter(String),
    #[error("billing service is not connected")]
    Disconnected,
    #[error("malformed catalog payload: {0}")]
    MalformedPayload(String),
    #[error("illegal transaction transition: {0}")]
    IllegalTransition(String),
    #[error("purchase coordinator is no longer running")]
    CoordinatorClosed,
    #[error("coordinator task failed: {0}")]
    WorkerError(#[from] tokio::task::JoinError),
    #[error("invalid host command: {0}")]
    InvalidCommand(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BillingError>;
