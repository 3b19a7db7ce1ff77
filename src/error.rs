use crate::domain::payment::{PaymentId, PaymentStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Payment {id} is {status}, only pending payments can be reviewed")]
    NotPending { id: PaymentId, status: PaymentStatus },
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Transaction timed out")]
    Timeout,
    #[error("Transaction error: {0}")]
    TransactionError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Failure of an outbound notification. Only ever logged, never returned to
/// a workflow caller.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Webhook responded with status {0}")]
    Status(u16),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Delivery timed out")]
    Timeout,
    #[error("Delivery rejected: {0}")]
    Rejected(String),
    #[error("Invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Could not build email: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}
