use crate::request::Phase;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Image limit reached: {count} >= {max}")]
    TooManyImages { count: usize, max: usize },
    #[error("Unsupported image type: {0}")]
    UnsupportedImage(String),
    #[error("Image payload is empty")]
    EmptyImage,
    #[error("Image was already captured for this scan")]
    DuplicateImage,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ScanError {
    #[error("No scan credits remaining")]
    CreditsDenied,
    #[error("Operation not allowed in phase {0:?}")]
    InvalidPhase(Phase),
    #[error("No images captured")]
    NothingToProcess,
    #[error("No batch receipts are waiting for extraction")]
    NoPendingReceipts,
    #[error("No failed batch receipts to retry")]
    NoFailedReceipts,
    #[error("No results to save")]
    NothingToSave,
    #[error("Scan is not in batch mode")]
    NotBatchMode,
}

/// Failures inside the persistence adapter. These never leave the adapter;
/// they are logged and the offending envelope is cleared.
#[derive(thiserror::Error, Debug)]
pub enum PersistError {
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("Failed to encode envelope: {0}")]
    Encode(String),
    #[error("Failed to decode envelope: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("Schema version {found} does not match {expected}")]
    SchemaMismatch { found: u32, expected: u32 },
    #[error("Persisted scan violates request invariants")]
    Inconsistent,
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for PersistError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        PersistError::Encode(value.to_string())
    }
}
