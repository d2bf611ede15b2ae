use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid record id: {0:?}")]
    InvalidRecordId(String),
    #[error("invalid batch id: {0:?}")]
    InvalidBatchId(String),
    #[error("invalid role: {0:?}")]
    InvalidRole(String),
}
