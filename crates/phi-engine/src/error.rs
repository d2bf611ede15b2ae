#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown schema version: {0}")]
    UnknownSchemaVersion(String),

    #[error(transparent)]
    Validate(#[from] phi_validate::ValidateError),

    #[error(transparent)]
    Redact(#[from] phi_redact::RedactError),
}
