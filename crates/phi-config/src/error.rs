use std::path::PathBuf;

use phi_crypto::KeyError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("no schema documents declared")]
    NoSchemas,

    #[error("invalid regex for pattern {name}: {message}")]
    InvalidPattern { name: String, message: String },

    #[error("duplicate pattern name: {name}")]
    DuplicatePattern { name: String },

    #[error("invalid constraint pattern for schema {version} field {field}: {message}")]
    InvalidConstraintPattern {
        version: String,
        field: String,
        message: String,
    },

    #[error("matrix must acknowledge the unlisted-field default with unlisted_fields = \"public\"")]
    UnlistedDefaultNotAcknowledged,

    #[error("matrix entry {field} names undeclared role {role}")]
    UnknownRole { field: String, role: String },

    #[error("invalid role name: {0}")]
    InvalidRole(String),

    #[error("encryption entry for {field} cites unknown key reference {key_ref}")]
    UnknownKeyRef { field: String, key_ref: String },

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("schema {version} field {field} is sensitive but has no encryption entry")]
    SensitiveWithoutEntry { version: String, field: String },

    #[error("invalid tokenization salt: {0}")]
    InvalidSalt(String),

    #[error("worker count must be at least 1")]
    ZeroWorkers,
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
