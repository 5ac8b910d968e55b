use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaperError {
    #[error("invalid keep count {0}: must be zero or greater")]
    InvalidKeepCount(i64),

    #[error("malformed image record in repository '{repository}': {reason}")]
    MalformedRecord { repository: String, reason: String },

    #[error("duplicate digest {digest} in repository '{repository}'")]
    DuplicateDigest { repository: String, digest: String },

    #[error("tag '{tag}' in repository '{repository}' resolves to both {first} and {second}")]
    ConflictingTag {
        repository: String,
        tag: String,
        first: String,
        second: String,
    },

    #[error("invalid image reference '{0}'")]
    InvalidReference(String),

    #[error("unsupported snapshot format: {0}")]
    UnsupportedFormat(String),

    #[error("registry error for '{repository}': {message}")]
    Registry { repository: String, message: String },

    #[error("config not found: {0}")]
    ConfigNotFound(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReaperError>;
