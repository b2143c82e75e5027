use thiserror::Error;

/// Failures of the persistent key-value store itself. These are reported to
/// the user and abort the current operation; nothing retries.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable for key {key}: {source}")]
    Unavailable {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode value for key {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("user already exists: {email}")]
    DuplicateEmail { email: String },

    #[error("invalid email address: {email}")]
    InvalidEmail { email: String },

    #[error("auth service failure: {0}")]
    Remote(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task title must not be empty")]
    EmptyTitle,

    #[error("no matching task: {id}")]
    TaskNotFound { id: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}
