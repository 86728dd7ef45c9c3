use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to generate identifier: {0}")]
    IdGeneration(String),

    #[error("Session has no authenticated user")]
    NotAuthenticated,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
}

/// Failures reported by [`SessionStore`](crate::storage::SessionStore) implementations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid session ID: {0}")]
    InvalidSessionId(String),
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event handler error: {0}")]
    HandlerError(String),
}

impl Error {
    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    pub fn is_session_error(&self) -> bool {
        matches!(self, Error::Session(_))
    }

    pub fn is_event_error(&self) -> bool {
        matches!(self, Error::Event(_))
    }
}
