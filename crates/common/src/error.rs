// Typed error taxonomy shared by every operation.
//
// Each variant maps to a stable kind string the transport layer can translate
// into a status code without parsing messages.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OpError {
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    #[error("OUT_OF_BOUNDS: {0}")]
    OutOfBounds(String),

    #[error("ALREADY_EXISTS: {0}")]
    AlreadyExists(String),

    #[error("CONFLICT: {0}")]
    Conflict(String),

    #[error("UNSUPPORTED: {0}")]
    Unsupported(String),

    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl OpError {
    /// Stable machine-readable kind for transport mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            OpError::InvalidInput(_) => "INVALID_INPUT",
            OpError::NotFound(_) => "NOT_FOUND",
            OpError::OutOfBounds(_) => "OUT_OF_BOUNDS",
            OpError::AlreadyExists(_) => "ALREADY_EXISTS",
            OpError::Conflict(_) => "CONFLICT",
            OpError::Unsupported(_) => "UNSUPPORTED",
            OpError::Internal(_) => "INTERNAL",
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        OpError::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        OpError::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        OpError::Internal(msg.into())
    }
}

impl From<std::io::Error> for OpError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            OpError::NotFound("file not found".to_string())
        } else {
            OpError::Internal(err.to_string())
        }
    }
}

pub type OpResult<T> = Result<T, OpError>;
