//! Typed domain errors.
//!
//! Errors are domain outcomes carrying a fixed machine-readable code,
//! not generic failures. The delivery layer maps each code to a
//! transport status; storage failures are surfaced separately so they
//! can be reported as internal errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::StorageError;

/// Machine-readable error codes, fixed by the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "TEAM_EXISTS")]
    TeamExists,
    #[serde(rename = "PR_EXISTS")]
    PrExists,
    #[serde(rename = "PR_MERGED")]
    PrMerged,
    #[serde(rename = "NOT_ASSIGNED")]
    NotAssigned,
    #[serde(rename = "NO_CANDIDATE")]
    NoCandidate,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TeamExists => "TEAM_EXISTS",
            ErrorCode::PrExists => "PR_EXISTS",
            ErrorCode::PrMerged => "PR_MERGED",
            ErrorCode::NotAssigned => "NOT_ASSIGNED",
            ErrorCode::NoCandidate => "NO_CANDIDATE",
            ErrorCode::NotFound => "NOT_FOUND",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain rule violation: an enumerated code plus a human-readable
/// message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct DomainError {
    pub code: ErrorCode,
    pub message: String,
}

impl DomainError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        DomainError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        DomainError::new(ErrorCode::NotFound, message)
    }
}

/// Any failure a service operation can produce: either a domain rule
/// violation or a storage failure that propagated unchanged.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ServiceError {
    /// The wire code for this error, if it is a domain outcome.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ServiceError::Domain(e) => Some(e.code),
            ServiceError::Storage(_) => None,
        }
    }
}
