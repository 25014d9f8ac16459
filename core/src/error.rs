//! Error types for the OnTheMap client core.
//!
//! # Design
//! Callers branch on exact failures: a wrong password (`InvalidCredentials`)
//! is shown differently from an unreachable network (`Network`) or a
//! response that decoded but lacked required fields (`AuthProtocol` /
//! `StoreProtocol`). Every other non-2xx response lands in `Http` with the
//! raw status and body. "The user has no record yet" is `Ok(None)`, never
//! an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced an HTTP response.
    #[error("network failure: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The auth API rejected the credentials with 403.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// An auth API response was missing required fields.
    #[error("auth protocol error: {0}")]
    AuthProtocol(String),

    /// A location store response was missing required fields.
    #[error("store protocol error: {0}")]
    StoreProtocol(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Input rejected before any network call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no active session")]
    NotAuthenticated,
}

impl ApiError {
    /// HTTP status carried by the failure, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::InvalidCredentials => Some(403),
            _ => None,
        }
    }
}
