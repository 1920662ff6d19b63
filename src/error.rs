//! Request-surface error taxonomy.
//!
//! Callers need to tell four situations apart: the network broke, the backend
//! said no (401), the backend said something else non-2xx, or the backend
//! answered 2xx with a body that doesn't hold what the contract promises.

/// Error returned by the authenticated request surface.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network-level failure (DNS, connect, timeout, broken transfer).
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend rejected the credential. The token store has already been
    /// cleared by the time this surfaces.
    #[error("unauthorized")]
    Unauthorized,

    /// Any other non-success status.
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// Well-formed response missing a field the contract requires.
    #[error("protocol failure: {0}")]
    Protocol(String),
}

impl ApiError {
    /// True when the backend rejected the bearer token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}
