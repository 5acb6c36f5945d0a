//! Error types for the RADOS client handle
//!
//! Every negative status code returned by the native boundary is translated
//! into one of these typed errors at the call site; lifecycle violations are
//! rejected before the boundary is touched, so a guard failure never leaves a
//! partial native side effect behind.

use thiserror::Error;

/// Unified error type for cluster handle operations
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("Cluster handle initialization failed: {0}")]
    Initialization(String),

    #[error("Invalid handle state: {0}")]
    InvalidState(&'static str),

    // =========================================================================
    // Native Boundary Errors
    // =========================================================================
    #[error("Configuration operation failed for {subject}: status {code}")]
    Configuration { subject: String, code: i32 },

    #[error("The connection to the cluster failed: status {code}")]
    Connection { code: i32 },

    #[error("Cluster {query} query failed: status {code}")]
    Query { query: &'static str, code: i32 },

    #[error("Failed to create pool {pool:?}: status {code}")]
    PoolCreation { pool: String, code: i32 },
}

impl Error {
    /// Native status code carried by this error, if it originated at the
    /// native boundary rather than from a lifecycle guard
    pub fn native_code(&self) -> Option<i32> {
        match self {
            Error::Configuration { code, .. }
            | Error::Connection { code }
            | Error::Query { code, .. }
            | Error::PoolCreation { code, .. } => Some(*code),
            Error::Initialization(_) | Error::InvalidState(_) => None,
        }
    }

    /// Check whether this error is a lifecycle guard violation
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Error::InvalidState(_))
    }
}

/// Result type alias for the client
pub type Result<T> = std::result::Result<T, Error>;
