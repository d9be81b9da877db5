//! Error taxonomy for the driver.
//!
//! `DbError` is the single error type returned from every public entry
//! point. It distinguishes driver-internal failures (pooling, protocol
//! negotiation, codec resolution) from server-surfaced failures (the
//! database node rejected or failed to service a request) because the two
//! classes are handled very differently by the retry policy — see
//! `execution::retry`.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug, Clone)]
pub enum DbError {
    // -- driver-internal --------------------------------------------------
    #[error("IO error: {0}")]
    Io(String),

    #[error("codec not found for {0}")]
    CodecNotFound(String),

    #[error("invalid protocol version: {0}")]
    InvalidProtocolVersion(String),

    #[error("connection pool is busy: {0}")]
    BusyPool(String),

    #[error("connection is busy: {0}")]
    BusyConnection(String),

    #[error("connection error: {0}")]
    ConnectionException(String),

    #[error("authentication failed: {0}")]
    AuthenticationException(String),

    #[error("no host was available to execute the query: {0}")]
    NoHostAvailable(NoHostAvailableError),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request was cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Configuration(String),

    // -- server-surface -----------------------------------------------------
    #[error("unavailable: {0}")]
    UnavailableException(String),

    #[error("read timeout: {0}")]
    ReadTimeoutException(String),

    #[error("write timeout: {0}")]
    WriteTimeoutException(String),

    #[error("read failure: {0}")]
    ReadFailure(String),

    #[error("write failure: {0}")]
    WriteFailure(String),

    #[error("function execution error: {0}")]
    FunctionExecutionException(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("unprepared statement: {0}")]
    Unprepared(String),

    #[error("syntax error: {0}")]
    SyntaxError(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("truncate error: {0}")]
    TruncateError(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("overloaded: {0}")]
    OverloadedException(String),

    #[error("bootstrapping: {0}")]
    BootstrappingException(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),
}

/// One sub-error per host attempted, in attempt order (spec.md `NoHostAvailable`).
#[derive(Debug, Clone)]
pub struct NoHostAvailableError {
    pub errors: Vec<(SocketAddr, DbError)>,
}

impl NoHostAvailableError {
    pub fn new(errors: Vec<(SocketAddr, DbError)>) -> Self {
        Self { errors }
    }
}

impl fmt::Display for NoHostAvailableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "no hosts were tried");
        }
        write!(f, "{} host(s) tried: ", self.errors.len())?;
        for (i, (addr, err)) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{addr} -> {err}")?;
        }
        Ok(())
    }
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        DbError::Io(e.to_string())
    }
}

impl DbError {
    /// True if the retry policy should ever be consulted for this error
    /// (as opposed to being immediately fatal or immediately advancing the
    /// host plan — see spec.md §7 "Propagation policy").
    pub fn is_retryable_candidate(&self) -> bool {
        matches!(
            self,
            DbError::UnavailableException(_)
                | DbError::ReadTimeoutException(_)
                | DbError::WriteTimeoutException(_)
                | DbError::ReadFailure(_)
                | DbError::WriteFailure(_)
        )
    }

    /// True if this error should advance the host plan immediately without
    /// consulting the retry policy.
    pub fn advances_host_plan(&self) -> bool {
        matches!(
            self,
            DbError::OverloadedException(_)
                | DbError::BootstrappingException(_)
                | DbError::ConnectionException(_)
        )
    }

    /// True if this error is fatal to the request regardless of retry policy.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DbError::AuthenticationException(_)
                | DbError::SyntaxError(_)
                | DbError::InvalidQuery(_)
                | DbError::AlreadyExists(_)
                | DbError::Unauthorized(_)
        )
    }
}
