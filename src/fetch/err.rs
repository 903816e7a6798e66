//! Errors produced while talking to directory endpoints.
//!
//! Structured directly on `tor_dirclient::err::{Error, RequestError}`: a
//! top-level `Error` for failures that abort a whole logical request (every
//! endpoint exhausted), and a `RequestError` for what went wrong with a
//! single endpoint attempt, which the retry loop inspects to decide whether
//! to advance to the next endpoint.

use std::time::Duration;

/// What went wrong with a single attempt against one endpoint.
///
/// Every variant here is recoverable by endpoint failover (§7's
/// `Transient-network`); none of them is fatal on its own.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum RequestError {
    /// The request did not complete before its timeout.
    #[error("directory request timed out after {0:?}")]
    Timeout(Duration),
    /// A TCP-level or TLS-level error occurred.
    #[error("network error: {0}")]
    Network(#[source] hyper::Error),
    /// The endpoint responded with a non-2xx HTTP status.
    #[error("directory server returned HTTP {0}")]
    HttpStatus(http::StatusCode),
    /// The response body could not be read in full.
    #[error("error reading response body: {0}")]
    Body(#[source] hyper::Error),
}

impl RequestError {
    /// Whether this kind of failure should be treated as "this endpoint
    /// produced nothing" for the purposes of endpoint failover (§4.4).
    pub fn is_retryable(&self) -> bool {
        // Every variant we currently construct is retryable; this mirrors
        // tor_dirclient's HasKind impl being total over RequestError, kept
        // as an explicit method so a future non-retryable variant (e.g. a
        // malformed request we built ourselves) has somewhere natural to
        // land.
        true
    }
}

/// A failure that aborts an entire logical Fetcher call (every configured
/// endpoint was tried and none produced a usable response).
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Every endpoint in the pool was tried (or the attempt budget was
    /// reached) without success.
    #[error("exhausted {attempts} attempt(s) across the endpoint pool without success")]
    RequestFailed {
        /// How many attempts were made.
        attempts: usize,
        /// The most recent per-attempt error, if any attempt was made at
        /// all.
        #[source]
        last: Option<RequestError>,
    },
    /// The endpoint pool was empty (§9: switching modes clears per-endpoint
    /// history, but never the pool itself; this only fires on
    /// misconfiguration).
    #[error("no endpoints configured for this request")]
    NoEndpoints,
}

/// Result alias for this module.
pub type Result<T> = std::result::Result<T, Error>;
