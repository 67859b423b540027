//! Decides which failures and status codes are worth another attempt.

use std::error::Error as StdError;
use std::io;

use reqwest::{Method, StatusCode};

use crate::Error;

/// Classifies attempt outcomes for a [`RetryTransport`](crate::RetryTransport).
///
/// Implementations must be stateless or otherwise safe to share between any
/// number of concurrent requests.
pub trait RetryPolicy: Send + Sync {
    /// Whether a failure that produced no response may be retried.
    ///
    /// `None` means no failure occurred and is always retryable.
    fn is_error_retryable(&self, err: Option<&Error>) -> bool;

    /// Whether a response with `status` to a `method` request may be retried.
    fn is_status_retryable_for_method(&self, method: &Method, status: StatusCode) -> bool;
}

/// Built-in policy: retries transient connection faults, throttling and
/// (for idempotent methods only) gateway/server errors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DefaultRetryPolicy;

impl DefaultRetryPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn is_error_retryable(&self, err: Option<&Error>) -> bool {
        match err {
            None => true,
            Some(Error::Cancelled) => false,
            Some(err) => is_transient(err),
        }
    }

    fn is_status_retryable_for_method(&self, method: &Method, status: StatusCode) -> bool {
        match status {
            StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE => true,
            StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::GATEWAY_TIMEOUT => is_method_idempotent(method),
            _ => false,
        }
    }
}

/// Fragments of messages produced by transient network faults. Matched
/// case-sensitively: the upper-case entries are protocol reason codes.
const RETRY_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection closed before message completed",
    "EOF",
    "end of file",
    "PROTOCOL_ERROR",
    "protocol error",
    "REFUSED_STREAM",
    "refused stream",
];

/// Walks the whole source chain; `reqwest` errors keep the interesting
/// part (hyper or io) a few levels down.
///
/// Messages of `reqwest` errors and of this crate's wrappers are not
/// matched: the former embed the request URL, the latter are fixed labels.
fn is_transient(err: &Error) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if is_transient_io_kind(io_err.kind()) {
                return true;
            }
        }
        let labelled = err.is::<Error>() || err.is::<reqwest::Error>();
        if !labelled && msg_in_retry_patterns(&err.to_string()) {
            return true;
        }
        current = err.source();
    }
    false
}

fn is_transient_io_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}

pub(crate) fn msg_in_retry_patterns(msg: &str) -> bool {
    RETRY_PATTERNS.iter().any(|pattern| msg.contains(pattern))
}

/// POST and PATCH are the only methods that are not safe to replay.
pub(crate) fn is_method_idempotent(method: &Method) -> bool {
    !matches!(*method, Method::POST | Method::PATCH)
}
