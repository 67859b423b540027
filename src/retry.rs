//! Retry decorator: replays a request with backoff until the policy is
//! satisfied, the backoff sequence stops, or the caller cancels.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::BodyExt;
use reqwest::{Body, Method, Request, Response, StatusCode};
use tokio::time::sleep;

use crate::backoff::{BackoffGenerator, ExponentialBackoffGenerator, MaxRetriesGenerator};
use crate::policy::{DefaultRetryPolicy, RetryPolicy};
use crate::transport::{Transport, Wrapper};
use crate::{CancellationToken, Error, Logger, Result};

/// Construction-time settings of a [`RetryWrapper`].
#[derive(Clone)]
pub struct RetryConfig {
    /// Event sink. Default: [`Logger::discard`].
    pub logger: Logger,
    /// Produces one backoff sequence per request. Default: exponential with
    /// library defaults.
    pub backoff: Arc<dyn BackoffGenerator>,
    /// Classifies outcomes. Default: [`DefaultRetryPolicy`].
    pub policy: Arc<dyn RetryPolicy>,
    /// Additional attempts allowed after the first; `0` leaves the limit to
    /// the backoff sequence. Default: `0`.
    pub max_retries: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            logger: Logger::discard(),
            backoff: Arc::new(ExponentialBackoffGenerator::default()),
            policy: Arc::new(DefaultRetryPolicy),
            max_retries: 0,
        }
    }
}

impl RetryConfig {
    /// Applies `options` left to right over the defaults.
    pub fn from_options<I>(options: I) -> Self
    where
        I: IntoIterator<Item = RetryOption>,
    {
        let mut config = Self::default();
        for option in options {
            option.apply(&mut config);
        }
        config
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("logger", &self.logger)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// One adjustment to a [`RetryConfig`].
#[derive(Clone)]
pub enum RetryOption {
    Logger(Logger),
    Backoff(Arc<dyn BackoffGenerator>),
    Policy(Arc<dyn RetryPolicy>),
    MaxRetries(u64),
}

impl RetryOption {
    pub fn backoff(generator: impl BackoffGenerator + 'static) -> Self {
        Self::Backoff(Arc::new(generator))
    }

    pub fn policy(policy: impl RetryPolicy + 'static) -> Self {
        Self::Policy(Arc::new(policy))
    }

    /// Writes this option into `config`.
    pub fn apply(self, config: &mut RetryConfig) {
        match self {
            Self::Logger(logger) => config.logger = logger,
            Self::Backoff(generator) => config.backoff = generator,
            Self::Policy(policy) => config.policy = policy,
            Self::MaxRetries(max) => config.max_retries = max,
        }
    }
}

impl fmt::Debug for RetryOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logger(logger) => f.debug_tuple("Logger").field(logger).finish(),
            Self::Backoff(_) => f.write_str("Backoff(..)"),
            Self::Policy(_) => f.write_str("Policy(..)"),
            Self::MaxRetries(max) => f.debug_tuple("MaxRetries").field(max).finish(),
        }
    }
}

/// What to do after one attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hand the response to the caller.
    Succeed,
    /// Wait for the next backoff delay and try again.
    Retry,
    /// Give up and surface the failure.
    Permanent,
}

impl RetryDecision {
    pub fn for_status(policy: &dyn RetryPolicy, method: &Method, status: StatusCode) -> Self {
        if policy.is_status_retryable_for_method(method, status) {
            Self::Retry
        } else {
            Self::Succeed
        }
    }

    pub fn for_error(policy: &dyn RetryPolicy, err: &Error) -> Self {
        if err.is_cancelled() || !policy.is_error_retryable(Some(err)) {
            Self::Permanent
        } else {
            Self::Retry
        }
    }
}

/// Configured retry decorator. Wrap a transport with it to get a
/// [`RetryTransport`].
#[derive(Clone, Debug)]
pub struct RetryWrapper {
    config: Arc<RetryConfig>,
}

impl RetryWrapper {
    pub fn new<I>(options: I) -> Self
    where
        I: IntoIterator<Item = RetryOption>,
    {
        Self::from_config(RetryConfig::from_options(options))
    }

    pub fn from_config(mut config: RetryConfig) -> Self {
        if config.max_retries > 0 {
            config.backoff = Arc::new(MaxRetriesGenerator::new(
                config.backoff.clone(),
                config.max_retries,
            ));
        }
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Decorates `inner` without erasing its type.
    pub fn wrap_transport<T: Transport>(&self, inner: T) -> RetryTransport<T> {
        RetryTransport {
            config: self.config.clone(),
            inner,
        }
    }
}

impl Default for RetryWrapper {
    fn default() -> Self {
        Self::new([])
    }
}

impl Wrapper for RetryWrapper {
    fn wrap(&self, inner: Arc<dyn Transport>) -> Arc<dyn Transport> {
        Arc::new(self.wrap_transport(inner))
    }
}

/// A transport that retries its inner transport.
///
/// Holds no per-request state; one instance may serve any number of
/// concurrent requests.
pub struct RetryTransport<T = Arc<dyn Transport>> {
    config: Arc<RetryConfig>,
    inner: T,
}

impl<T> RetryTransport<T> {
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T> fmt::Debug for RetryTransport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: Transport> Transport for RetryTransport<T> {
    async fn round_trip(&self, mut request: Request, cancel: &CancellationToken) -> Result<Response> {
        let log = RequestLog::new(&self.config.logger, &request);
        let policy = self.config.policy.as_ref();
        let method = request.method().clone();

        let body = copy_request_body(&mut request).await?;
        let mut backoff = self.config.backoff.generate();
        let mut retries = 0u64;
        let mut last: Option<Result<Response>> = None;

        loop {
            if let Some(Ok(previous)) = last.take() {
                drain_response_body(&log, previous, cancel).await;
            }
            if retries > 0 {
                log.retrying(retries);
            }

            let attempt = rebuild_request(&request, body.as_ref());
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                result = self.inner.round_trip(attempt, cancel) => result,
            };

            let decision = match &outcome {
                Ok(response) => {
                    log.received(response.status());
                    RetryDecision::for_status(policy, &method, response.status())
                }
                Err(err) => RetryDecision::for_error(policy, err),
            };
            if decision != RetryDecision::Retry {
                return outcome;
            }

            last = Some(outcome);
            retries += 1;

            let Some(delay) = backoff.next_backoff() else {
                break;
            };
            if cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        // Out of retries or cancelled while waiting: the latest outcome is
        // still more useful to the caller than a generic error.
        last.unwrap_or(Err(Error::Cancelled))
    }
}

/// Buffers the body so every attempt can send it again. Empty bodies are
/// treated as absent.
async fn copy_request_body(request: &mut Request) -> Result<Option<Bytes>> {
    let Some(body) = request.body_mut().take() else {
        return Ok(None);
    };
    let buffered = body.as_bytes().map(Bytes::copy_from_slice);
    let bytes = match buffered {
        Some(bytes) => bytes,
        None => body.collect().await.map_err(Error::BodyCopy)?.to_bytes(),
    };
    Ok((!bytes.is_empty()).then_some(bytes))
}

fn rebuild_request(template: &Request, body: Option<&Bytes>) -> Request {
    // The template's body was taken up front, so cloning always succeeds.
    let mut request = template
        .try_clone()
        .unwrap_or_else(|| Request::new(template.method().clone(), template.url().clone()));
    *request.body_mut() = body.cloned().map(Body::from);
    request
}

/// Reads a superseded response to the end so the connection can be reused.
async fn drain_response_body(log: &RequestLog<'_>, mut response: Response, cancel: &CancellationToken) {
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            chunk = response.chunk() => chunk,
        };
        match chunk {
            Ok(Some(_)) => {}
            Ok(None) => return,
            Err(err) => {
                log.drain_failed(&err);
                return;
            }
        }
    }
}

struct RequestLog<'a> {
    logger: &'a Logger,
    method: Method,
    host: String,
    path: String,
}

impl<'a> RequestLog<'a> {
    fn new(logger: &'a Logger, request: &Request) -> Self {
        Self {
            logger,
            method: request.method().clone(),
            host: request.url().host_str().unwrap_or_default().to_owned(),
            path: request.url().path().to_owned(),
        }
    }

    fn retrying(&self, retries: u64) {
        self.logger.in_scope(|| {
            tracing::info!(
                method = %self.method,
                host = %self.host,
                path = %self.path,
                retries,
                "retrying request"
            )
        });
    }

    fn received(&self, status: StatusCode) {
        self.logger.in_scope(|| {
            tracing::info!(
                method = %self.method,
                host = %self.host,
                path = %self.path,
                response_status = status.as_u16(),
                "received response"
            )
        });
    }

    fn drain_failed(&self, err: &reqwest::Error) {
        self.logger.in_scope(|| {
            tracing::debug!(
                method = %self.method,
                host = %self.host,
                path = %self.path,
                error = %err,
                "unable to discard response body"
            )
        });
    }
}
