//! `roundtrip-retry` decorates an HTTP transport with retries and backoff.
//!
//! A [`Transport`] performs one request/response exchange. Wrappers such as
//! [`RetryWrapper`] and [`OAuthWrapper`] turn one transport into another:
//! - [`RetryTransport`] replays a request while the [`RetryPolicy`] says the
//!   outcome is transient and the backoff sequence allows another attempt
//! - [`OAuthTransport`] puts a token into the `Authorization` header
//!
//! [`Client`] composes a stack of wrappers over a `reqwest::Client`.

mod auth;
mod cancel;
mod client;
mod error;
mod logging;
mod options;
mod policy;
mod retry;
mod transport;

pub mod backoff;

#[cfg(test)]
mod testutil;

pub use auth::{OAuthConfig, OAuthOption, OAuthTransport, OAuthWrapper, StaticTokenSource, Token, TokenSource};
pub use backoff::{
    Backoff, BackoffGenerator, ConstantBackoffGenerator, ExponentialBackoffGenerator, ExponentialConfig,
    ExponentialOption, NoBackoffGenerator,
};
pub use cancel::CancellationToken;
pub use client::{Client, ClientBuilder};
pub use error::Error;
pub use logging::Logger;
pub use options::{BackoffSettings, ConstantSettings, ExponentialSettings, RetrySettings};
pub use policy::{DefaultRetryPolicy, RetryPolicy};
pub use retry::{RetryConfig, RetryDecision, RetryOption, RetryTransport, RetryWrapper};
pub use transport::{compose, Transport, Wrapper};

pub type Result<T> = std::result::Result<T, Error>;
