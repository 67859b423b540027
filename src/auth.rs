//! OAuth2 bearer-token decorator.
//!
//! Only the insertion point is handled here: a [`TokenSource`] hands out
//! tokens and [`OAuthTransport`] puts them into the `Authorization` header.
//! Refreshing tokens is the source's business.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Request, Response};

use crate::transport::{Transport, Wrapper};
use crate::{CancellationToken, Error, Result};

/// An access token plus its type.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    access_token: String,
    token_type: Option<String>,
}

impl Token {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: None,
        }
    }

    /// Overrides the token type (defaults to `Bearer`).
    pub fn with_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Scheme used in the `Authorization` header, with the usual
    /// capitalisation fixed up.
    pub fn token_type(&self) -> &str {
        match self.token_type.as_deref().map(str::trim) {
            None | Some("") => "Bearer",
            Some(t) if t.eq_ignore_ascii_case("bearer") => "Bearer",
            Some(t) if t.eq_ignore_ascii_case("mac") => "MAC",
            Some(t) if t.eq_ignore_ascii_case("basic") => "Basic",
            Some(t) => t,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.access_token.trim().is_empty()
    }

    fn header_value(&self) -> Result<HeaderValue> {
        let mut value =
            HeaderValue::from_str(&format!("{} {}", self.token_type(), self.access_token))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type())
            .finish()
    }
}

/// Supplies tokens, one call per outgoing request.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<Token>;
}

/// Always returns the same token.
#[derive(Clone, Debug)]
pub struct StaticTokenSource {
    token: Token,
}

impl StaticTokenSource {
    pub fn new(token: Token) -> Self {
        Self { token }
    }

    /// Builds a bearer source; a leading `Bearer ` on `token` is accepted
    /// and dropped.
    pub fn bearer(token: impl AsRef<str>) -> Self {
        Self::new(Token::new(strip_bearer_prefix(token.as_ref())))
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<Token> {
        Ok(self.token.clone())
    }
}

/// Settings for [`OAuthWrapper`].
#[derive(Clone, Default)]
pub struct OAuthConfig {
    /// Token source. Default: none; requests fail with [`Error::Token`].
    pub source: Option<Arc<dyn TokenSource>>,
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("source", &self.source.as_ref().map(|_| "<token source>"))
            .finish()
    }
}

/// One adjustment to an [`OAuthConfig`].
#[derive(Clone)]
pub enum OAuthOption {
    /// Use a fixed bearer token.
    AccessToken(String),
    /// Ask `source` for a token on every request.
    Source(Arc<dyn TokenSource>),
}

impl OAuthOption {
    pub fn apply(self, config: &mut OAuthConfig) {
        match self {
            Self::AccessToken(token) => {
                config.source = Some(Arc::new(StaticTokenSource::bearer(token)));
            }
            Self::Source(source) => config.source = Some(source),
        }
    }
}

impl fmt::Debug for OAuthOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessToken(_) => f.write_str("AccessToken(<redacted>)"),
            Self::Source(_) => f.write_str("Source(..)"),
        }
    }
}

/// Configured auth decorator. Wrapping yields an [`OAuthTransport`].
#[derive(Clone, Debug, Default)]
pub struct OAuthWrapper {
    config: OAuthConfig,
}

impl OAuthWrapper {
    pub fn new<I>(options: I) -> Self
    where
        I: IntoIterator<Item = OAuthOption>,
    {
        let mut config = OAuthConfig::default();
        for option in options {
            option.apply(&mut config);
        }
        Self { config }
    }

    pub fn wrap_transport<T: Transport>(&self, inner: T) -> OAuthTransport<T> {
        OAuthTransport {
            source: self.config.source.clone(),
            inner,
        }
    }
}

impl Wrapper for OAuthWrapper {
    fn wrap(&self, inner: Arc<dyn Transport>) -> Arc<dyn Transport> {
        Arc::new(self.wrap_transport(inner))
    }
}

/// Sets `Authorization` from a token source, then delegates.
pub struct OAuthTransport<T = Arc<dyn Transport>> {
    source: Option<Arc<dyn TokenSource>>,
    inner: T,
}

impl<T> fmt::Debug for OAuthTransport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: Transport> Transport for OAuthTransport<T> {
    async fn round_trip(&self, mut request: Request, cancel: &CancellationToken) -> Result<Response> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| Error::Token("no token source configured".to_owned()))?;

        let token = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            token = source.token() => token?,
        };
        if !token.is_valid() {
            return Err(Error::Token("token source returned an empty access token".to_owned()));
        }

        request
            .headers_mut()
            .insert(AUTHORIZATION, token.header_value()?);
        self.inner.round_trip(request, cancel).await
    }
}

fn strip_bearer_prefix(token: &str) -> &str {
    let trimmed = token.trim();
    match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => trimmed[7..].trim_start(),
        _ => trimmed,
    }
}
