use std::fmt;
use std::sync::Arc;

use reqwest::{Body, Method, Request, Response, Url};

use crate::transport::{compose, Transport, Wrapper};
use crate::{CancellationToken, Error, Result};

/// HTTP client that sends every request through a stack of wrappers.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    wrappers: usize,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("wrappers", &self.wrappers)
            .finish_non_exhaustive()
    }
}

/// Builds a [`Client`].
///
/// Wrappers are applied in the order they are added: the first one added
/// sees each request first.
#[derive(Default)]
pub struct ClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    wrappers: Vec<Arc<dyn Wrapper>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the base transport (default: `reqwest::Client::new()`).
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Adds a wrapper inside the ones already added.
    pub fn wrapper(mut self, wrapper: impl Wrapper + 'static) -> Self {
        self.wrappers.push(Arc::new(wrapper));
        self
    }

    pub fn build(self) -> Client {
        let base = self
            .transport
            .unwrap_or_else(|| Arc::new(reqwest::Client::new()));
        Client {
            transport: compose(base, &self.wrappers),
            wrappers: self.wrappers.len(),
        }
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("custom_transport", &self.transport.is_some())
            .field("wrappers", &self.wrappers.len())
            .finish()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Creates a client over a plain `reqwest::Client` with no wrappers.
    pub fn new() -> Self {
        ClientBuilder::new().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The composed transport; usable wherever a [`Transport`] is expected.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Performs a GET request against `url`.
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.send(Method::GET, url, None, &CancellationToken::new()).await
    }

    /// Performs a HEAD request against `url`.
    pub async fn head(&self, url: &str) -> Result<Response> {
        self.send(Method::HEAD, url, None, &CancellationToken::new()).await
    }

    /// Performs a POST request against `url` with `body`.
    pub async fn post(&self, url: &str, body: Option<Body>) -> Result<Response> {
        self.send(Method::POST, url, body, &CancellationToken::new()).await
    }

    /// Performs a PUT request against `url` with `body`.
    pub async fn put(&self, url: &str, body: Option<Body>) -> Result<Response> {
        self.send(Method::PUT, url, body, &CancellationToken::new()).await
    }

    /// Performs a PATCH request against `url` with `body`.
    pub async fn patch(&self, url: &str, body: Option<Body>) -> Result<Response> {
        self.send(Method::PATCH, url, body, &CancellationToken::new()).await
    }

    /// Performs a DELETE request against `url`.
    pub async fn delete(&self, url: &str) -> Result<Response> {
        self.send(Method::DELETE, url, None, &CancellationToken::new()).await
    }

    /// Performs a CONNECT request against `url` with `body`.
    pub async fn connect(&self, url: &str, body: Option<Body>) -> Result<Response> {
        self.send(Method::CONNECT, url, body, &CancellationToken::new()).await
    }

    /// Performs an OPTIONS request against `url`.
    pub async fn options(&self, url: &str) -> Result<Response> {
        self.send(Method::OPTIONS, url, None, &CancellationToken::new()).await
    }

    /// Performs a TRACE request against `url`.
    pub async fn trace(&self, url: &str) -> Result<Response> {
        self.send(Method::TRACE, url, None, &CancellationToken::new()).await
    }

    /// Sends `method url` with an optional body, giving up once `cancel`
    /// fires.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Body>,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let url = Url::parse(url).map_err(|err| Error::InvalidUrl {
            url: url.to_owned(),
            reason: err.to_string(),
        })?;
        let mut request = Request::new(method, url);
        *request.body_mut() = body;
        self.execute(request, cancel).await
    }

    /// Sends a prepared request through the wrapper stack.
    pub async fn execute(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        self.transport.round_trip(request, cancel).await
    }
}
