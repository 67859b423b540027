//! Scripted transport and request/response helpers for unit tests.

use std::collections::VecDeque;
use std::future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::Poll;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Body, Method, Request, Response, Url, Version};

use crate::{CancellationToken, Error, Result, Transport};

pub(crate) const TEST_URL: &str = "http://retry.test/resource";

pub(crate) fn request(method: Method, body: Option<&'static str>) -> Request {
    let mut request = Request::new(method, Url::parse(TEST_URL).expect("valid test url"));
    if let Some(body) = body {
        *request.body_mut() = Some(Body::from(body));
    }
    request
}

/// Builds a response whose body bumps `drained` once it has been read to
/// the end.
pub(crate) fn tracked_response(status: u16, body: &'static str, drained: Arc<AtomicUsize>) -> Response {
    let chunks = stream::iter([Ok::<_, io::Error>(Bytes::from_static(body.as_bytes()))]).chain(
        stream::poll_fn(move |_| {
            drained.fetch_add(1, Ordering::SeqCst);
            Poll::Ready(None)
        }),
    );
    let response = http::Response::builder()
        .status(status)
        .body(Body::wrap_stream(chunks))
        .expect("valid test response");
    Response::from(response)
}

/// Builds a response whose body fails after its first chunk.
pub(crate) fn broken_response(status: u16) -> Response {
    let chunks = stream::iter([
        Ok(Bytes::from_static(b"partial")),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "body cut short")),
    ]);
    let response = http::Response::builder()
        .status(status)
        .body(Body::wrap_stream(chunks))
        .expect("valid test response");
    Response::from(response)
}

#[derive(Clone, Debug)]
pub(crate) enum Step {
    Respond(u16, &'static str),
    /// Responds with a body that errors partway through.
    RespondBroken(u16),
    Fail(io::ErrorKind, &'static str),
    /// Never completes.
    Hang,
}

#[derive(Clone, Debug)]
pub(crate) struct SeenRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub version: Version,
    pub timeout: Option<Duration>,
    pub body: Option<Vec<u8>>,
}

/// Plays back steps in order and repeats the last one forever.
pub(crate) struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    seen: Mutex<Vec<SeenRequest>>,
    drained: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            seen: Mutex::default(),
            drained: Arc::default(),
        }
    }

    pub fn always(step: Step) -> Self {
        Self::new([step])
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().expect("seen mutex").len()
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().expect("seen mutex").clone()
    }

    /// Number of responses handed out whose body was read to the end.
    pub fn drained(&self) -> usize {
        self.drained.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let mut steps = self.steps.lock().expect("steps mutex");
        if steps.len() > 1 {
            steps.pop_front().expect("non-empty script")
        } else {
            steps.front().cloned().unwrap_or(Step::Respond(200, ""))
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn round_trip(&self, request: Request, _cancel: &CancellationToken) -> Result<Response> {
        self.seen.lock().expect("seen mutex").push(SeenRequest {
            method: request.method().clone(),
            headers: request.headers().clone(),
            version: request.version(),
            timeout: request.timeout().copied(),
            body: request.body().and_then(Body::as_bytes).map(<[u8]>::to_vec),
        });

        match self.next_step() {
            Step::Respond(status, body) => Ok(tracked_response(status, body, self.drained.clone())),
            Step::RespondBroken(status) => Ok(broken_response(status)),
            Step::Fail(kind, message) => Err(Error::Io(io::Error::new(kind, message))),
            Step::Hang => future::pending().await,
        }
    }
}
