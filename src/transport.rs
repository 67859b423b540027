//! The transport contract and the wrapper mechanism used to stack
//! decorators in front of a base transport.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Request, Response};

use crate::{CancellationToken, Error, Result};

/// Sends one request and yields one response or failure.
///
/// Implementations are shared between tasks and must tolerate concurrent
/// calls. A transport should give up with [`Error::Cancelled`] once `cancel`
/// fires.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(&self, request: Request, cancel: &CancellationToken) -> Result<Response>;
}

/// Adds behaviour around an inner transport.
///
/// `wrap` hands back the composed transport; the wrapper itself stays
/// reusable, so one configured wrapper can decorate several transports.
pub trait Wrapper: Send + Sync {
    fn wrap(&self, inner: Arc<dyn Transport>) -> Arc<dyn Transport>;
}

/// Stacks `wrappers` over `base`.
///
/// The first wrapper ends up outermost: it sees the request first and the
/// response last.
pub fn compose(base: Arc<dyn Transport>, wrappers: &[Arc<dyn Wrapper>]) -> Arc<dyn Transport> {
    wrappers
        .iter()
        .rev()
        .fold(base, |inner, wrapper| wrapper.wrap(inner))
}

/// The network-facing base transport.
#[async_trait]
impl Transport for reqwest::Client {
    async fn round_trip(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.execute(request) => result.map_err(Error::Transport),
        }
    }
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn round_trip(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        (**self).round_trip(request, cancel).await
    }
}

#[async_trait]
impl<T> Transport for Box<T>
where
    T: Transport + ?Sized,
{
    async fn round_trip(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        (**self).round_trip(request, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use reqwest::Method;

    use super::*;
    use crate::testutil::{request, ScriptedTransport, Step};

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recording {
        name: &'static str,
        journal: Journal,
    }

    struct RecordingTransport {
        name: &'static str,
        journal: Journal,
        inner: Arc<dyn Transport>,
    }

    impl Wrapper for Recording {
        fn wrap(&self, inner: Arc<dyn Transport>) -> Arc<dyn Transport> {
            Arc::new(RecordingTransport {
                name: self.name,
                journal: self.journal.clone(),
                inner,
            })
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn round_trip(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
            self.journal.lock().unwrap().push(format!("{} in", self.name));
            let response = self.inner.round_trip(request, cancel).await;
            self.journal.lock().unwrap().push(format!("{} out", self.name));
            response
        }
    }

    #[tokio::test]
    async fn first_wrapper_is_outermost() {
        let journal: Journal = Arc::default();
        let wrappers: Vec<Arc<dyn Wrapper>> = vec![
            Arc::new(Recording { name: "a", journal: journal.clone() }),
            Arc::new(Recording { name: "b", journal: journal.clone() }),
        ];
        let base = Arc::new(ScriptedTransport::always(Step::Respond(200, "ok")));

        let transport = compose(base.clone(), &wrappers);
        let response = transport
            .round_trip(request(Method::GET, None), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(base.calls(), 1);
        assert_eq!(*journal.lock().unwrap(), vec!["a in", "b in", "b out", "a out"]);
    }

    #[tokio::test]
    async fn compose_without_wrappers_is_the_base() {
        let base = Arc::new(ScriptedTransport::always(Step::Respond(204, "")));
        let transport = compose(base.clone(), &[]);

        let response = transport
            .round_trip(request(Method::DELETE, None), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.status(), 204);
        assert_eq!(base.calls(), 1);
    }

    #[tokio::test]
    async fn reqwest_client_honours_cancellation() {
        let client = reqwest::Client::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client
            .round_trip(request(Method::GET, None), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }
}
