//! In-memory forwarders for exercising selection and failover without sockets.

use super::{Forward, ForwardError, ProxyBody};
use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Answers every request with 200 and a fixed body.
pub struct StaticForwarder {
    body: &'static str,
    calls: AtomicUsize,
}

impl StaticForwarder {
    pub fn ok(body: &'static str) -> Arc<Self> {
        Arc::new(Self {
            body,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Forward for StaticForwarder {
    fn forward(
        &self,
        _req: Request<Full<Bytes>>,
    ) -> BoxFuture<'_, Result<Response<ProxyBody>, ForwardError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = Full::new(Bytes::from_static(self.body.as_bytes()))
            .map_err(|never| match never {})
            .boxed();
        Box::pin(async move { Ok(Response::new(body)) })
    }
}

/// Fails the first `failures` requests with connection refused, then answers 200.
pub struct FlakyForwarder {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyForwarder {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
        })
    }

    /// Never succeeds.
    pub fn down() -> Arc<Self> {
        Self::new(usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Forward for FlakyForwarder {
    fn forward(
        &self,
        _req: Request<Full<Bytes>>,
    ) -> BoxFuture<'_, Result<Response<ProxyBody>, ForwardError>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let fail = call < self.failures;
        Box::pin(async move {
            if fail {
                Err(ForwardError::Connect(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )))
            } else {
                let body = Full::new(Bytes::from_static(b"recovered"))
                    .map_err(|never| match never {})
                    .boxed();
                Ok(Response::new(body))
            }
        })
    }
}
