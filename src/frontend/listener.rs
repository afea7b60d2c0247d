//! Frontend listener implementation.

use crate::backend::ServicePool;
use crate::proxy::{ProxyBody, ProxyRequest, RequestState, dispatch, error_response};
use http_body_util::{LengthLimitError, Limited};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

/// Listener that accepts HTTP clients and proxies their requests to the pool.
pub struct FrontendListener {
    /// TCP listener.
    listener: TcpListener,
    /// Services requests are distributed over.
    pool: Arc<ServicePool>,
    /// Largest accepted request body, in bytes.
    max_body_size: usize,
}

impl FrontendListener {
    /// Bind the listener to `addr`.
    pub async fn bind(
        addr: SocketAddr,
        pool: Arc<ServicePool>,
        max_body_size: usize,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        info!(
            listen = %listener.local_addr()?,
            strategy = %pool.strategy(),
            services = pool.backends().len(),
            max_body_size,
            "frontend listener bound"
        );

        Ok(Self {
            listener,
            pool,
            max_body_size,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the listener, accepting connections until shutdown.
    #[instrument(skip_all)]
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("frontend listener starting");

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => self.handle_connection(stream, addr),
                        Err(e) => error!(error = %e, "failed to accept connection"),
                    }
                }

                _ = shutdown.recv() => {
                    info!("frontend listener shutting down");
                    break;
                }
            }
        }
    }

    /// Serve one client connection on its own task.
    fn handle_connection(&self, stream: TcpStream, client_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set TCP_NODELAY on client connection");
        }

        let pool = Arc::clone(&self.pool);
        let max_body_size = self.max_body_size;

        tokio::spawn(async move {
            let start_time = Instant::now();

            let service = service_fn(move |req| {
                let pool = Arc::clone(&pool);
                async move {
                    let response = handle_request(&pool, req, client_addr, max_body_size).await;
                    Ok::<_, Infallible>(response)
                }
            });

            let result = http1::Builder::new()
                .keep_alive(true)
                .serve_connection(TokioIo::new(stream), service)
                .await;

            let duration = start_time.elapsed();
            match result {
                Ok(()) => debug!(
                    client = %client_addr,
                    duration_ms = duration.as_millis(),
                    "connection completed"
                ),
                Err(e) => warn!(
                    client = %client_addr,
                    duration_ms = duration.as_millis(),
                    error = %e,
                    "connection handling failed"
                ),
            }
        });
    }
}

/// Proxy a single client request through the pool.
///
/// The body is read in full first so that retries can resend it. A body
/// larger than `max_body_size` is answered with 413 and one that cannot be
/// read with 400, both without touching the pool.
pub async fn handle_request<B>(
    pool: &ServicePool,
    req: Request<B>,
    client_addr: SocketAddr,
    max_body_size: usize,
) -> Response<ProxyBody>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let start = Instant::now();

    let req = req.map(|body| Limited::new(body, max_body_size));
    let request = match ProxyRequest::from_request(req, client_addr).await {
        Ok(request) => request,
        Err(e) if e.is::<LengthLimitError>() => {
            warn!(client = %client_addr, limit = max_body_size, "request body too large");
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large");
        }
        Err(e) => {
            warn!(client = %client_addr, error = %e, "failed to read request body");
            return error_response(StatusCode::BAD_REQUEST, "Bad Request");
        }
    };

    let response = dispatch(pool, &request, RequestState::default()).await;

    info!(
        request_id = %request.request_id(),
        client = %client_addr,
        method = %request.method(),
        uri = %request.uri(),
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis(),
        "request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::config::Strategy;
    use crate::proxy::Forward;
    use crate::proxy::testing::{FlakyForwarder, StaticForwarder};
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};

    const LIMIT: usize = 1024;

    fn client() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn pool_of(forwarders: Vec<Arc<dyn Forward>>) -> Arc<ServicePool> {
        let backends = forwarders
            .into_iter()
            .enumerate()
            .map(|(i, fwd)| {
                let url = format!("http://127.0.0.1:{}", 9101 + i);
                Backend::new(url.parse().unwrap(), "", 1, fwd).unwrap()
            })
            .collect();
        Arc::new(ServicePool::new(backends, Strategy::RoundRobin).unwrap())
    }

    #[tokio::test]
    async fn test_frontend_listener_bind() {
        let pool = pool_of(vec![StaticForwarder::ok("ok") as Arc<dyn Forward>]);
        let listener = FrontendListener::bind("127.0.0.1:0".parse().unwrap(), pool, LIMIT)
            .await
            .unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_handle_request_proxies() {
        let fwd = StaticForwarder::ok("proxied");
        let pool = pool_of(vec![fwd.clone() as Arc<dyn Forward>]);

        let req = Request::new(Full::new(Bytes::from_static(b"body")));
        let response = handle_request(&pool, req, client(), LIMIT).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"proxied");
        assert_eq!(fwd.calls(), 1);
    }

    #[tokio::test]
    async fn test_handle_request_all_down() {
        let pool = pool_of(vec![
            FlakyForwarder::down() as Arc<dyn Forward>,
            FlakyForwarder::down() as Arc<dyn Forward>,
        ]);

        let req = Request::new(Full::new(Bytes::new()));
        let response = handle_request(&pool, req, client(), LIMIT).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(pool.backends().iter().all(|b| !b.is_alive()));
    }

    #[tokio::test]
    async fn test_handle_request_body_too_large() {
        let fwd = StaticForwarder::ok("unused");
        let pool = pool_of(vec![fwd.clone() as Arc<dyn Forward>]);

        let req = Request::new(Full::new(Bytes::from(vec![b'x'; LIMIT + 1])));
        let response = handle_request(&pool, req, client(), LIMIT).await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(fwd.calls(), 0);

        // Exactly at the limit is still accepted.
        let req = Request::new(Full::new(Bytes::from(vec![b'x'; LIMIT])));
        let response = handle_request(&pool, req, client(), LIMIT).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(fwd.calls(), 1);
    }

    #[tokio::test]
    async fn test_listener_stops_on_shutdown() {
        let pool = pool_of(vec![StaticForwarder::ok("ok") as Arc<dyn Forward>]);
        let listener = FrontendListener::bind("127.0.0.1:0".parse().unwrap(), pool, LIMIT)
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(listener.run(shutdown_rx));
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
