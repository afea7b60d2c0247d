//! HTTP forwarding primitive.
//!
//! A [`Forward`] implementation sends one buffered request to one service and
//! either hands back the response or reports a transport error. What happens
//! after an error is decided by the caller.

use crate::backend::{PoolError, authority_of};
use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::header::{CONTENT_TYPE, HOST, HeaderValue};
use hyper::{Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Response body handed back to clients.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Transport failure while forwarding.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("failed to connect to backend: {0}")]
    Connect(#[from] std::io::Error),

    #[error("connection to backend timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("backend handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("failed to send request to backend: {0}")]
    Send(#[source] hyper::Error),
}

/// Sends a request to one service.
pub trait Forward: Send + Sync {
    /// Forward `req`, returning the service's response or the transport error.
    fn forward(
        &self,
        req: Request<Full<Bytes>>,
    ) -> BoxFuture<'_, Result<Response<ProxyBody>, ForwardError>>;
}

/// HTTP/1.1 forwarder for a single service.
///
/// Opens a fresh connection per request, rewrites the request target onto
/// the service's base path and tags the response with `x-served-by`.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    /// Service URL; its path is prefixed to every request path.
    target: Uri,
    /// `host:port` to connect to.
    authority: String,
    /// Service name for `x-served-by`.
    name: String,
    /// Connect timeout.
    connect_timeout: Duration,
}

impl HttpForwarder {
    /// Create a forwarder for the service at `target`.
    pub fn new(
        target: Uri,
        name: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, PoolError> {
        let authority = authority_of(&target)?;
        Ok(Self {
            target,
            authority,
            name: name.into(),
            connect_timeout,
        })
    }

    async fn send(
        &self,
        mut req: Request<Full<Bytes>>,
    ) -> Result<Response<ProxyBody>, ForwardError> {
        let connect = TcpStream::connect(self.authority.as_str());
        let stream = match timeout(self.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ForwardError::Connect(e)),
            Err(_) => return Err(ForwardError::ConnectTimeout(self.connect_timeout)),
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "failed to set TCP_NODELAY on backend connection");
        }

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(ForwardError::Handshake)?;

        // Spawn connection driver
        let authority = self.authority.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                warn!(backend = %authority, error = %e, "backend connection error");
            }
        });

        *req.uri_mut() = self.upstream_uri(req.uri());
        if !req.headers().contains_key(HOST) {
            if let Ok(host) = HeaderValue::from_str(&self.authority) {
                req.headers_mut().insert(HOST, host);
            }
        }

        let response = sender.send_request(req).await.map_err(ForwardError::Send)?;

        let (mut parts, body) = response.into_parts();
        if let Ok(value) = HeaderValue::from_str(&self.name) {
            parts.headers.insert("x-served-by", value);
        }

        Ok(Response::from_parts(parts, body.boxed()))
    }

    /// Origin-form target for the service: base path joined with the request path.
    fn upstream_uri(&self, original: &Uri) -> Uri {
        let mut target = join_path(self.target.path(), original.path());
        if let Some(query) = original.query() {
            target.push('?');
            target.push_str(query);
        }
        target.parse().unwrap_or_else(|_| Uri::from_static("/"))
    }
}

impl Forward for HttpForwarder {
    fn forward(
        &self,
        req: Request<Full<Bytes>>,
    ) -> BoxFuture<'_, Result<Response<ProxyBody>, ForwardError>> {
        Box::pin(self.send(req))
    }
}

/// Join two URL paths with exactly one slash between them.
fn join_path(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

/// Create a plain text error response.
pub fn error_response(status: StatusCode, message: &str) -> Response<ProxyBody> {
    let body = Full::new(Bytes::from(format!("{}\n", message)))
        .map_err(|never| match never {})
        .boxed();

    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn forwarder(url: &str) -> HttpForwarder {
        HttpForwarder::new(url.parse().unwrap(), "svc", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "/users"), "/users");
        assert_eq!(join_path("/api", "/users"), "/api/users");
        assert_eq!(join_path("/api/", "/users"), "/api/users");
        assert_eq!(join_path("/api", "users"), "/api/users");
    }

    #[test]
    fn test_upstream_uri_keeps_query() {
        let fwd = forwarder("http://127.0.0.1:9000/v1");
        let uri: Uri = "http://lb.local/items?page=2".parse().unwrap();
        assert_eq!(fwd.upstream_uri(&uri), "/v1/items?page=2");

        let fwd = forwarder("http://127.0.0.1:9000");
        let uri: Uri = "/health".parse().unwrap();
        assert_eq!(fwd.upstream_uri(&uri), "/health");
    }

    #[test]
    fn test_error_response() {
        let resp = error_response(StatusCode::SERVICE_UNAVAILABLE, "Service not available");
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/plain");
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fwd = forwarder(&format!("http://{}", addr));
        let result = fwd.forward(Request::new(Full::new(Bytes::new()))).await;
        assert!(matches!(result, Err(ForwardError::Connect(_))));
    }

    #[tokio::test]
    async fn test_forward_success_tags_response() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let n = stream.read(&mut buf).unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let body = "hello";
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            request
        });

        let fwd = forwarder(&format!("http://{}/base", addr));
        let mut req = Request::new(Full::new(Bytes::new()));
        *req.uri_mut() = "/path?x=1".parse().unwrap();

        let resp = fwd.forward(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-served-by"], "svc");

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello");

        let request = server.join().unwrap();
        assert!(request.starts_with("GET /base/path?x=1 HTTP/1.1"));
        assert!(request.to_lowercase().contains(&format!("host: {}", addr)));
    }
}
