//! Buffered inbound request.

use crate::util::{REQUEST_ID_HEADER, RequestId};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::HeaderValue;
use hyper::{HeaderMap, Method, Request, Uri, Version};
use std::net::SocketAddr;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// An inbound request with its body read into memory.
///
/// Retries resend the same request several times, so the body is buffered
/// once and a fresh [`Request`] is built for every forward.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    client_addr: SocketAddr,
    request_id: RequestId,
}

impl ProxyRequest {
    /// Create a request from its parts.
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        client_addr: SocketAddr,
    ) -> Self {
        let request_id = RequestId::from_headers(&headers);
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers,
            body,
            client_addr,
            request_id,
        }
    }

    /// Read the whole body of `req`.
    pub async fn from_request<B>(req: Request<B>, client_addr: SocketAddr) -> Result<Self, B::Error>
    where
        B: Body,
    {
        let (parts, body) = req.into_parts();
        let body = body.collect().await?.to_bytes();

        let mut request = Self::new(parts.method, parts.uri, parts.headers, body, client_addr);
        request.version = parts.version;
        Ok(request)
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request target as received.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Address of the client.
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// ID used in logs and sent upstream as `x-request-id`.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Build the request to send upstream.
    ///
    /// Adds the client IP to `X-Forwarded-For` and sets `x-request-id`.
    pub fn to_request(&self) -> Request<Full<Bytes>> {
        let mut req = Request::new(Full::new(self.body.clone()));
        *req.method_mut() = self.method.clone();
        *req.uri_mut() = self.uri.clone();
        *req.version_mut() = match self.version {
            Version::HTTP_10 => Version::HTTP_10,
            _ => Version::HTTP_11,
        };

        let headers = req.headers_mut();
        *headers = self.headers.clone();

        let client_ip = self.client_addr.ip().to_string();
        let forwarded_for = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) if !prior.trim().is_empty() => format!("{}, {}", prior, client_ip),
            _ => client_ip,
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert(X_FORWARDED_FOR, value);
        }

        if let Some(value) = self.request_id.to_header_value() {
            headers.insert(REQUEST_ID_HEADER, value);
        }

        req
    }
}
