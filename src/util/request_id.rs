//! Request IDs for correlating log lines of one proxied request.

use hyper::HeaderMap;
use hyper::header::HeaderValue;
use uuid::Uuid;

/// Header carrying the request ID, both inbound and towards the backend.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client supplied ID that is accepted as is.
const MAX_CLIENT_ID_LEN: usize = 128;

/// Identifier attached to every proxied request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// Create a new random request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Reuse the client's `x-request-id` when it is printable and short,
    /// otherwise generate one.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.len() <= MAX_CLIENT_ID_LEN)
            .map(|id| Self(id.to_string()))
            .unwrap_or_default()
    }

    /// Get the request ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Header value form of the ID.
    pub fn to_header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.0).ok()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
