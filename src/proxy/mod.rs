//! Request forwarding and the retry/failover state machine.

mod dispatch;
mod http_proxy;
mod request;

pub use dispatch::{MAX_ATTEMPTS, MAX_RETRIES, RETRY_BACKOFF, RequestState, dispatch};
pub use http_proxy::{Forward, ForwardError, HttpForwarder, ProxyBody, error_response};
pub use request::ProxyRequest;

#[cfg(test)]
pub(crate) mod testing;
