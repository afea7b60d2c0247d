//! Dispatch entry point and retry/failover state machine.
//!
//! A transport error is first retried in place on the same backend. Once the
//! retries are used up the backend is marked dead and the request goes back
//! through selection, up to [`MAX_ATTEMPTS`] selections in total.
//!
//! The retry budget is per selection: every newly selected backend gets its
//! own [`MAX_RETRIES`] retries instead of inheriting what the previous one
//! spent.

use crate::backend::{Backend, ServicePool};
use crate::proxy::{ForwardError, ProxyBody, ProxyRequest, error_response};
use hyper::{Response, StatusCode};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Selections allowed per request.
pub const MAX_ATTEMPTS: u32 = 3;

/// In-place retries against one backend before it is given up on.
pub const MAX_RETRIES: u32 = 3;

/// Pause before each in-place retry.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Attempt and retry counters of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestState {
    /// Current selection, starting at 1.
    pub attempts: u32,
    /// In-place retries spent on the current backend.
    pub retries: u32,
}

impl Default for RequestState {
    fn default() -> Self {
        Self {
            attempts: 1,
            retries: 0,
        }
    }
}

impl RequestState {
    /// Move on to a new selection.
    fn next_attempt(&mut self) {
        self.attempts += 1;
        self.retries = 0;
    }
}

/// Serve `req` from the pool.
///
/// Always produces a response: the backend's, or 503 when no live backend is
/// left or the attempts are exhausted. Transport errors never escape.
#[instrument(skip_all, fields(
    request_id = %req.request_id(),
    method = %req.method(),
    uri = %req.uri(),
    client = %req.client_addr()
))]
pub async fn dispatch(
    pool: &ServicePool,
    req: &ProxyRequest,
    mut state: RequestState,
) -> Response<ProxyBody> {
    loop {
        if state.attempts > MAX_ATTEMPTS {
            warn!(attempts = state.attempts, "max attempts reached, terminating");
            return service_unavailable();
        }

        let Some(backend) = pool.next_backend() else {
            warn!(attempts = state.attempts, "no live backend available");
            return service_unavailable();
        };

        debug!(backend = %backend.name(), attempt = state.attempts, "selected backend");

        let result = forward_with_retries(&backend, req, &mut state).await;
        pool.complete(&backend);

        match result {
            Ok(response) => return response,
            Err(e) => {
                warn!(
                    backend = %backend.address(),
                    error = %e,
                    retries = state.retries,
                    "backend exhausted its retries, marking it down"
                );
                pool.mark_backend_status(backend.address(), false);
                state.next_attempt();
                info!(attempt = state.attempts, "attempting retry on another backend");
            }
        }
    }
}

/// Forward to one backend, retrying transport errors in place.
async fn forward_with_retries(
    backend: &Backend,
    req: &ProxyRequest,
    state: &mut RequestState,
) -> Result<Response<ProxyBody>, ForwardError> {
    loop {
        match backend.forward(req.to_request()).await {
            Ok(response) => return Ok(response),
            Err(e) if state.retries < MAX_RETRIES => {
                warn!(
                    backend = %backend.authority(),
                    error = %e,
                    retry = state.retries + 1,
                    "transport error, retrying"
                );
                tokio::time::sleep(RETRY_BACKOFF).await;
                state.retries += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn service_unavailable() -> Response<ProxyBody> {
    error_response(StatusCode::SERVICE_UNAVAILABLE, "Service not available")
}
