//! Per-request tracing spans keyed by a request ID.
//!
//! An inbound `X-Request-Id` is reused when it is short and made of safe
//! characters, so a reverse proxy or the dashboard frontend can correlate
//! logs. Otherwise a ULID is generated. The resolved ID is echoed on the
//! response.

use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::{Layer, Service};
use tracing::Instrument;

use crate::utils::fmt_duration;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest inbound ID accepted verbatim.
const MAX_INBOUND_LEN: usize = 128;

fn resolve(req: &Request) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(inbound_id)
        .unwrap_or_else(|| ulid::Ulid::new().to_string())
}

fn inbound_id(value: &str) -> Option<String> {
    let value = value.trim();
    let acceptable = !value.is_empty()
        && value.len() <= MAX_INBOUND_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    acceptable.then(|| value.to_owned())
}

fn log_completion(status: StatusCode, elapsed: Duration) {
    let duration = fmt_duration(elapsed);
    if status.is_server_error() {
        tracing::warn!(status = status.as_u16(), duration, "request completed");
    } else if status.is_client_error() {
        tracing::info!(status = status.as_u16(), duration, "request completed");
    } else {
        tracing::debug!(status = status.as_u16(), duration, "request completed");
    }
}

#[derive(Clone)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

#[derive(Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S, B> Service<Request> for RequestIdService<S>
where
    S: Service<Request, Response = Response<B>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Debug,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let request_id = resolve(&req);
        let span = tracing::info_span!(
            "request",
            id = %request_id,
            method = %req.method(),
            path = req.uri().path(),
        );
        let echoed = HeaderValue::from_str(&request_id).ok();

        let started = Instant::now();
        let future = self.inner.call(req);

        Box::pin(
            async move {
                let mut result = future.await;
                match result.as_mut() {
                    Ok(response) => {
                        log_completion(response.status(), started.elapsed());
                        if let Some(value) = echoed {
                            response.headers_mut().insert(REQUEST_ID_HEADER, value);
                        }
                    }
                    Err(e) => tracing::error!(error = ?e, "request failed"),
                }
                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::routing::get;
    use tower::ServiceExt;

    #[test]
    fn inbound_ids_are_sanitized() {
        assert_eq!(inbound_id(" abc-123 "), Some("abc-123".to_owned()));
        assert_eq!(inbound_id(""), None);
        assert_eq!(inbound_id("has space"), None);
        assert_eq!(inbound_id(&"x".repeat(MAX_INBOUND_LEN + 1)), None);
    }

    async fn echoed_id(header: Option<&str>) -> String {
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(RequestIdLayer);
        let mut request = axum::http::Request::builder().uri("/");
        if let Some(value) = header {
            request = request.header(REQUEST_ID_HEADER, value);
        }
        let response = router
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        response.headers()[REQUEST_ID_HEADER]
            .to_str()
            .unwrap()
            .to_owned()
    }

    #[tokio::test]
    async fn inbound_id_is_echoed() {
        assert_eq!(echoed_id(Some("trace-42")).await, "trace-42");
    }

    #[tokio::test]
    async fn unusable_inbound_id_is_replaced_with_a_ulid() {
        let id = echoed_id(Some("not ok")).await;
        assert!(ulid::Ulid::from_string(&id).is_ok(), "{id}");
        let id = echoed_id(None).await;
        assert!(ulid::Ulid::from_string(&id).is_ok(), "{id}");
    }
}
