//! Outcome translation: the single place failure semantics are decided.
//!
//! Every pipeline outcome, success or any [`FailureKind`], is normalized here
//! into the one response the caller sees. No other component emits a terminal
//! response directly. Failure causes are logged, never leaked into bodies.

use http::{Response, StatusCode, header};
use tracing::{error, warn};

use crate::protocol::FailureKind;
use crate::protocol::body::ResponseBody;

/// Normalizes a pipeline outcome into the response delivered to the caller.
///
/// | Outcome | Status |
/// |---|---|
/// | Success | handler-provided status |
/// | `AggregationFailed` | 400 |
/// | `Throttled` | 429 |
/// | `TimedOut` | 408 |
/// | `HandlerFailed` | 500, unless the handler signalled a status |
pub fn translate(outcome: Result<Response<ResponseBody>, FailureKind>) -> Response<ResponseBody> {
    match outcome {
        Ok(response) => response,
        Err(kind) => failure_response(kind),
    }
}

fn failure_response(kind: FailureKind) -> Response<ResponseBody> {
    match kind {
        FailureKind::AggregationFailed { reason } => {
            warn!(reason = %reason, "failed to aggregate request body");
            plain_text(StatusCode::BAD_REQUEST, "failed to read request body")
        }
        FailureKind::Throttled => plain_text(StatusCode::TOO_MANY_REQUESTS, "too many requests"),
        FailureKind::TimedOut => plain_text(StatusCode::REQUEST_TIMEOUT, "request timed out"),
        FailureKind::HandlerFailed { source } => {
            error!(cause = %source, "downstream handler failed");
            let status = source.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            plain_text(status, "internal handler error")
        }
    }
}

fn plain_text(status: StatusCode, message: &'static str) -> Response<ResponseBody> {
    let mut builder = Response::builder();
    let headers = builder.headers_mut().unwrap();
    headers.insert(header::CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.as_ref().parse().unwrap());

    builder.status(status).body(ResponseBody::from(message)).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HandlerError;
    use bytes::Bytes;

    #[test]
    fn success_passes_through_untouched() {
        let mut response = Response::new(ResponseBody::from("payload"));
        *response.status_mut() = StatusCode::CREATED;

        let translated = translate(Ok(response));
        assert_eq!(translated.status(), StatusCode::CREATED);
        assert_eq!(translated.into_body().into_bytes(), "payload");
    }

    #[test]
    fn failure_kinds_map_to_canonical_statuses() {
        let cases = [
            (FailureKind::aggregation_failed("broken stream"), StatusCode::BAD_REQUEST),
            (FailureKind::Throttled, StatusCode::TOO_MANY_REQUESTS),
            (FailureKind::TimedOut, StatusCode::REQUEST_TIMEOUT),
            (FailureKind::HandlerFailed { source: HandlerError::new("boom") }, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (kind, expected) in cases {
            let response = translate(Err(kind));
            assert_eq!(response.status(), expected);
            assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "text/plain; charset=utf-8");
        }
    }

    #[test]
    fn handler_signalled_status_overrides_500() {
        let kind = FailureKind::HandlerFailed { source: HandlerError::with_status(StatusCode::BAD_GATEWAY, "upstream gone") };
        let response = translate(Err(kind));
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn failure_bodies_never_leak_the_cause() {
        let kind = FailureKind::HandlerFailed { source: HandlerError::new("secret connection string") };
        let body = translate(Err(kind)).into_body().into_bytes();
        assert_eq!(body, Bytes::from("internal handler error"));
    }
}
