//! Pipeline assembly: folds the configured stages around the downstream
//! handler, in the reference order rate limiter → body aggregator → deadline
//! dispatch, with the error translator applied at the boundary.

use std::sync::Arc;
use std::time::Duration;

use http::{Request, Response};
use thiserror::Error;
use tracing::debug;

use crate::aggregate::AggregateStage;
use crate::dispatch::DispatchService;
use crate::handler::Handler;
use crate::protocol::body::{ReqBody, ResponseBody};
use crate::respond::translate;
use crate::service::Service;
use crate::stage::{Stage, StageExt};
use crate::throttle::{InvalidRateLimit, ThrottleStage, TokenBucket};

#[derive(Error, Debug)]
pub enum PipelineBuildError {
    #[error("downstream handler must be set")]
    MissingHandler,

    #[error("request deadline must be non-zero")]
    ZeroDeadline,

    #[error(transparent)]
    InvalidRateLimit(#[from] InvalidRateLimit),
}

/// A fully assembled request-processing pipeline.
///
/// One `Pipeline` serves many concurrent requests; all per-request state
/// lives inside a single [`serve`](Pipeline::serve) call. The only state
/// shared across requests is the injected [`TokenBucket`].
pub struct Pipeline {
    service: Box<dyn Service>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Runs one request through the chain.
    ///
    /// Always resolves to exactly one well-formed response, whatever the
    /// outcome: the caller is never left unanswered and never answered twice.
    pub async fn serve(&self, req: Request<ReqBody>) -> Response<ResponseBody> {
        translate(self.service.serve(req).await)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

pub struct PipelineBuilder {
    handler: Option<Box<dyn Handler>>,
    limiter: Option<Arc<TokenBucket>>,
    rate_limit: Option<(f64, u32)>,
    deadline: Option<Duration>,
    max_body_size: Option<usize>,
}

impl PipelineBuilder {
    fn new() -> Self {
        Self { handler: None, limiter: None, rate_limit: None, deadline: None, max_body_size: None }
    }

    /// The downstream business handler. Required.
    pub fn handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Injects a pre-built admission limiter, possibly shared with other
    /// pipelines.
    pub fn limiter(mut self, limiter: Arc<TokenBucket>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Admission control from raw configuration: `rate` tokens per second,
    /// `burst` capacity. Validated at build time. Ignored when a limiter is
    /// injected via [`limiter`](PipelineBuilder::limiter).
    pub fn rate_limit(mut self, rate: f64, burst: u32) -> Self {
        self.rate_limit = Some((rate, burst));
        self
    }

    /// Per-request timeout, measured from dispatch to handler resolution.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Maximum aggregated body size in bytes; larger bodies get a 400.
    pub fn max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = Some(max_body_size);
        self
    }

    pub fn build(self) -> Result<Pipeline, PipelineBuildError> {
        let handler = self.handler.ok_or(PipelineBuildError::MissingHandler)?;

        if self.deadline.is_some_and(|deadline| deadline.is_zero()) {
            return Err(PipelineBuildError::ZeroDeadline);
        }

        let limiter = match (self.limiter, self.rate_limit) {
            (Some(limiter), _) => Some(limiter),
            (None, Some((rate, burst))) => Some(Arc::new(TokenBucket::new(rate, burst)?)),
            (None, None) => None,
        };

        let aggregate = match self.max_body_size {
            Some(limit) => AggregateStage::with_limit(limit),
            None => AggregateStage::new(),
        };
        let dispatch = DispatchService::new(handler, self.deadline);

        debug!(
            throttled = limiter.is_some(),
            deadline = ?self.deadline,
            max_body_size = ?self.max_body_size,
            "assembling pipeline"
        );

        let service: Box<dyn Service> = match limiter {
            Some(limiter) => Box::new(
                StageExt::<DispatchService<Box<dyn Handler>>>::and_then(aggregate, ThrottleStage::new(limiter))
                    .apply(dispatch),
            ),
            None => Box::new(aggregate.apply(dispatch)),
        };

        Ok(Pipeline { service })
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("deadline", &self.deadline)
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{MockHandler, handler_fn};
    use crate::protocol::{BodyError, HandlerError};
    use bytes::Bytes;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn echo_handler() -> impl Handler {
        handler_fn(|req: Request<Bytes>| async move { Ok(Response::new(ResponseBody::once(req.into_body()))) })
    }

    #[test]
    fn build_requires_a_handler() {
        let result = Pipeline::builder().build();
        assert!(matches!(result, Err(PipelineBuildError::MissingHandler)));
    }

    #[test]
    fn build_rejects_invalid_configuration() {
        let zero_deadline = Pipeline::builder().handler(echo_handler()).deadline(Duration::ZERO).build();
        assert!(matches!(zero_deadline, Err(PipelineBuildError::ZeroDeadline)));

        let bad_rate = Pipeline::builder().handler(echo_handler()).rate_limit(0.0, 1).build();
        assert!(matches!(bad_rate, Err(PipelineBuildError::InvalidRateLimit(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn admitted_request_round_trips_through_the_handler() {
        let pipeline = Pipeline::builder().handler(echo_handler()).rate_limit(10.0, 5).build().unwrap();

        let (body, mut sender) = ReqBody::channel();
        let feed = tokio::spawn(async move {
            sender.send("a").await.unwrap();
            sender.send("b").await.unwrap();
            sender.send("c").await.unwrap();
            sender.finish().await.unwrap();
        });

        let response = pipeline.serve(Request::post("/echo").body(body).unwrap()).await;
        feed.await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.into_body().into_bytes(), "abc");
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_request_never_reaches_the_handler() {
        let mut mock = MockHandler::new();
        mock.expect_handle()
            .times(1)
            .returning(|_req| Ok(Response::new(ResponseBody::from("admitted"))));

        let limiter = Arc::new(TokenBucket::new(1.0, 1).unwrap());
        let pipeline = Pipeline::builder().handler(mock).limiter(limiter).build().unwrap();

        let first = pipeline.serve(Request::new(ReqBody::empty())).await;
        assert_eq!(first.status(), StatusCode::OK);

        // bucket is empty and the clock is paused: must be rejected before
        // any handler work, with the fixed rejection message
        let second = pipeline.serve(Request::new(ReqBody::empty())).await;
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.into_body().into_bytes(), "too many requests");
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_request_skips_body_aggregation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let handler = handler_fn(move |_req: Request<Bytes>| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(Response::new(ResponseBody::empty()))
            }
        });

        let limiter = Arc::new(TokenBucket::new(1.0, 1).unwrap());
        assert!(limiter.try_acquire());

        let pipeline = Pipeline::builder().handler(handler).limiter(limiter).build().unwrap();

        // the body is never consumed: a streaming body with no producer work
        // would hang aggregation forever if it ran
        let (body, _sender) = ReqBody::channel();
        let response = pipeline.serve(Request::post("/").body(body).unwrap()).await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn body_stream_error_yields_400_and_skips_the_handler() {
        let mut mock = MockHandler::new();
        mock.expect_handle().never();

        let pipeline = Pipeline::builder().handler(mock).build().unwrap();

        let (body, mut sender) = ReqBody::channel();
        let feed = tokio::spawn(async move {
            sender.send("partial").await.unwrap();
            sender.fail(BodyError::stream("connection lost")).await;
        });

        let response = pipeline.serve(Request::post("/").body(body).unwrap()).await;
        feed.await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.into_body().into_bytes(), "failed to read request body");
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_body_yields_400() {
        let pipeline = Pipeline::builder().handler(echo_handler()).max_body_size(4).build().unwrap();

        let (body, mut sender) = ReqBody::channel();
        let feed = tokio::spawn(async move {
            sender.send("too large").await.unwrap();
            let _ = sender.finish().await;
        });

        let response = pipeline.serve(Request::post("/").body(body).unwrap()).await;
        feed.await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_yields_408_within_the_deadline() {
        let handler = handler_fn(|_req: Request<Bytes>| async {
            sleep(Duration::from_millis(500)).await;
            Ok(Response::new(ResponseBody::from("late")))
        });
        let pipeline = Pipeline::builder().handler(handler).deadline(Duration::from_millis(100)).build().unwrap();

        let start = tokio::time::Instant::now();
        let response = pipeline.serve(Request::new(ReqBody::empty())).await;
        let elapsed = start.elapsed();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(response.into_body().into_bytes(), "request timed out");
        assert!(elapsed < Duration::from_millis(500), "408 should not wait for the handler, took {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn fast_handler_beats_the_deadline() {
        let handler = handler_fn(|_req: Request<Bytes>| async {
            sleep(Duration::from_millis(10)).await;
            Ok(Response::new(ResponseBody::from("quick")))
        });
        let pipeline = Pipeline::builder().handler(handler).deadline(Duration::from_millis(100)).build().unwrap();

        let response = pipeline.serve(Request::new(ReqBody::empty())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.into_body().into_bytes(), "quick");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn handler_error_yields_500_by_default() {
        let handler = handler_fn(|_req: Request<Bytes>| async { Err(HandlerError::new("boom")) });
        let pipeline = Pipeline::builder().handler(handler).build().unwrap();

        let response = pipeline.serve(Request::new(ReqBody::empty())).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn handler_signalled_status_is_respected() {
        let handler = handler_fn(|_req: Request<Bytes>| async {
            Err(HandlerError::with_status(StatusCode::SERVICE_UNAVAILABLE, "downstream dependency down"))
        });
        let pipeline = Pipeline::builder().handler(handler).build().unwrap();

        let response = pipeline.serve(Request::new(ReqBody::empty())).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
