//! Request body aggregation: collecting a streamed body into one in-memory
//! message before it reaches business logic.

use async_trait::async_trait;
use http::{Request, Response};
use http_body_util::{BodyExt, Limited};
use tracing::debug;

use crate::protocol::FailureKind;
use crate::protocol::body::{ReqBody, ResponseBody};
use crate::service::Service;
use crate::stage::Stage;

/// Buffers the streaming body of `req` into a single message.
///
/// Chunks are concatenated in arrival order, byte-exact. The result is a new
/// request carrying the buffered body; method, path and headers are carried
/// over untouched. A zero-length body resolves immediately, and a body that
/// is already aggregated passes through as-is.
///
/// Fails with [`FailureKind::AggregationFailed`] on a stream error, a
/// connection reset, or when the body exceeds `max_size`.
pub async fn aggregate(req: Request<ReqBody>, max_size: Option<usize>) -> Result<Request<ReqBody>, FailureKind> {
    let (parts, body) = req.into_parts();

    if body.is_aggregated() {
        return Ok(Request::from_parts(parts, body));
    }

    let collected = match max_size {
        Some(limit) => Limited::new(body, limit).collect().await.map_err(FailureKind::aggregation_failed)?,
        None => body.collect().await.map_err(FailureKind::from)?,
    };

    let bytes = collected.to_bytes();
    debug!(len = bytes.len(), "aggregated request body");

    Ok(Request::from_parts(parts, ReqBody::full(bytes)))
}

/// A stage that aggregates the request body in front of its inner service.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateStage {
    max_size: Option<usize>,
}

impl AggregateStage {
    /// Aggregation without a size limit.
    pub fn new() -> Self {
        Self { max_size: None }
    }

    /// Aggregation rejecting bodies larger than `max_size` bytes.
    pub fn with_limit(max_size: usize) -> Self {
        Self { max_size: Some(max_size) }
    }
}

impl<S: Service> Stage<S> for AggregateStage {
    type Out = AggregateService<S>;

    fn apply(&self, inner: S) -> Self::Out {
        AggregateService { inner, max_size: self.max_size }
    }
}

#[derive(Debug)]
pub struct AggregateService<S> {
    inner: S,
    max_size: Option<usize>,
}

#[async_trait]
impl<S: Service> Service for AggregateService<S> {
    async fn serve(&self, req: Request<ReqBody>) -> Result<Response<ResponseBody>, FailureKind> {
        let req = aggregate(req, self.max_size).await?;
        self.inner.serve(req).await
    }
}
