use std::future::Future;

use async_trait::async_trait;
use http::{Request, Response};

use crate::protocol::FailureKind;
use crate::protocol::body::{ReqBody, ResponseBody};

/// The uniform runtime seam between pipeline stages.
///
/// Every composed stage is a `Service`: it receives the request and either
/// calls the next stage (optionally transforming its result) or
/// short-circuits with its own outcome. Failures travel between stages only
/// as [`FailureKind`].
#[async_trait]
pub trait Service: Send + Sync {
    async fn serve(&self, req: Request<ReqBody>) -> Result<Response<ResponseBody>, FailureKind>;
}

/// a holder which represents any async fn as a [`Service`]
#[derive(Debug)]
pub struct FnService<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Service for FnService<F>
where
    F: Fn(Request<ReqBody>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response<ResponseBody>, FailureKind>> + Send,
{
    async fn serve(&self, req: Request<ReqBody>) -> Result<Response<ResponseBody>, FailureKind> {
        (self.f)(req).await
    }
}

pub fn service_fn<F, Fut>(f: F) -> FnService<F>
where
    F: Fn(Request<ReqBody>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response<ResponseBody>, FailureKind>> + Send,
{
    FnService { f }
}
