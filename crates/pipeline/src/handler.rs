use std::future::Future;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};

use crate::protocol::HandlerError;
use crate::protocol::body::ResponseBody;

/// The downstream business handler capability.
///
/// Receives a fully aggregated request and produces the business response.
/// The pipeline invokes it at most once per admitted request and never for a
/// rejected one.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, req: Request<Bytes>) -> Result<Response<ResponseBody>, HandlerError>;
}

#[async_trait]
impl Handler for Box<dyn Handler> {
    async fn handle(&self, req: Request<Bytes>) -> Result<Response<ResponseBody>, HandlerError> {
        self.as_ref().handle(req).await
    }
}

/// a holder which represents any async fn as a [`Handler`]
#[derive(Debug)]
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response<ResponseBody>, HandlerError>> + Send,
{
    async fn handle(&self, req: Request<Bytes>) -> Result<Response<ResponseBody>, HandlerError> {
        (self.f)(req).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response<ResponseBody>, HandlerError>> + Send,
{
    FnHandler { f }
}
