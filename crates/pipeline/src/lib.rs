//! An asynchronous micro request-processing pipeline
//!
//! This crate provides the stage chain that sits between a transport and a
//! business handler in an HTTP service. It is transport-agnostic: the
//! transport supplies an already-parsed request head plus a streaming body,
//! and receives exactly one response per request, whatever happens in
//! between.
//!
//! # Features
//!
//! - Token-bucket admission control, checked before any handler work begins
//! - Streaming request body aggregation with an optional size limit
//! - Per-request deadline arbitration with single-writer response semantics
//! - One canonical translation of every failure into an outbound response
//! - Stages composed by ordinary function composition, folded once at build
//!   time
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use bytes::Bytes;
//! use http::{Request, Response};
//! use micro_pipeline::{HandlerError, Pipeline, ReqBody, ResponseBody, TokenBucket, handler_fn};
//!
//! async fn hello(_req: Request<Bytes>) -> Result<Response<ResponseBody>, HandlerError> {
//!     Ok(Response::new(ResponseBody::from("hello, pipeline!")))
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let limiter = Arc::new(TokenBucket::new(10.0, 5).unwrap());
//!
//!     let pipeline = Pipeline::builder()
//!         .limiter(limiter)
//!         .deadline(Duration::from_secs(5))
//!         .max_body_size(64 * 1024)
//!         .handler(handler_fn(hello))
//!         .build()
//!         .unwrap();
//!
//!     let request = Request::post("/hello").body(ReqBody::full("hi")).unwrap();
//!     let response = pipeline.serve(request).await;
//!     assert_eq!(response.status(), 200);
//! }
//! ```

mod aggregate;
mod dispatch;
mod handler;
mod pipeline;
mod respond;
mod service;
mod throttle;

pub mod protocol;
pub mod stage;

pub use aggregate::AggregateService;
pub use aggregate::AggregateStage;
pub use aggregate::aggregate;
pub use dispatch::DispatchService;
pub use dispatch::PipelineContext;
pub use handler::FnHandler;
pub use handler::Handler;
pub use handler::handler_fn;
pub use pipeline::Pipeline;
pub use pipeline::PipelineBuildError;
pub use pipeline::PipelineBuilder;
pub use respond::translate;
pub use service::FnService;
pub use service::Service;
pub use service::service_fn;
pub use throttle::InvalidRateLimit;
pub use throttle::ThrottleService;
pub use throttle::ThrottleStage;
pub use throttle::TokenBucket;

pub use protocol::body::BodySender;
pub use protocol::body::PayloadItem;
pub use protocol::body::ReqBody;
pub use protocol::body::ResponseBody;
pub use protocol::{BodyError, FailureKind, HandlerError};
