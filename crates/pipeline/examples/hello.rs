use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response};
use micro_pipeline::{HandlerError, Pipeline, ReqBody, ResponseBody, TokenBucket, handler_fn};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

async fn hello(_req: Request<Bytes>) -> Result<Response<ResponseBody>, HandlerError> {
    Ok(Response::new(ResponseBody::from("Hello, pipeline!")))
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let limiter = Arc::new(TokenBucket::new(10.0, 5).expect("valid rate limit"));

    let pipeline = Pipeline::builder()
        .limiter(limiter)
        .deadline(Duration::from_secs(5))
        .handler(handler_fn(hello))
        .build()
        .expect("valid pipeline configuration");

    let request = Request::get("/").body(ReqBody::empty()).unwrap();
    let response = pipeline.serve(request).await;

    info!(status = %response.status(), "served");
    println!("{}", String::from_utf8_lossy(&response.into_body().into_bytes()));
}
