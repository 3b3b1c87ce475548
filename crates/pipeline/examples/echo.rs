use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response};
use micro_pipeline::{HandlerError, Pipeline, ReqBody, ResponseBody, TokenBucket, handler_fn};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

async fn echo(req: Request<Bytes>) -> Result<Response<ResponseBody>, HandlerError> {
    let content = req.into_body();
    info!(len = content.len(), "echoing request content");
    Ok(Response::new(ResponseBody::once(content)))
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let pipeline = Pipeline::builder()
        .limiter(Arc::new(TokenBucket::new(10.0, 5).expect("valid rate limit")))
        .deadline(Duration::from_secs(5))
        .max_body_size(64 * 1024)
        .handler(handler_fn(echo))
        .build()
        .expect("valid pipeline configuration");

    // a transport would feed chunks as they arrive off the wire
    let (body, mut sender) = ReqBody::channel();
    tokio::spawn(async move {
        for chunk in ["echo", " ", "echo"] {
            sender.send(chunk).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sender.finish().await.unwrap();
    });

    let request = Request::post("/echo").body(body).unwrap();
    let response = pipeline.serve(request).await;

    info!(status = %response.status(), "served");
    println!("{}", String::from_utf8_lossy(&response.into_body().into_bytes()));
}
