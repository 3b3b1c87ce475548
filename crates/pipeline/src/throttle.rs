//! Token-bucket admission control, applied before any handler work begins.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::{Request, Response};
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::protocol::FailureKind;
use crate::protocol::body::{ReqBody, ResponseBody};
use crate::service::Service;
use crate::stage::Stage;

#[derive(Error, Debug)]
pub enum InvalidRateLimit {
    #[error("refill rate must be positive, got {rate}")]
    Rate { rate: f64 },
    #[error("burst capacity must be at least 1, got {burst}")]
    Burst { burst: u32 },
}

/// A token bucket shared across all concurrent requests.
///
/// The bucket starts full at `burst` tokens and refills continuously at
/// `rate` tokens per second, capped at `burst`. Each admitted request spends
/// one token. The bucket is an explicitly constructed object injected into
/// the pipeline at build time, so tests can use independent instances.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    refreshed_at: Instant,
}

impl TokenBucket {
    /// Creates a bucket refilling at `rate` tokens per second and holding at
    /// most `burst` tokens.
    pub fn new(rate: f64, burst: u32) -> Result<Self, InvalidRateLimit> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(InvalidRateLimit::Rate { rate });
        }
        if burst == 0 {
            return Err(InvalidRateLimit::Burst { burst });
        }

        Ok(Self {
            rate,
            burst: f64::from(burst),
            state: Mutex::new(BucketState { tokens: f64::from(burst), refreshed_at: Instant::now() }),
        })
    }

    /// Attempts to spend one token; returns whether the request is admitted.
    ///
    /// Refill and spend happen inside one critical section, so two concurrent
    /// callers can never observe and decrement from a stale token count.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap();

        let now = Instant::now();
        let elapsed = now.duration_since(state.refreshed_at).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.refreshed_at = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// A stage that gates its inner service behind a shared [`TokenBucket`].
#[derive(Debug, Clone)]
pub struct ThrottleStage {
    limiter: Arc<TokenBucket>,
}

impl ThrottleStage {
    pub fn new(limiter: Arc<TokenBucket>) -> Self {
        Self { limiter }
    }
}

impl<S: Service> Stage<S> for ThrottleStage {
    type Out = ThrottleService<S>;

    fn apply(&self, inner: S) -> Self::Out {
        ThrottleService { limiter: Arc::clone(&self.limiter), inner }
    }
}

#[derive(Debug)]
pub struct ThrottleService<S> {
    limiter: Arc<TokenBucket>,
    inner: S,
}

#[async_trait]
impl<S: Service> Service for ThrottleService<S> {
    async fn serve(&self, req: Request<ReqBody>) -> Result<Response<ResponseBody>, FailureKind> {
        if self.limiter.try_acquire() {
            self.inner.serve(req).await
        } else {
            debug!(path = %req.uri().path(), "admission rejected, bucket empty");
            Err(FailureKind::Throttled)
        }
    }
}
