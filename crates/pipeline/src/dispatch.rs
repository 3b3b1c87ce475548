//! Handler dispatch and deadline arbitration.
//!
//! The dispatcher is the terminal stage of the chain: it adapts the
//! downstream [`Handler`] capability into the [`Service`] seam and races the
//! handler invocation against the per-request deadline.
//!
//! The race follows a single-writer protocol: the timer and the handler
//! invocation run as independent producers, and whichever resolves first
//! claims the request's single-use completion flag with a compare-and-set.
//! Only the claimant's outcome is delivered; the loser is discarded. A fired
//! timeout therefore cancels the logical wait on the handler, not the handler
//! itself: the spawned invocation may run to completion in the background,
//! and its late result is dropped.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use http::{Request, Response};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::aggregate::aggregate;
use crate::handler::Handler;
use crate::protocol::body::{ReqBody, ResponseBody};
use crate::protocol::{FailureKind, HandlerError};
use crate::service::Service;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(0);

/// Per-request bookkeeping for the deadline race.
///
/// Owned by the dispatcher for the duration of one request. The completion
/// flag is single-use: the first [`PipelineContext::try_claim`] wins and
/// every later claim fails.
#[derive(Debug)]
pub struct PipelineContext {
    id: u64,
    arrival: Instant,
    deadline: Option<Instant>,
    completed: AtomicBool,
}

impl PipelineContext {
    pub fn new(deadline: Option<Duration>) -> Self {
        let arrival = Instant::now();
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            arrival,
            deadline: deadline.map(|d| arrival + d),
            completed: AtomicBool::new(false),
        }
    }

    /// Correlation id, unique within the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn arrival(&self) -> Instant {
        self.arrival
    }

    /// The absolute instant the request times out, if a deadline is set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Claims the single completion slot; returns false if already claimed.
    pub fn try_claim(&self) -> bool {
        self.completed.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

/// Terminal stage: invokes the downstream handler under the request deadline.
pub struct DispatchService<H> {
    handler: Arc<H>,
    deadline: Option<Duration>,
}

impl<H> DispatchService<H> {
    pub fn new(handler: H, deadline: Option<Duration>) -> Self {
        Self { handler: Arc::new(handler), deadline }
    }
}

impl<H> std::fmt::Debug for DispatchService<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchService").field("deadline", &self.deadline).finish_non_exhaustive()
    }
}

#[async_trait]
impl<H: Handler + 'static> Service for DispatchService<H> {
    async fn serve(&self, req: Request<ReqBody>) -> Result<Response<ResponseBody>, FailureKind> {
        // the handler contract is one fully buffered message; this is a no-op
        // when the aggregation stage already ran
        let req = aggregate(req, None).await?;
        let (parts, body) = req.into_parts();
        let req = Request::from_parts(parts, body.into_full().unwrap_or_default());

        let ctx = Arc::new(PipelineContext::new(self.deadline));
        let handler = Arc::clone(&self.handler);

        let Some(deadline) = ctx.deadline() else {
            // no deadline configured: the arbiter is a pass-through and the
            // handler outcome is always the terminal state
            return invoke(handler.as_ref(), req).await.map_err(FailureKind::from);
        };

        debug!(id = ctx.id(), "dispatching request under deadline");
        let (verdict_tx, mut verdict_rx) = mpsc::channel::<Result<Response<ResponseBody>, FailureKind>>(1);

        let claim = Arc::clone(&ctx);
        let tx = verdict_tx.clone();
        tokio::spawn(async move {
            let outcome = invoke(handler.as_ref(), req).await;
            if claim.try_claim() {
                let _ = tx.try_send(outcome.map_err(FailureKind::from));
            } else {
                debug!(id = claim.id(), "discarding handler outcome that lost the deadline race");
            }
        });

        let claim = Arc::clone(&ctx);
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if claim.try_claim() {
                warn!(id = claim.id(), "request deadline fired before the handler resolved");
                let _ = verdict_tx.try_send(Err(FailureKind::TimedOut));
            }
        });

        // exactly one producer claims the completion flag and sends
        let verdict = verdict_rx.recv().await.expect("arbitration produced no verdict");
        timer.abort();
        verdict
    }
}

/// Runs the handler, containing panics so a misbehaving handler cannot take
/// the arbitration down with it.
async fn invoke<H: Handler>(handler: &H, req: Request<Bytes>) -> Result<Response<ResponseBody>, HandlerError> {
    match AssertUnwindSafe(handler.handle(req)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(_panic) => {
            error!("downstream handler panicked");
            Err(HandlerError::new("downstream handler panicked"))
        }
    }
}
