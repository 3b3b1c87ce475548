use std::error::Error;
use std::io;

use http::StatusCode;
use thiserror::Error;

/// Errors raised by the transport while streaming a request body.
///
/// These never cross a stage boundary raw: the aggregation stage converts
/// them into [`FailureKind::AggregationFailed`] before the error translator
/// ever sees them.
#[derive(Error, Debug)]
pub enum BodyError {
    #[error("connection reset before request body completed")]
    Reset,

    #[error("body stream error: {reason}")]
    Stream { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl BodyError {
    pub fn stream<S: ToString>(reason: S) -> Self {
        Self::Stream { reason: reason.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// A failure reported by the downstream handler.
///
/// Carries an optional status override for when the handler wants the
/// translated response to use something other than 500.
#[derive(Error, Debug)]
#[error("{source}")]
pub struct HandlerError {
    status: Option<StatusCode>,
    source: Box<dyn Error + Send + Sync>,
}

impl HandlerError {
    pub fn new<E: Into<Box<dyn Error + Send + Sync>>>(source: E) -> Self {
        Self { status: None, source: source.into() }
    }

    pub fn with_status<E: Into<Box<dyn Error + Send + Sync>>>(status: StatusCode, source: E) -> Self {
        Self { status: Some(status), source: source.into() }
    }

    /// The status the handler asked the translated response to use, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }
}

/// The canonical failure taxonomy of the pipeline.
///
/// Every fault is converted into one of these at the stage boundary where it
/// originates; this is the only error type that travels between stages. The
/// downstream handler never observes it.
#[derive(Error, Debug)]
pub enum FailureKind {
    /// The request body could not be buffered: stream error, size limit
    /// exceeded or connection reset.
    #[error("failed to aggregate request body: {reason}")]
    AggregationFailed { reason: String },

    /// The downstream handler resolved with an error (or panicked).
    #[error("downstream handler failed: {source}")]
    HandlerFailed {
        #[from]
        source: HandlerError,
    },

    /// The per-request deadline fired before the handler resolved. Reported
    /// distinctly from [`FailureKind::HandlerFailed`]: the handler may well
    /// still be running.
    #[error("request deadline exceeded")]
    TimedOut,

    /// Admission control rejected the request before any handler work began.
    #[error("request rejected by admission control")]
    Throttled,
}

impl FailureKind {
    pub fn aggregation_failed<S: ToString>(reason: S) -> Self {
        Self::AggregationFailed { reason: reason.to_string() }
    }
}

impl From<BodyError> for FailureKind {
    fn from(e: BodyError) -> Self {
        Self::AggregationFailed { reason: e.to_string() }
    }
}
