use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;

use futures::SinkExt;
use futures::channel::mpsc;
use futures::stream::StreamExt;

use http_body::{Body, Frame, SizeHint};

use crate::protocol::BodyError;
use crate::protocol::body::PayloadItem;

/// An inbound request body.
///
/// # Design Goals
///
/// The main design goals of `ReqBody` are:
/// 1. Model the two body states a request moves through: a finite ordered
///    stream of chunks fed by the transport, or a single buffer produced by
///    aggregation
/// 2. Bridge transport-delivered chunks to the standard `http_body::Body`
///    interface so aggregation can use ordinary body combinators
/// 3. Let the transport feed chunks asynchronously without ever blocking the
///    consumer's thread
///
/// # Architecture
///
/// A streaming body uses a channel-based architecture:
/// - `ReqBody`: consumer side that implements `http_body::Body`
/// - `BodySender`: producer side held by the transport
///
/// The producer pushes [`PayloadItem`] values and terminates the stream with
/// an explicit [`PayloadItem::Eof`] (via [`BodySender::finish`]) or an error
/// (via [`BodySender::fail`]). Dropping the sender without finishing is a
/// connection reset and surfaces as [`BodyError::Reset`] at the consumer.
#[derive(Debug)]
pub struct ReqBody {
    kind: Kind,
}

#[derive(Debug)]
enum Kind {
    /// a single already-buffered message, `None` once consumed (or empty)
    Full(Option<Bytes>),
    /// chunks arriving from the transport
    Channel { receiver: mpsc::Receiver<Result<PayloadItem, BodyError>>, eof: bool },
}

impl ReqBody {
    /// Creates an empty, already-aggregated body. Resolves immediately.
    pub fn empty() -> Self {
        Self { kind: Kind::Full(None) }
    }

    /// Creates an already-aggregated body holding a single buffer.
    pub fn full(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() { Self::empty() } else { Self { kind: Kind::Full(Some(bytes)) } }
    }

    /// Creates a streaming body channel pair.
    ///
    /// The returned `ReqBody` is handed to the pipeline, while the transport
    /// keeps the [`BodySender`] and feeds chunks as they arrive off the wire.
    pub fn channel() -> (ReqBody, BodySender) {
        let (sender, receiver) = mpsc::channel(16);
        (Self { kind: Kind::Channel { receiver, eof: false } }, BodySender { sender })
    }

    /// Returns true if this body is a single buffered message.
    pub fn is_aggregated(&self) -> bool {
        matches!(self.kind, Kind::Full(_))
    }

    /// Consumes an aggregated body, yielding its buffer.
    ///
    /// Returns `None` for a body that is still streaming.
    pub fn into_full(self) -> Option<Bytes> {
        match self.kind {
            Kind::Full(option_bytes) => Some(option_bytes.unwrap_or_default()),
            Kind::Channel { .. } => None,
        }
    }
}

impl From<Bytes> for ReqBody {
    fn from(bytes: Bytes) -> Self {
        Self::full(bytes)
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().kind {
            Kind::Full(option_bytes) if option_bytes.is_none() => Poll::Ready(None),
            Kind::Full(option_bytes) => Poll::Ready(Some(Ok(Frame::data(option_bytes.take().unwrap())))),
            Kind::Channel { eof, .. } if *eof => Poll::Ready(None),
            Kind::Channel { receiver, eof } => match ready!(receiver.poll_next_unpin(cx)) {
                Some(Ok(PayloadItem::Chunk(bytes))) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
                Some(Ok(PayloadItem::Eof)) => {
                    *eof = true;
                    Poll::Ready(None)
                }
                Some(Err(e)) => {
                    *eof = true;
                    Poll::Ready(Some(Err(e)))
                }
                // sender dropped without signalling eof
                None => {
                    *eof = true;
                    Poll::Ready(Some(Err(BodyError::Reset)))
                }
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Full(option_bytes) => option_bytes.is_none(),
            Kind::Channel { eof, .. } => *eof,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Full(None) => SizeHint::with_exact(0),
            Kind::Full(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            Kind::Channel { .. } => SizeHint::default(),
        }
    }
}

/// Producer half of a streaming [`ReqBody`], held by the transport.
#[derive(Debug)]
pub struct BodySender {
    sender: mpsc::Sender<Result<PayloadItem, BodyError>>,
}

impl BodySender {
    /// Sends one chunk of body data.
    ///
    /// Fails with [`BodyError::Reset`] when the consumer is gone.
    pub async fn send(&mut self, bytes: impl Into<Bytes>) -> Result<(), BodyError> {
        if self.sender.send(Ok(PayloadItem::Chunk(bytes.into()))).await.is_err() {
            return Err(BodyError::Reset);
        }
        Ok(())
    }

    /// Marks the body as complete.
    pub async fn finish(mut self) -> Result<(), BodyError> {
        if self.sender.send(Ok(PayloadItem::Eof)).await.is_err() {
            return Err(BodyError::Reset);
        }
        Ok(())
    }

    /// Fails the body stream; the consumer observes `error` in place of the
    /// next chunk.
    pub async fn fail(mut self, error: BodyError) {
        let _ = self.sender.send(Err(error)).await;
    }
}
