//! Request and response body types.

use bytes::Bytes;

mod req_body;
mod resp_body;

pub use req_body::{BodySender, ReqBody};
pub use resp_body::ResponseBody;

/// An item in the request body stream.
///
/// The transport feeds the body as a sequence of data chunks terminated by an
/// explicit EOF marker, so a stream that simply stops is distinguishable from
/// one that finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    /// A chunk of body data
    Chunk(Bytes),
    /// Marks the end of the body stream
    Eof,
}

impl PayloadItem {
    /// Returns true if this item represents the end of the body stream
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    /// Returns true if this item contains chunk data
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }

    /// Returns a reference to the contained bytes if this is a `Chunk`
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}
