//! Core protocol types shared by every pipeline stage: request/response
//! bodies, the payload stream vocabulary and the error taxonomy.

pub mod body;
mod error;

pub use error::{BodyError, FailureKind, HandlerError};
