//! Wire types exchanged between the dispatcher/controller and workers, and the framed codec
//! that (de)serializes them off a [`tokio::io`] stream.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]

pub mod codec;
pub mod message;

pub use codec::{CodecError, FrameCodec};
pub use message::{
    ExtendedStatus, Frame, FrameKind, Performance, Request, RequestPayload, RequestType, Response,
    ResponsePayload, ResponseStatus,
};
