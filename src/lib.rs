//! # axum-stream-response
//!
//! Range-aware streaming responses for [`axum`][1].
//!
//! A [`StreamResponse`] serves any body implementing the [`RangeBody`] trait
//! and answers `Range` requests with a single byte window, honouring the
//! `If-Range` precondition. Handling is split in two phases:
//!
//! 1. [`negotiate`] is a pure function from a [`ResourceDescriptor`] and a
//!    [`RangeRequest`] to a [`RangeDecision`]: `200`, `206` or `416`, plus
//!    the `Content-Range`, `Content-Length` and `Accept-Ranges` values.
//! 2. [`RangedStream`] (or [`emit`] for plain [`AsyncWrite`] sinks) seeks
//!    the body and yields exactly the decided bytes.
//!
//! Any type implementing both [`AsyncRead`] and [`AsyncSeekStart`] can be
//! used through the [`KnownSize`] adapter struct. [`AsyncSeekStart`] is a
//! trait defined by this crate which only allows seeking from the start of
//! a file. It is automatically implemented for any type implementing
//! [`AsyncSeek`].
//!
//! ```
//! use axum::Router;
//! use axum::routing::get;
//!
//! use axum_stream_response::{RangeRequest, StreamResponse};
//!
//! async fn file(request: RangeRequest) -> axum::response::Response {
//!     use axum::response::IntoResponse;
//!
//!     match StreamResponse::open("document.txt", request).await {
//!         Ok(response) => response.with_entity_tag("\"v1\"").into_response(),
//!         Err(_) => axum::http::StatusCode::NOT_FOUND.into_response(),
//!     }
//! }
//!
//! let _app = Router::<()>::new().route("/", get(file));
//! ```
//!
//! [1]: https://docs.rs/axum
//! [`AsyncWrite`]: tokio::io::AsyncWrite

mod config;
mod error;
mod file;
mod negotiate;
mod request;
mod response;
mod stream;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncSeek};

pub use config::{ResponseConfig, DEFAULT_BUFFER_SIZE, DEFAULT_CONTENT_TYPE};
pub use error::{Error, Result};
pub use file::KnownSize;
pub use negotiate::{
    http_date, negotiate, AcceptRanges, RangeDecision, RangeRequest, RangeStatus,
    ResourceDescriptor, WindowLength,
};
pub use response::StreamResponse;
pub use stream::{emit, emit_with_buffer_size, RangedStream};

/// [`AsyncSeek`] narrowed to only allow seeking from start.
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`], always passing position as the `SeekFrom::Start` variant.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], returning `()` instead of the new stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// An [`AsyncRead`] and [`AsyncSeekStart`] with a fixed known byte size.
///
/// A body is consumed by a single response; concurrent requests for the same
/// resource each need their own handle.
pub trait RangeBody: AsyncRead + AsyncSeekStart {
    /// The total size of the underlying file.
    ///
    /// This should not change for the lifetime of the object once queried.
    /// Behaviour is not guaranteed if it does change.
    fn byte_size(&self) -> u64;
}
