use std::{cmp, io, mem};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::{Response, IntoResponse};
use bytes::{Bytes, BytesMut};
use http_body::{Body, SizeHint, Frame};
use futures::{Stream, StreamExt};
use pin_project::pin_project;
use tokio::io::{AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::{debug, trace};

use crate::config::DEFAULT_BUFFER_SIZE;
use crate::error::Result;
use crate::{RangeBody, RangeDecision};

/// Response body stream over one byte window of a [`RangeBody`].
/// Implements [`Stream`], [`Body`], and [`IntoResponse`].
///
/// Yields exactly `length` bytes starting at `start`, or an error. A body
/// that ends early yields [`io::ErrorKind::UnexpectedEof`].
#[pin_project]
pub struct RangedStream<B> {
    state: StreamState,
    remaining: u64,
    buffer_size: usize,
    #[pin]
    body: B,
}

impl<B: RangeBody> RangedStream<B> {
    pub fn new(body: B, start: u64, length: u64) -> Self {
        Self::with_buffer_size(body, start, length, DEFAULT_BUFFER_SIZE)
    }

    /// Like [`RangedStream::new`], reading at most `buffer_size` bytes per chunk.
    pub fn with_buffer_size(body: B, start: u64, length: u64, buffer_size: usize) -> Self {
        // an empty window never touches the body
        let state = if length == 0 {
            StreamState::Done
        } else {
            StreamState::Seek { start }
        };

        RangedStream {
            state,
            remaining: length,
            buffer_size: buffer_size.max(1),
            body,
        }
    }

    /// Build the stream for a negotiated decision, resolving an open-ended
    /// window against the body size.
    pub fn for_decision(body: B, decision: &RangeDecision, buffer_size: usize) -> Self {
        let length = decision.length.resolve(body.byte_size(), decision.offset);
        Self::with_buffer_size(body, decision.offset, length, buffer_size)
    }
}

#[derive(Debug)]
enum StreamState {
    Seek { start: u64 },
    Seeking,
    Reading { buffer: BytesMut },
    Done,
}

impl<B: RangeBody + Send + 'static> IntoResponse for RangedStream<B> {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl<B: RangeBody> Body for RangedStream<B> {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining)
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.state, StreamState::Done)
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl<B: RangeBody> Stream for RangedStream<B> {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        loop {
            match this.state {
                StreamState::Seek { start } => {
                    let start = *start;
                    trace!(start, length = *this.remaining, "seeking body");
                    if let Err(e) = this.body.as_mut().start_seek(start) {
                        *this.state = StreamState::Done;
                        return Poll::Ready(Some(Err(e)));
                    }
                    *this.state = StreamState::Seeking;
                }

                StreamState::Seeking => {
                    match this.body.as_mut().poll_complete(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => {
                            *this.state = StreamState::Done;
                            return Poll::Ready(Some(Err(e)));
                        }
                        Poll::Ready(Ok(())) => {
                            let buffer = BytesMut::with_capacity(*this.buffer_size);
                            *this.state = StreamState::Reading { buffer };
                        }
                    }
                }

                StreamState::Reading { buffer } => {
                    let uninit = buffer.spare_capacity_mut();

                    // the smaller of the buffer size and the bytes remaining
                    let nbytes = cmp::min(
                        uninit.len(),
                        usize::try_from(*this.remaining).unwrap_or(usize::MAX),
                    );

                    let mut read_buf = ReadBuf::uninit(&mut uninit[0..nbytes]);

                    match this.body.as_mut().poll_read(cx, &mut read_buf) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => {
                            *this.state = StreamState::Done;
                            return Poll::Ready(Some(Err(e)));
                        }
                        Poll::Ready(Ok(())) => {
                            let n = read_buf.filled().len();
                            if n == 0 {
                                let remaining = *this.remaining;
                                debug!(remaining, "body ended before the requested window");
                                *this.state = StreamState::Done;
                                return Poll::Ready(Some(Err(io::Error::new(
                                    io::ErrorKind::UnexpectedEof,
                                    format!("body ended with {remaining} bytes of the range left"),
                                ))));
                            }

                            // SAFETY: poll_read has filled the buffer with `n`
                            // additional bytes
                            unsafe { buffer.set_len(buffer.len() + n); }

                            // n <= remaining because of the cmp::min above
                            *this.remaining -= n as u64;

                            let chunk = if *this.remaining == 0 {
                                let chunk = mem::take(buffer);
                                *this.state = StreamState::Done;
                                chunk
                            } else {
                                mem::replace(buffer, BytesMut::with_capacity(*this.buffer_size))
                            };

                            return Poll::Ready(Some(Ok(chunk.freeze())));
                        }
                    }
                }

                StreamState::Done => return Poll::Ready(None),
            }
        }
    }
}

/// Write the byte window chosen by `decision` from `body` into `sink`.
///
/// Returns the number of bytes written. A zero-length window performs no
/// seek, read, or write. Errors from the body or the sink propagate as-is;
/// bytes already written to the sink stay written. Dropping the returned
/// future stops the transfer at the next chunk boundary.
pub async fn emit<B, W>(body: B, decision: &RangeDecision, sink: &mut W) -> Result<u64>
where
    B: RangeBody,
    W: AsyncWrite + Unpin,
{
    emit_with_buffer_size(body, decision, sink, DEFAULT_BUFFER_SIZE).await
}

/// [`emit`] with an explicit chunk size.
pub async fn emit_with_buffer_size<B, W>(
    body: B,
    decision: &RangeDecision,
    sink: &mut W,
    buffer_size: usize,
) -> Result<u64>
where
    B: RangeBody,
    W: AsyncWrite + Unpin,
{
    let stream = RangedStream::for_decision(body, decision, buffer_size);
    if stream.remaining == 0 {
        return Ok(0);
    }

    futures::pin_mut!(stream);
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await.transpose()? {
        sink.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    sink.flush().await?;

    debug!(offset = decision.offset, written, "emitted range");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use assert_matches::assert_matches;
    use axum_extra::headers::ContentRange;
    use bytes::Bytes;
    use futures::{pin_mut, Stream, StreamExt};
    use tokio::fs::File;
    use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

    use crate::error::Error;
    use crate::{
        negotiate, AcceptRanges, KnownSize, RangeDecision, RangeRequest, RangeStatus,
        ResourceDescriptor, WindowLength,
    };

    use super::*;

    const FIXTURE: &[u8] = b"Hello world this is a file to test range requests on!\n";

    async fn collect_stream(stream: impl Stream<Item = io::Result<Bytes>>) -> String {
        let mut string = String::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await.transpose().unwrap() {
            string += std::str::from_utf8(&chunk).unwrap();
        }
        string
    }

    async fn body() -> KnownSize<File> {
        let file = File::open("test/fixture.txt").await.unwrap();
        KnownSize::file(file).await.unwrap()
    }

    fn cursor(bytes: &'static [u8]) -> KnownSize<Cursor<&'static [u8]>> {
        KnownSize::sized(Cursor::new(bytes), bytes.len() as u64)
    }

    fn window(offset: u64, length: WindowLength) -> RangeDecision {
        RangeDecision {
            status: RangeStatus::Partial,
            offset,
            length,
            content_range: None,
            content_length: None,
            accept_ranges: AcceptRanges::Bytes,
        }
    }

    /// Body that fails every seek and read.
    struct Broken;

    impl AsyncRead for Broken {
        fn poll_read(self: Pin<&mut Self>, _: &mut Context<'_>, _: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::other("read failed")))
        }
    }

    impl AsyncSeek for Broken {
        fn start_seek(self: Pin<&mut Self>, _: io::SeekFrom) -> io::Result<()> {
            Err(io::Error::other("seek failed"))
        }

        fn poll_complete(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<u64>> {
            Poll::Ready(Err(io::Error::other("seek failed")))
        }
    }

    #[tokio::test]
    async fn test_stream_window() {
        let stream = RangedStream::new(body().await, 30, 24);
        assert_eq!("test range requests on!\n", &collect_stream(stream).await);
    }

    #[tokio::test]
    async fn test_small_buffer_preserves_order() {
        let stream = RangedStream::with_buffer_size(cursor(FIXTURE), 0, 54, 7);
        let chunks: Vec<_> = stream.map(|chunk| chunk.unwrap().len()).collect().await;
        assert_eq!(vec![7, 7, 7, 7, 7, 7, 7, 5], chunks);

        let stream = RangedStream::with_buffer_size(body().await, 0, 54, 7);
        assert_eq!(std::str::from_utf8(FIXTURE).unwrap(), &collect_stream(stream).await);
    }

    #[tokio::test]
    async fn test_truncated_body_errors() {
        // claims 100 bytes, holds 54
        let body = KnownSize::sized(Cursor::new(FIXTURE), 100);
        let stream = RangedStream::new(body, 50, 20);
        let results: Vec<_> = stream.collect().await;
        assert_eq!(2, results.len());
        assert_eq!(b"on!\n" as &[u8], &results[0].as_ref().unwrap()[..]);
        assert_matches!(&results[1], Err(e) if e.kind() == io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_emit_partial_decision() {
        let decision = negotiate(&ResourceDescriptor::new(54), &RangeRequest::range("bytes=-20"));
        assert_eq!(Some(ContentRange::bytes(34..54, 54).unwrap()), decision.content_range);

        let mut sink = Vec::new();
        let written = emit(body().await, &decision, &mut sink).await.unwrap();
        assert_eq!(20, written);
        assert_eq!(b" range requests on!\n" as &[u8], &sink[..]);
    }

    #[tokio::test]
    async fn test_emit_to_end_resolves_at_stream_time() {
        let mut sink = Vec::new();
        let written = emit(cursor(FIXTURE), &window(40, WindowLength::ToEnd), &mut sink).await.unwrap();
        assert_eq!(14, written);
        assert_eq!(b" requests on!\n" as &[u8], &sink[..]);
    }

    #[tokio::test]
    async fn test_emit_full_decision() {
        let decision = negotiate(&ResourceDescriptor::new(54), &RangeRequest::default());
        let mut sink = Vec::new();
        assert_eq!(54, emit(cursor(FIXTURE), &decision, &mut sink).await.unwrap());
        assert_eq!(FIXTURE, &sink[..]);
    }

    #[tokio::test]
    async fn test_emit_is_repeatable_on_fresh_handles() {
        let decision = negotiate(&ResourceDescriptor::new(54), &RangeRequest::range("bytes=6-10"));

        let mut first = Vec::new();
        let mut second = Vec::new();
        emit(cursor(FIXTURE), &decision, &mut first).await.unwrap();
        emit(body().await, &decision, &mut second).await.unwrap();

        assert_eq!(b"world" as &[u8], &first[..]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_zero_length_window_never_touches_body() {
        let body = KnownSize::sized(Broken, 1000);
        let mut sink = Vec::new();
        let written = emit(body, &window(5000, WindowLength::Bytes(0)), &mut sink).await.unwrap();
        assert_eq!(0, written);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_unsatisfiable_decision_emits_nothing() {
        let decision = negotiate(&ResourceDescriptor::new(1000), &RangeRequest::range("bytes=50-2000"));
        assert_eq!(RangeStatus::Unsatisfiable, decision.status);

        let mut sink = Vec::new();
        let written = emit(KnownSize::sized(Broken, 1000), &decision, &mut sink).await.unwrap();
        assert_eq!(0, written);
    }

    #[tokio::test]
    async fn test_emit_propagates_seek_error() {
        let mut sink = Vec::new();
        let result = emit(KnownSize::sized(Broken, 1000), &window(10, WindowLength::Bytes(5)), &mut sink).await;
        assert_matches!(result, Err(Error::Io(e)) if e.to_string() == "seek failed");
        assert!(sink.is_empty());
    }
}
