//! The buffered async input stream contract.
//!
//! An [`AsyncInputStream`] is an [`AsyncResource`] that owns a
//! [`StreamBuffer`] and supplies one backend operation: `poll_fill`, which
//! moves bytes from the transport into the buffer. Everything callers
//! actually use — `buffered_data`, `peek`, `peek_or_eof`, `read_exact`,
//! `read_value` — is provided on top and is identical for every stream.
//!
//! # Fatal-Error Discipline
//!
//! Input errors are unrecoverable for the stream that produced them. A
//! transport failure inside `poll_fill` resets the stream before the error
//! propagates; EOF encountered where data was required (`peek`,
//! `read_exact`) does the same. Only `peek_or_eof` lets a caller observe
//! end-of-stream as a value instead of a failure.
//!
//! # Cancel Safety
//!
//! - `peek` / `peek_or_eof` / `read_exact` register the lifecycle waiter
//!   while suspended; a reset wakes them and they resolve `Cancelled` after
//!   releasing the transport. Buffered bytes stay in the buffer.
//! - Dropping any of these futures mid-suspension deregisters the waiter
//!   and ends the fill; the stream remains usable.

use crate::buffer::{BufferView, FillPermit, StreamBuffer};
use crate::error::{Error, ErrorKind, Result};
use crate::lifecycle::LifecycleState;
use crate::resource::AsyncResource;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// Outcome of [`AsyncInputStream::peek_or_eof`].
#[derive(Debug)]
pub struct PeekResult<'a> {
    /// The currently visible buffered bytes (longest contiguous prefix).
    pub data: &'a [u8],
    /// True if the transport reached end-of-stream.
    pub is_eof: bool,
}

/// A value with a fixed byte size that can be decoded from a stream.
///
/// Integers decode little-endian; byte arrays decode verbatim.
pub trait FixedLayout: Sized {
    /// Exact number of bytes [`read_value`](AsyncInputStream::read_value)
    /// consumes for this type.
    const SIZE: usize;

    /// Decodes from exactly [`SIZE`](Self::SIZE) bytes.
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! fixed_layout_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FixedLayout for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn decode(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

fixed_layout_int!(u8, i8, u16, i16, u32, i32, u64, i64, u128, i128);

impl<const N: usize> FixedLayout for [u8; N] {
    const SIZE: usize = N;

    fn decode(bytes: &[u8]) -> Self {
        let mut raw = [0u8; N];
        raw.copy_from_slice(bytes);
        raw
    }
}

/// The buffered input stream contract.
pub trait AsyncInputStream: AsyncResource {
    /// The stream's exclusively-owned buffer.
    fn buffer(&self) -> &StreamBuffer;

    /// Mutable access to the buffer; the provided operations and the
    /// stream's own `poll_fill` are the only intended callers.
    fn buffer_mut(&mut self) -> &mut StreamBuffer;

    /// Backend fill: moves transport bytes into the buffer.
    ///
    /// Appends at least one byte and returns `Ok(true)`, or returns
    /// `Ok(false)` having appended nothing if the transport reached
    /// end-of-stream. A transport read failure is fatal: the
    /// implementation must [`reset`](AsyncResource::reset) the stream
    /// before returning `Err`.
    ///
    /// Only callable with a [`FillPermit`], which the provided operations
    /// grant for the duration of one fill. At most one fill is in flight
    /// per stream; this is the only input operation that may suspend.
    fn poll_fill(&mut self, cx: &mut Context<'_>, permit: &FillPermit) -> Poll<Result<bool>>;

    /// The currently buffered, unconsumed bytes. Never suspends.
    ///
    /// # Panics
    ///
    /// Panics if the stream is not open.
    fn buffered_data(&self) -> &[u8] {
        assert!(
            self.is_open(),
            "buffered_data on a resource that is not open"
        );
        self.buffer().data()
    }

    /// Returns buffered data, filling once if the last operation was
    /// already a peek, and reports end-of-stream as a value.
    ///
    /// Repeated calls while no new data has arrived are idempotent.
    fn peek_or_eof(&mut self) -> PeekOrEof<'_, Self>
    where
        Self: Sized,
    {
        PeekOrEof {
            stream: Some(self),
            registered: false,
            tried_buffered: false,
        }
    }

    /// Like [`peek_or_eof`](Self::peek_or_eof), but end-of-stream is a hard
    /// failure: the stream is reset and `UnexpectedEof` returned. Callers
    /// that need to distinguish EOF from error use `peek_or_eof`.
    fn peek(&mut self) -> Peek<'_, Self>
    where
        Self: Sized,
    {
        Peek {
            stream: Some(self),
            registered: false,
            tried_buffered: false,
        }
    }

    /// Reads exactly `count` bytes, filling as often as needed.
    ///
    /// Consumes the bytes from the buffer and resolves to a view of them.
    /// EOF before `count` bytes are available resets the stream and fails
    /// with `UnexpectedEof`. `count = 0` resolves immediately with an
    /// empty view.
    fn read_exact(&mut self, count: usize) -> ReadExact<'_, Self>
    where
        Self: Sized,
    {
        ReadExact {
            stream: Some(self),
            count,
            registered: false,
        }
    }

    /// Reads a fixed-layout value: exactly [`T::SIZE`](FixedLayout::SIZE)
    /// bytes, decoded in place.
    fn read_value<T: FixedLayout>(&mut self) -> ReadValue<'_, Self, T>
    where
        Self: Sized,
    {
        ReadValue {
            stream: Some(self),
            registered: false,
            _marker: std::marker::PhantomData,
        }
    }
}

/// Drives one fill step with waiter registration and cancellation handling.
///
/// `registered` tracks whether this operation currently holds the waiter
/// slot and the fill-in-flight mark; the calling future clears both via
/// its `Drop` if it is abandoned mid-suspension.
fn poll_fill_once<S: AsyncInputStream + ?Sized>(
    stream: &mut S,
    cx: &mut Context<'_>,
    registered: &mut bool,
) -> Poll<Result<bool>> {
    match stream.lifecycle().state() {
        LifecycleState::Open => {}
        LifecycleState::Reset if *registered => {
            // Woken by a reset concurrent with our suspension: finish the
            // transport release on its behalf and surface cancellation.
            *registered = false;
            stream.lifecycle().end_wait();
            stream.buffer_mut().end_fill();
            stream.abort();
            tracing::debug!("fill cancelled by reset");
            return Poll::Ready(Err(
                Error::new(ErrorKind::Cancelled).with_message("stream reset while filling")
            ));
        }
        _ => panic!("waiting on a resource that is not open"),
    }

    if *registered {
        stream.lifecycle().update_wait(cx.waker());
    } else {
        stream.buffer_mut().begin_fill();
        stream.lifecycle().begin_wait(cx.waker());
        *registered = true;
    }

    let permit = FillPermit::grant();
    match stream.poll_fill(cx, &permit) {
        Poll::Pending => Poll::Pending,
        Poll::Ready(result) => {
            *registered = false;
            stream.lifecycle().end_wait();
            stream.buffer_mut().end_fill();
            Poll::Ready(result)
        }
    }
}

/// One peek step shared by [`Peek`] and [`PeekOrEof`].
///
/// Resolves `Ok(false)` when buffered data is visible (peek marker set) and
/// `Ok(true)` at end-of-stream.
fn poll_peek_step<S: AsyncInputStream + ?Sized>(
    stream: &mut S,
    cx: &mut Context<'_>,
    registered: &mut bool,
    tried_buffered: &mut bool,
) -> Poll<Result<bool>> {
    if !*tried_buffered {
        *tried_buffered = true;
        if !stream.buffer().was_peeked() && !stream.buffer().is_empty() {
            assert!(stream.is_open(), "peek on a resource that is not open");
            stream.buffer_mut().set_peeked(true);
            return Poll::Ready(Ok(false));
        }
    }
    match poll_fill_once(stream, cx, registered) {
        Poll::Pending => Poll::Pending,
        Poll::Ready(Ok(true)) => {
            stream.buffer_mut().set_peeked(true);
            Poll::Ready(Ok(false))
        }
        Poll::Ready(Ok(false)) => Poll::Ready(Ok(true)),
        Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
    }
}

macro_rules! take_stream {
    ($self:ident) => {
        $self
            .stream
            .take()
            .expect("future polled after completion")
    };
}

/// Future returned by [`AsyncInputStream::peek_or_eof`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct PeekOrEof<'a, S: AsyncInputStream> {
    stream: Option<&'a mut S>,
    registered: bool,
    tried_buffered: bool,
}

impl<'a, S: AsyncInputStream> Future for PeekOrEof<'a, S> {
    type Output = Result<PeekResult<'a>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let stream = this.stream.as_mut().expect("future polled after completion");
        let step = ready!(poll_peek_step(
            *stream,
            cx,
            &mut this.registered,
            &mut this.tried_buffered
        ));
        let is_eof = match step {
            Ok(is_eof) => is_eof,
            Err(err) => {
                this.stream = None;
                return Poll::Ready(Err(err));
            }
        };
        let stream = take_stream!(this);
        let data: &'a [u8] = (&*stream).buffer().data();
        Poll::Ready(Ok(PeekResult { data, is_eof }))
    }
}

impl<S: AsyncInputStream> Drop for PeekOrEof<'_, S> {
    fn drop(&mut self) {
        abandon_fill(&mut self.stream, self.registered);
    }
}

/// Future returned by [`AsyncInputStream::peek`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Peek<'a, S: AsyncInputStream> {
    stream: Option<&'a mut S>,
    registered: bool,
    tried_buffered: bool,
}

impl<'a, S: AsyncInputStream> Future for Peek<'a, S> {
    type Output = Result<&'a [u8]>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let stream = this.stream.as_mut().expect("future polled after completion");
        let step = ready!(poll_peek_step(
            *stream,
            cx,
            &mut this.registered,
            &mut this.tried_buffered
        ));
        match step {
            Ok(false) => {
                let stream = take_stream!(this);
                let data: &'a [u8] = (&*stream).buffer().data();
                Poll::Ready(Ok(data))
            }
            Ok(true) => {
                // EOF where data was required is fatal for this stream.
                stream.reset();
                this.stream = None;
                Poll::Ready(Err(Error::new(ErrorKind::UnexpectedEof)
                    .with_message("end of stream while peeking")))
            }
            Err(err) => {
                this.stream = None;
                Poll::Ready(Err(err))
            }
        }
    }
}

impl<S: AsyncInputStream> Drop for Peek<'_, S> {
    fn drop(&mut self) {
        abandon_fill(&mut self.stream, self.registered);
    }
}

/// Future returned by [`AsyncInputStream::read_exact`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct ReadExact<'a, S: AsyncInputStream> {
    stream: Option<&'a mut S>,
    count: usize,
    registered: bool,
}

impl<'a, S: AsyncInputStream> Future for ReadExact<'a, S> {
    type Output = Result<BufferView<'a>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let count = this.count;
        {
            let stream = this.stream.as_mut().expect("future polled after completion");
            match poll_buffer_exact(*stream, cx, count, &mut this.registered) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Ok(())) => {}
                Poll::Ready(Err(err)) => {
                    this.stream = None;
                    return Poll::Ready(Err(err));
                }
            }
        }
        let stream = take_stream!(this);
        Poll::Ready(Ok(stream.buffer_mut().take(count)))
    }
}

impl<S: AsyncInputStream> Drop for ReadExact<'_, S> {
    fn drop(&mut self) {
        abandon_fill(&mut self.stream, self.registered);
    }
}

/// Future returned by [`AsyncInputStream::read_value`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct ReadValue<'a, S: AsyncInputStream, T> {
    stream: Option<&'a mut S>,
    registered: bool,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<S: AsyncInputStream, T: FixedLayout> Future for ReadValue<'_, S, T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let stream = this.stream.as_mut().expect("future polled after completion");
        match poll_buffer_exact(*stream, cx, T::SIZE, &mut this.registered) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(())) => {
                let view = stream.buffer_mut().take(T::SIZE);
                let value = T::decode(&view);
                drop(view);
                this.stream = None;
                Poll::Ready(Ok(value))
            }
            Poll::Ready(Err(err)) => {
                this.stream = None;
                Poll::Ready(Err(err))
            }
        }
    }
}

impl<S: AsyncInputStream, T> Drop for ReadValue<'_, S, T> {
    fn drop(&mut self) {
        abandon_fill(&mut self.stream, self.registered);
    }
}

/// Fills until at least `count` bytes are buffered. EOF short of `count`
/// resets the stream and fails `UnexpectedEof`.
fn poll_buffer_exact<S: AsyncInputStream + ?Sized>(
    stream: &mut S,
    cx: &mut Context<'_>,
    count: usize,
    registered: &mut bool,
) -> Poll<Result<()>> {
    if count == 0 {
        return Poll::Ready(Ok(()));
    }
    while stream.buffer().len() < count {
        match poll_fill_once(stream, cx, registered) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(true)) => {}
            Poll::Ready(Ok(false)) => {
                let buffered = stream.buffer().len();
                tracing::debug!(needed = count, buffered, "EOF short of requested data");
                stream.reset();
                return Poll::Ready(Err(Error::new(ErrorKind::UnexpectedEof).with_message(
                    format!("end of stream with {buffered} of {count} bytes buffered"),
                )));
            }
            Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
        }
    }
    Poll::Ready(Ok(()))
}

/// Shared drop path: a future abandoned mid-suspension gives back the
/// waiter slot and the fill-in-flight mark.
fn abandon_fill<S: AsyncInputStream>(stream: &mut Option<&mut S>, registered: bool) {
    if registered {
        if let Some(stream) = stream.as_mut() {
            stream.lifecycle().end_wait();
            stream.buffer_mut().end_fill();
        }
    }
}
