//! The async output stream contract.
//!
//! An [`AsyncOutputStream`] is an [`AsyncResource`] with one required
//! operation: `poll_write_some`, which hands zero or more bytes to the
//! transport. The composed `write_all` / `write_all_vectored` operations
//! are protocol-level loops over it, suspending between partial writes.
//! Output streams carry no buffer of their own; they are purely a protocol
//! over the underlying transport.
//!
//! # Cancel Safety
//!
//! - `write_all` registers the lifecycle waiter while suspended; a reset
//!   wakes it and it resolves `Cancelled` after releasing the transport.
//!   Bytes already accepted by the transport stay accepted.
//! - Dropping a write future mid-suspension deregisters the waiter; how
//!   many bytes were accepted is then unknown to the caller.

use crate::error::{Error, ErrorKind, Result};
use crate::lifecycle::LifecycleState;
use crate::resource::AsyncResource;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// The output stream contract.
pub trait AsyncOutputStream: AsyncResource {
    /// Hands bytes to the transport, accepting zero or more of them.
    ///
    /// Returns the number of bytes accepted; returns `Poll::Pending` when
    /// the transport cannot accept any right now. A transport write
    /// failure is fatal: the implementation must
    /// [`reset`](AsyncResource::reset) the stream before returning `Err`.
    fn poll_write_some(&mut self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize>>;

    /// Writes all of `buf`, suspending between partial writes as needed.
    fn write_all<'a>(&'a mut self, buf: &'a [u8]) -> WriteAll<'a, Self>
    where
        Self: Sized,
    {
        WriteAll {
            stream: Some(self),
            buf,
            written: 0,
            registered: false,
        }
    }

    /// Writes every byte range in `bufs`, in order, suspending between
    /// partial writes as needed. Empty ranges are skipped.
    fn write_all_vectored<'a>(&'a mut self, bufs: &'a [&'a [u8]]) -> WriteAllVectored<'a, Self>
    where
        Self: Sized,
    {
        WriteAllVectored {
            stream: Some(self),
            bufs,
            index: 0,
            offset: 0,
            registered: false,
        }
    }
}

/// One write step with waiter registration and cancellation handling.
fn poll_write_step<S: AsyncOutputStream + ?Sized>(
    stream: &mut S,
    cx: &mut Context<'_>,
    buf: &[u8],
    registered: &mut bool,
) -> Poll<Result<usize>> {
    match stream.lifecycle().state() {
        LifecycleState::Open => {}
        LifecycleState::Reset if *registered => {
            *registered = false;
            stream.lifecycle().end_wait();
            stream.abort();
            tracing::debug!("write cancelled by reset");
            return Poll::Ready(Err(
                Error::new(ErrorKind::Cancelled).with_message("stream reset while writing")
            ));
        }
        _ => panic!("waiting on a resource that is not open"),
    }

    if *registered {
        stream.lifecycle().update_wait(cx.waker());
    } else {
        stream.lifecycle().begin_wait(cx.waker());
        *registered = true;
    }

    match stream.poll_write_some(cx, buf) {
        Poll::Pending => Poll::Pending,
        Poll::Ready(result) => {
            *registered = false;
            stream.lifecycle().end_wait();
            Poll::Ready(result)
        }
    }
}

/// A transport that accepts zero bytes while claiming readiness cannot
/// make progress; surface that instead of spinning.
fn write_zero_error() -> Error {
    Error::new(ErrorKind::Io).with_message("transport accepted zero bytes")
}

/// Future returned by [`AsyncOutputStream::write_all`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct WriteAll<'a, S: AsyncOutputStream> {
    stream: Option<&'a mut S>,
    buf: &'a [u8],
    written: usize,
    registered: bool,
}

impl<S: AsyncOutputStream> Future for WriteAll<'_, S> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let stream = this.stream.as_mut().expect("future polled after completion");
        while this.written < this.buf.len() {
            let remaining = &this.buf[this.written..];
            let accepted =
                match ready!(poll_write_step(*stream, cx, remaining, &mut this.registered)) {
                    Ok(n) => n,
                    Err(err) => {
                        this.stream = None;
                        return Poll::Ready(Err(err));
                    }
                };
            if accepted == 0 {
                this.stream = None;
                return Poll::Ready(Err(write_zero_error()));
            }
            this.written += accepted;
        }
        this.stream = None;
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncOutputStream> Drop for WriteAll<'_, S> {
    fn drop(&mut self) {
        abandon_write(&mut self.stream, self.registered);
    }
}

/// Future returned by [`AsyncOutputStream::write_all_vectored`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct WriteAllVectored<'a, S: AsyncOutputStream> {
    stream: Option<&'a mut S>,
    bufs: &'a [&'a [u8]],
    index: usize,
    offset: usize,
    registered: bool,
}

impl<S: AsyncOutputStream> Future for WriteAllVectored<'_, S> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let stream = this.stream.as_mut().expect("future polled after completion");
        while this.index < this.bufs.len() {
            let current = this.bufs[this.index];
            if this.offset == current.len() {
                this.index += 1;
                this.offset = 0;
                continue;
            }
            let remaining = &current[this.offset..];
            let accepted =
                match ready!(poll_write_step(*stream, cx, remaining, &mut this.registered)) {
                    Ok(n) => n,
                    Err(err) => {
                        this.stream = None;
                        return Poll::Ready(Err(err));
                    }
                };
            if accepted == 0 {
                this.stream = None;
                return Poll::Ready(Err(write_zero_error()));
            }
            this.offset += accepted;
        }
        this.stream = None;
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncOutputStream> Drop for WriteAllVectored<'_, S> {
    fn drop(&mut self) {
        abandon_write(&mut self.stream, self.registered);
    }
}

/// Shared drop path: a write future abandoned mid-suspension gives back
/// the waiter slot.
fn abandon_write<S: AsyncOutputStream>(stream: &mut Option<&mut S>, registered: bool) {
    if registered {
        if let Some(stream) = stream.as_mut() {
            stream.lifecycle().end_wait();
        }
    }
}
