//! The async resource lifecycle contract.
//!
//! Every cancellable async resource (a socket, a file, a response body)
//! implements [`AsyncResource`]: four transport hooks plus a shared
//! [`Lifecycle`] cell. The protocol-level operations — `is_open`, `reset`,
//! `close` — are provided on top of the hooks and are the same for every
//! resource.
//!
//! # The Two Termination Paths
//!
//! **Reset** is the path for unrecoverable errors, cancellation, and
//! destruction. It never suspends and never fails: it wakes any suspended
//! waiter with a cancellation failure, marks the resource terminally, and
//! releases the transport synchronously. That is what makes it legal to
//! call from destructors and error unwinding, where waiting is not an
//! option.
//!
//! **Close** is the graceful path and the only one a caller can await. It
//! drives the transport shutdown to completion (suspending as needed),
//! verifies the transport reached its clean state, and releases it. If the
//! transport cannot come clean, close falls back to the reset path and
//! reports [`Busy`](crate::ErrorKind::Busy).
//!
//! # Cancel Safety
//!
//! - `reset` completes synchronously in every context; there is no
//!   suspension point to cancel.
//! - `close` may suspend in the shutdown and release hooks. Dropping the
//!   `Close` future mid-flight leaves the resource in `Closing`; the
//!   destructor path does not apply (the resource is no longer open) and
//!   the transport is released by `abort` when the owner drops it.

use crate::error::{Error, ErrorKind, Result};
use crate::lifecycle::Lifecycle;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// The lifecycle contract all cancellable async resources implement.
///
/// Implementations provide the four transport hooks and store a
/// [`Lifecycle`] cell; the protocol operations are provided. A concrete
/// resource's `Drop` implementation should perform `if self.is_open() {
/// self.reset(); }` — never close, since a destructor must not suspend or
/// fail.
pub trait AsyncResource {
    /// The shared lifecycle cell of this resource.
    fn lifecycle(&self) -> &Lifecycle;

    /// Synchronously and unconditionally releases the underlying transport,
    /// signalling an error condition to whatever producer was feeding it so
    /// it does not wait forever.
    ///
    /// Must never suspend and must tolerate being called after the
    /// transport is already released.
    fn abort(&mut self);

    /// Requests shutdown of the underlying transport. May suspend. Once the
    /// transport reports a clean state it must stay clean.
    fn poll_shutdown(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>>;

    /// Whether the transport is in its clean state (resource-specific:
    /// e.g. no unacknowledged writes and no unread data).
    fn is_clean(&self) -> bool;

    /// Releases the underlying transport gracefully. May suspend.
    fn poll_release(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>>;

    /// Returns true iff the resource has not yet undergone close or reset.
    ///
    /// No side effects, never suspends.
    fn is_open(&self) -> bool {
        self.lifecycle().is_open()
    }

    /// Tears the resource down immediately.
    ///
    /// Marks the resource terminally reset and releases the transport.
    /// Never suspends; always completes synchronously.
    ///
    /// # Panics
    ///
    /// Panics if the resource is not open.
    fn reset(&mut self) {
        assert!(self.is_open(), "reset on a resource that is not open");
        tracing::debug!("resource reset");
        self.lifecycle().mark_reset();
        self.abort();
    }

    /// Closes the resource gracefully.
    ///
    /// Resolves `Ok(())` once the transport shut down clean and was
    /// released. Resolves `Err(Busy)` — after forcibly resetting the
    /// resource — if the transport could not reach a clean state. Resolves
    /// `Err(NotOpen)`, with no side effects, if the resource already left
    /// the open state; this is what makes an accidental second close safe
    /// instead of a double release.
    fn close(&mut self) -> Close<'_, Self>
    where
        Self: Sized,
    {
        Close {
            resource: self,
            phase: ClosePhase::Start,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClosePhase {
    Start,
    Shutdown,
    Release,
    Done,
}

/// Future returned by [`AsyncResource::close`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Close<'a, R: ?Sized> {
    resource: &'a mut R,
    phase: ClosePhase,
}

impl<R: AsyncResource + ?Sized> Future for Close<'_, R> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match this.phase {
                ClosePhase::Start => {
                    if !this.resource.is_open() {
                        this.phase = ClosePhase::Done;
                        return Poll::Ready(Err(Error::new(ErrorKind::NotOpen)
                            .with_message("close on a resource that is not open")));
                    }
                    // Asserts no task is waiting; from here on any new wait
                    // attempt is a checked programming error.
                    this.resource.lifecycle().begin_closing();
                    this.phase = ClosePhase::Shutdown;
                }
                ClosePhase::Shutdown => {
                    match this.resource.poll_shutdown(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(err)) => {
                            this.phase = ClosePhase::Done;
                            return Poll::Ready(Err(this.fail(err)));
                        }
                        Poll::Ready(Ok(())) => {}
                    }
                    if this.resource.is_clean() {
                        this.phase = ClosePhase::Release;
                    } else {
                        this.phase = ClosePhase::Done;
                        let err = Error::new(ErrorKind::Busy)
                            .with_message("transport did not reach a clean state");
                        return Poll::Ready(Err(this.fail(err)));
                    }
                }
                ClosePhase::Release => match this.resource.poll_release(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(err)) => {
                        this.phase = ClosePhase::Done;
                        return Poll::Ready(Err(this.fail(err)));
                    }
                    Poll::Ready(Ok(())) => {
                        this.phase = ClosePhase::Done;
                        this.resource.lifecycle().finish_closed();
                        tracing::debug!("resource closed clean");
                        return Poll::Ready(Ok(()));
                    }
                },
                ClosePhase::Done => panic!("Close polled after completion"),
            }
        }
    }
}

impl<R: AsyncResource + ?Sized> Close<'_, R> {
    /// Failed-close fallback: land in `Reset` with the transport released
    /// before the error surfaces.
    fn fail(&mut self, err: Error) -> Error {
        tracing::debug!(error = %err, "close failed, resetting");
        self.resource.lifecycle().mark_reset();
        self.resource.abort();
        err
    }
}
