//! Shared lifecycle cell for async resources.
//!
//! Every resource owns a [`Lifecycle`]: a small shared cell holding the
//! tri-state lifecycle flag (open, closing, or terminally closed/reset) and
//! the single waiter slot. The cell is a cheap-to-clone handle so that a
//! logical actor other than the one suspended on the resource can request
//! cancellation between suspension points — the only cancellation path in
//! this protocol.
//!
//! # Single-Threaded by Construction
//!
//! The protocol is cooperative and single-threaded; the cell uses
//! `Rc<RefCell<..>>` and is deliberately `!Send`. There is no parallel
//! mutation to defend against, only interleaving at suspension points.
//!
//! # Checked Contract Violations
//!
//! - Registering a waiter on a resource that is not open panics.
//! - Registering a second waiter while one is in flight panics (single-flight).
//! - Dropping the last handle while a waiter is still registered panics.

use std::cell::RefCell;
use std::rc::Rc;
use std::task::Waker;

/// Lifecycle states of an async resource.
///
/// The state moves strictly forward: `Open` → `Closing` → `Closed` on the
/// graceful path, or `Open`/`Closing` → `Reset` on the error/cancel path.
/// No transition ever returns to `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// The resource is usable; operations may suspend on it.
    Open,
    /// A close is in progress; new waits are checked programming errors.
    Closing,
    /// The resource closed cleanly.
    Closed,
    /// The resource was reset by an error, cancellation, or destruction.
    Reset,
}

#[derive(Debug)]
struct Inner {
    state: LifecycleState,
    waiter: Option<Waker>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Skipped during unwinding so a contract panic cannot escalate into
        // a double panic while locals are being torn down.
        if !std::thread::panicking() {
            assert!(
                self.waiter.is_none(),
                "async resource destroyed while a task is waiting on it"
            );
        }
    }
}

/// Shared lifecycle state of one async resource.
///
/// Clones refer to the same underlying cell. The resource itself holds one
/// handle; supervising code may hold another to observe the state or request
/// cancellation via [`cancel`](Lifecycle::cancel).
#[derive(Debug, Clone)]
pub struct Lifecycle {
    inner: Rc<RefCell<Inner>>,
}

impl Lifecycle {
    /// Creates a lifecycle cell in the `Open` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: LifecycleState::Open,
                waiter: None,
            })),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.inner.borrow().state
    }

    /// Returns true iff the resource has not yet undergone close or reset.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == LifecycleState::Open
    }

    /// Returns true if a task is currently suspended on the resource.
    #[must_use]
    pub fn has_waiter(&self) -> bool {
        self.inner.borrow().waiter.is_some()
    }

    /// Requests cancellation from outside the suspended operation.
    ///
    /// Marks the resource `Reset` and wakes the registered waiter, which
    /// will observe the state on its next poll and resolve with a
    /// [`Cancelled`](crate::ErrorKind::Cancelled) failure after releasing
    /// the transport. No-op if the resource already left `Open`.
    ///
    /// Never suspends. Resources usually reach `Reset` through
    /// [`AsyncResource::reset`](crate::AsyncResource::reset) instead, which
    /// also releases the transport synchronously.
    pub fn cancel(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.state != LifecycleState::Open {
            tracing::trace!(state = ?inner.state, "cancel on non-open resource ignored");
            return;
        }
        inner.state = LifecycleState::Reset;
        let waiter = inner.waiter.take();
        drop(inner);
        tracing::debug!(had_waiter = waiter.is_some(), "lifecycle reset requested");
        if let Some(waker) = waiter {
            waker.wake();
        }
    }

    /// Registers the single waiter slot.
    ///
    /// Panics if the resource is not open or a waiter is already registered;
    /// both indicate a bug in the caller, not a recoverable condition.
    pub(crate) fn begin_wait(&self, waker: &Waker) {
        let mut inner = self.inner.borrow_mut();
        assert!(
            inner.state == LifecycleState::Open,
            "waiting on a resource that is not open"
        );
        assert!(
            inner.waiter.is_none(),
            "a task is already suspended on this resource"
        );
        inner.waiter = Some(waker.clone());
    }

    /// Refreshes the waiter's waker on re-poll.
    pub(crate) fn update_wait(&self, waker: &Waker) {
        let mut inner = self.inner.borrow_mut();
        if let Some(slot) = inner.waiter.as_mut() {
            slot.clone_from(waker);
        }
    }

    /// Clears the waiter slot; the waiting future calls this when it
    /// resolves or is dropped.
    pub(crate) fn end_wait(&self) {
        self.inner.borrow_mut().waiter = None;
    }

    /// Destructor-side contract check: a resource must not be destroyed
    /// while a task waits on it. Called by concrete resources at the top of
    /// `Drop`, before the reset path drains the slot. Skipped during
    /// unwinding so a contract panic cannot escalate into a double panic.
    pub(crate) fn check_no_waiter_on_destroy(&self) {
        if !std::thread::panicking() {
            assert!(
                self.inner.borrow().waiter.is_none(),
                "async resource destroyed while a task is waiting on it"
            );
        }
    }

    /// Wakes the registered waiter, if any, leaving it registered and the
    /// state unchanged. Transport handles call this when progress became
    /// possible.
    pub(crate) fn notify(&self) {
        if let Some(waker) = self.inner.borrow().waiter.as_ref() {
            waker.wake_by_ref();
        }
    }

    /// Marks the resource `Reset`, draining and waking any registered
    /// waiter.
    ///
    /// Used by the owner-driven reset and the failed-close path. A fill
    /// implementation may reset from inside the suspended operation itself;
    /// the self-wake is harmless and the drained slot keeps the destructor
    /// contract satisfied.
    pub(crate) fn mark_reset(&self) {
        let mut inner = self.inner.borrow_mut();
        tracing::debug!(from = ?inner.state, "lifecycle -> Reset");
        inner.state = LifecycleState::Reset;
        let waiter = inner.waiter.take();
        drop(inner);
        if let Some(waker) = waiter {
            waker.wake();
        }
    }

    /// Transitions `Open` → `Closing`. Asserts no waiter is registered.
    pub(crate) fn begin_closing(&self) {
        let mut inner = self.inner.borrow_mut();
        assert!(
            inner.waiter.is_none(),
            "close started while a task is waiting on this resource"
        );
        debug_assert_eq!(inner.state, LifecycleState::Open);
        tracing::trace!("lifecycle -> Closing");
        inner.state = LifecycleState::Closing;
    }

    /// Transitions `Closing` → `Closed`.
    pub(crate) fn finish_closed(&self) {
        let mut inner = self.inner.borrow_mut();
        debug_assert_eq!(inner.state, LifecycleState::Closing);
        tracing::trace!("lifecycle -> Closed");
        inner.state = LifecycleState::Closed;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
