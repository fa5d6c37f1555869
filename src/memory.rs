//! In-memory streams over a scripted transport.
//!
//! These are the concrete reference implementations of the stream
//! contracts: a [`MemoryInputStream`] fed through a [`MemorySource`]
//! handle, a [`MemoryOutputStream`] drained through a [`MemorySink`]
//! handle, and the duplex [`MemoryStream`] combining both over one
//! lifecycle. The handles script the transport — push bytes, signal
//! end-of-stream, withhold write capacity, inject a failure — which makes
//! every protocol path reachable from a deterministic single-threaded test.

use crate::buffer::{FillPermit, StreamBuffer};
use crate::error::{Error, ErrorKind, Result};
use crate::input::AsyncInputStream;
use crate::lifecycle::Lifecycle;
use crate::output::AsyncOutputStream;
use crate::resource::AsyncResource;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::task::{Context, Poll};

#[derive(Debug, Default)]
struct Source {
    pending: VecDeque<Vec<u8>>,
    eof: bool,
    fault: bool,
    aborted: bool,
    releases: u32,
}

#[derive(Debug, Default)]
struct Sink {
    accepted: Vec<u8>,
    acked: usize,
    max_chunk: Option<usize>,
    credit: Option<usize>,
    fault: bool,
    aborted: bool,
    releases: u32,
}

impl Sink {
    fn unacked(&self) -> usize {
        self.accepted.len() - self.acked
    }
}

/// Producer-side handle of a memory input stream.
///
/// Pushing bytes or signalling end-of-stream wakes a fill suspended on the
/// stream.
#[derive(Debug, Clone)]
pub struct MemorySource {
    source: Rc<RefCell<Source>>,
    lifecycle: Lifecycle,
}

impl MemorySource {
    /// Queues a byte chunk for the stream to fill from. Empty chunks are
    /// ignored; a fill must append at least one byte.
    pub fn push(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.source.borrow_mut().pending.push_back(bytes.to_vec());
        self.lifecycle.notify();
    }

    /// Signals end-of-stream after any still-queued chunks.
    pub fn finish(&self) {
        self.source.borrow_mut().eof = true;
        self.lifecycle.notify();
    }

    /// Injects a transport failure: the next fill fails fatally.
    pub fn fail(&self) {
        self.source.borrow_mut().fault = true;
        self.lifecycle.notify();
    }

    /// Whether the stream released the transport with an error signal.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.source.borrow().aborted
    }

    /// Number of graceful releases the stream performed.
    #[must_use]
    pub fn release_count(&self) -> u32 {
        self.source.borrow().releases
    }
}

/// A buffered input stream over scripted in-memory chunks.
#[derive(Debug)]
pub struct MemoryInputStream {
    lifecycle: Lifecycle,
    buffer: StreamBuffer,
    source: Rc<RefCell<Source>>,
}

impl MemoryInputStream {
    /// Creates an open stream and the handle that feeds it.
    #[must_use]
    pub fn new() -> (Self, MemorySource) {
        let source = Rc::new(RefCell::new(Source::default()));
        let lifecycle = Lifecycle::new();
        let handle = MemorySource {
            source: Rc::clone(&source),
            lifecycle: lifecycle.clone(),
        };
        let stream = Self {
            lifecycle,
            buffer: StreamBuffer::new(),
            source,
        };
        (stream, handle)
    }

    /// Creates a stream preloaded with `bytes` followed by end-of-stream.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let (stream, handle) = Self::new();
        handle.push(bytes);
        handle.finish();
        stream
    }
}

impl AsyncResource for MemoryInputStream {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn abort(&mut self) {
        self.source.borrow_mut().aborted = true;
    }

    fn poll_shutdown(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn is_clean(&self) -> bool {
        self.buffer.is_empty() && self.source.borrow().pending.is_empty()
    }

    fn poll_release(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.source.borrow_mut().releases += 1;
        Poll::Ready(Ok(()))
    }
}

enum FillStep {
    Fault,
    Chunk(Vec<u8>),
    Eof,
    Starved,
}

impl AsyncInputStream for MemoryInputStream {
    fn buffer(&self) -> &StreamBuffer {
        &self.buffer
    }

    fn buffer_mut(&mut self) -> &mut StreamBuffer {
        &mut self.buffer
    }

    fn poll_fill(&mut self, _cx: &mut Context<'_>, permit: &FillPermit) -> Poll<Result<bool>> {
        let step = {
            let mut source = self.source.borrow_mut();
            if source.fault {
                source.fault = false;
                FillStep::Fault
            } else if let Some(chunk) = source.pending.pop_front() {
                FillStep::Chunk(chunk)
            } else if source.eof {
                FillStep::Eof
            } else {
                FillStep::Starved
            }
        };
        match step {
            FillStep::Fault => {
                self.reset();
                Poll::Ready(Err(
                    Error::new(ErrorKind::Io).with_message("injected transport failure")
                ))
            }
            FillStep::Chunk(chunk) => {
                tracing::trace!(len = chunk.len(), "fill from scripted chunk");
                self.buffer.push(permit, &chunk);
                Poll::Ready(Ok(true))
            }
            FillStep::Eof => Poll::Ready(Ok(false)),
            // The waiter is registered at the lifecycle; the source handle
            // wakes it when a chunk arrives.
            FillStep::Starved => Poll::Pending,
        }
    }
}

impl Drop for MemoryInputStream {
    fn drop(&mut self) {
        self.lifecycle.check_no_waiter_on_destroy();
        if self.is_open() {
            self.reset();
        }
    }
}

/// Consumer-side handle of a memory output stream.
///
/// Observes what the stream wrote, acknowledges it, meters write capacity,
/// and can inject a failure. Granting capacity wakes a write suspended on
/// the stream.
#[derive(Debug, Clone)]
pub struct MemorySink {
    sink: Rc<RefCell<Sink>>,
    lifecycle: Lifecycle,
}

impl MemorySink {
    /// All bytes the stream has handed to the transport so far.
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.sink.borrow().accepted.clone()
    }

    /// Bytes accepted but not yet acknowledged.
    #[must_use]
    pub fn unacked_len(&self) -> usize {
        self.sink.borrow().unacked()
    }

    /// Acknowledges everything accepted so far; returns how many bytes
    /// that covered.
    pub fn ack_all(&self) -> usize {
        let mut sink = self.sink.borrow_mut();
        let count = sink.unacked();
        sink.acked = sink.accepted.len();
        count
    }

    /// Caps how many bytes one `poll_write_some` call accepts.
    pub fn set_max_chunk(&self, max: usize) {
        self.sink.borrow_mut().max_chunk = Some(max);
    }

    /// Switches the sink to metered mode with `credit` bytes of capacity;
    /// writes suspend once it is exhausted.
    pub fn set_credit(&self, credit: usize) {
        self.sink.borrow_mut().credit = Some(credit);
    }

    /// Adds write capacity in metered mode and wakes a suspended write.
    pub fn grant(&self, credit: usize) {
        let mut sink = self.sink.borrow_mut();
        let current = sink.credit.unwrap_or(0);
        sink.credit = Some(current + credit);
        drop(sink);
        self.lifecycle.notify();
    }

    /// Injects a transport failure: the next write fails fatally.
    pub fn fail(&self) {
        self.sink.borrow_mut().fault = true;
        self.lifecycle.notify();
    }

    /// Whether the stream released the transport with an error signal.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.sink.borrow().aborted
    }

    /// Number of graceful releases the stream performed.
    #[must_use]
    pub fn release_count(&self) -> u32 {
        self.sink.borrow().releases
    }
}

/// An output stream writing into scripted in-memory storage.
#[derive(Debug)]
pub struct MemoryOutputStream {
    lifecycle: Lifecycle,
    sink: Rc<RefCell<Sink>>,
}

impl MemoryOutputStream {
    /// Creates an open stream and the handle that drains it.
    #[must_use]
    pub fn new() -> (Self, MemorySink) {
        let sink = Rc::new(RefCell::new(Sink::default()));
        let lifecycle = Lifecycle::new();
        let handle = MemorySink {
            sink: Rc::clone(&sink),
            lifecycle: lifecycle.clone(),
        };
        let stream = Self { lifecycle, sink };
        (stream, handle)
    }
}

fn sink_write(sink: &Rc<RefCell<Sink>>, buf: &[u8]) -> Poll<Result<usize>> {
    let mut sink = sink.borrow_mut();
    if sink.fault {
        sink.fault = false;
        return Poll::Ready(Err(
            Error::new(ErrorKind::Io).with_message("injected transport failure")
        ));
    }
    let mut allow = buf.len();
    if let Some(max) = sink.max_chunk {
        allow = allow.min(max);
    }
    if let Some(credit) = sink.credit.as_mut() {
        allow = allow.min(*credit);
        if allow == 0 {
            // Metered and out of capacity; grant() wakes the waiter.
            return Poll::Pending;
        }
        *credit -= allow;
    }
    sink.accepted.extend_from_slice(&buf[..allow]);
    tracing::trace!(accepted = allow, "write into scripted sink");
    Poll::Ready(Ok(allow))
}

impl AsyncResource for MemoryOutputStream {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn abort(&mut self) {
        self.sink.borrow_mut().aborted = true;
    }

    fn poll_shutdown(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn is_clean(&self) -> bool {
        self.sink.borrow().unacked() == 0
    }

    fn poll_release(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.sink.borrow_mut().releases += 1;
        Poll::Ready(Ok(()))
    }
}

impl AsyncOutputStream for MemoryOutputStream {
    fn poll_write_some(&mut self, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize>> {
        match sink_write(&self.sink, buf) {
            Poll::Ready(Err(err)) => {
                self.reset();
                Poll::Ready(Err(err))
            }
            other => other,
        }
    }
}

impl Drop for MemoryOutputStream {
    fn drop(&mut self) {
        self.lifecycle.check_no_waiter_on_destroy();
        if self.is_open() {
            self.reset();
        }
    }
}

/// A duplex in-memory stream: one lifecycle over both directions.
///
/// A close or reset terminates reading and writing together; close is
/// clean only when the buffer is drained and every write is acknowledged.
#[derive(Debug)]
pub struct MemoryStream {
    lifecycle: Lifecycle,
    buffer: StreamBuffer,
    source: Rc<RefCell<Source>>,
    sink: Rc<RefCell<Sink>>,
}

impl MemoryStream {
    /// Creates an open duplex stream and both transport handles.
    #[must_use]
    pub fn new() -> (Self, MemorySource, MemorySink) {
        let source = Rc::new(RefCell::new(Source::default()));
        let sink = Rc::new(RefCell::new(Sink::default()));
        let lifecycle = Lifecycle::new();
        let source_handle = MemorySource {
            source: Rc::clone(&source),
            lifecycle: lifecycle.clone(),
        };
        let sink_handle = MemorySink {
            sink: Rc::clone(&sink),
            lifecycle: lifecycle.clone(),
        };
        let stream = Self {
            lifecycle,
            buffer: StreamBuffer::new(),
            source,
            sink,
        };
        (stream, source_handle, sink_handle)
    }
}

impl AsyncResource for MemoryStream {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn abort(&mut self) {
        self.source.borrow_mut().aborted = true;
        self.sink.borrow_mut().aborted = true;
    }

    fn poll_shutdown(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn is_clean(&self) -> bool {
        self.buffer.is_empty()
            && self.source.borrow().pending.is_empty()
            && self.sink.borrow().unacked() == 0
    }

    fn poll_release(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.source.borrow_mut().releases += 1;
        Poll::Ready(Ok(()))
    }
}

impl AsyncInputStream for MemoryStream {
    fn buffer(&self) -> &StreamBuffer {
        &self.buffer
    }

    fn buffer_mut(&mut self) -> &mut StreamBuffer {
        &mut self.buffer
    }

    fn poll_fill(&mut self, _cx: &mut Context<'_>, permit: &FillPermit) -> Poll<Result<bool>> {
        let step = {
            let mut source = self.source.borrow_mut();
            if source.fault {
                source.fault = false;
                FillStep::Fault
            } else if let Some(chunk) = source.pending.pop_front() {
                FillStep::Chunk(chunk)
            } else if source.eof {
                FillStep::Eof
            } else {
                FillStep::Starved
            }
        };
        match step {
            FillStep::Fault => {
                self.reset();
                Poll::Ready(Err(
                    Error::new(ErrorKind::Io).with_message("injected transport failure")
                ))
            }
            FillStep::Chunk(chunk) => {
                self.buffer.push(permit, &chunk);
                Poll::Ready(Ok(true))
            }
            FillStep::Eof => Poll::Ready(Ok(false)),
            FillStep::Starved => Poll::Pending,
        }
    }
}

impl AsyncOutputStream for MemoryStream {
    fn poll_write_some(&mut self, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize>> {
        match sink_write(&self.sink, buf) {
            Poll::Ready(Err(err)) => {
                self.reset();
                Poll::Ready(Err(err))
            }
            other => other,
        }
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        self.lifecycle.check_no_waiter_on_destroy();
        if self.is_open() {
            self.reset();
        }
    }
}
