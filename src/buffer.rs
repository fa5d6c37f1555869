//! Stream-owned buffer state and the fill capability token.
//!
//! An input stream exclusively owns a [`StreamBuffer`]: the chunked byte
//! queue plus the two flags the streaming protocol needs (the single-flight
//! fill guard and the "last operation was a peek" marker).
//!
//! # Capability Gating
//!
//! Mutating the buffer from the transport side requires a [`FillPermit`], a
//! token that only this crate can construct. The provided stream operations
//! hand one to the concrete stream's fill implementation; arbitrary callers
//! cannot forge one, so the fill path cannot be driven from outside the
//! protocol. Dequeue is crate-private outright.

use crate::queue::ChunkedByteQueue;
use std::ops::Deref;

/// Unforgeable capability to append bytes to a stream's buffer.
///
/// Granted by the provided operations of
/// [`AsyncInputStream`](crate::AsyncInputStream) for the duration of one
/// fill call.
#[derive(Debug)]
pub struct FillPermit {
    _priv: (),
}

impl FillPermit {
    pub(crate) const fn grant() -> Self {
        Self { _priv: () }
    }
}

/// A view of bytes consumed from a stream buffer.
///
/// Borrowed straight out of the head chunk when the consumed range was
/// contiguous (the common case, zero copies); spliced into an owned buffer
/// when the range straddled a chunk boundary. Either way it dereferences to
/// `[u8]`.
#[derive(Debug)]
pub enum BufferView<'a> {
    /// Zero-copy view into the stream buffer's head chunk.
    Borrowed(&'a [u8]),
    /// Owned copy of a range that crossed a chunk boundary.
    Spliced(Vec<u8>),
}

impl BufferView<'_> {
    /// Returns true if this view borrows straight from the buffer.
    #[must_use]
    pub const fn is_borrowed(&self) -> bool {
        matches!(self, Self::Borrowed(_))
    }
}

impl Deref for BufferView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Borrowed(bytes) => bytes,
            Self::Spliced(bytes) => bytes,
        }
    }
}

impl AsRef<[u8]> for BufferView<'_> {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl PartialEq<[u8]> for BufferView<'_> {
    fn eq(&self, other: &[u8]) -> bool {
        **self == *other
    }
}

/// Buffer state owned by one input stream.
#[derive(Debug, Default)]
pub struct StreamBuffer {
    queue: ChunkedByteQueue,
    filling: bool,
    peeked: bool,
}

impl StreamBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered, unconsumed bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.queue.used_size()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// The longest contiguous prefix of the buffered bytes.
    ///
    /// Indistinguishable to callers from a stream that simply buffered
    /// less; peek loops must tolerate arbitrary amounts either way.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.queue.front_run()
    }

    /// Appends transport bytes to the buffer. Fill implementations call
    /// this with the permit they were handed.
    pub fn push(&mut self, _permit: &FillPermit, bytes: &[u8]) {
        self.queue.write(bytes);
    }

    /// Marks a fill in flight. A second concurrent fill on the same stream
    /// is a programming error, not a race to resolve.
    pub(crate) fn begin_fill(&mut self) {
        assert!(
            !self.filling,
            "fill started while another fill is already in flight"
        );
        self.filling = true;
    }

    pub(crate) fn end_fill(&mut self) {
        self.filling = false;
    }

    pub(crate) const fn was_peeked(&self) -> bool {
        self.peeked
    }

    pub(crate) fn set_peeked(&mut self, peeked: bool) {
        self.peeked = peeked;
    }

    /// Consumes exactly `count` bytes from the front of the buffer.
    ///
    /// The caller guarantees `count` bytes are buffered. Consuming clears
    /// the peek marker. The borrowed fast path keeps the bytes resident in
    /// their chunk for the lifetime of the view.
    pub(crate) fn take(&mut self, count: usize) -> BufferView<'_> {
        debug_assert!(count <= self.len());
        self.peeked = false;
        if count == 0 {
            return BufferView::Borrowed(&[]);
        }
        self.queue.maintain();
        if self.queue.front_run().len() >= count {
            BufferView::Borrowed(self.queue.dequeue_front(count))
        } else {
            let mut spliced = vec![0u8; count];
            let copied = self.queue.read(&mut spliced);
            debug_assert_eq!(copied, count);
            BufferView::Spliced(spliced)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::CHUNK_SIZE;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    fn permit() -> FillPermit {
        FillPermit::grant()
    }

    #[test]
    fn push_and_take_borrowed() {
        init_test("push_and_take_borrowed");
        let mut buffer = StreamBuffer::new();
        buffer.push(&permit(), b"HELLO");
        let view = buffer.take(5);
        crate::assert_with_log!(view.is_borrowed(), "borrowed", true, view.is_borrowed());
        crate::assert_with_log!(*view == *b"HELLO", "content", b"HELLO", &*view);
        drop(view);
        let empty = buffer.is_empty();
        crate::assert_with_log!(empty, "drained", true, empty);
        crate::test_complete!("push_and_take_borrowed");
    }

    #[test]
    fn take_across_chunk_boundary_splices() {
        init_test("take_across_chunk_boundary_splices");
        let mut buffer = StreamBuffer::new();
        buffer.push(&permit(), &vec![b'a'; CHUNK_SIZE - 2]);
        buffer.push(&permit(), b"bbbb");
        // Skip to just before the boundary.
        drop(buffer.take(CHUNK_SIZE - 2));
        let view = buffer.take(4);
        crate::assert_with_log!(!view.is_borrowed(), "spliced", false, view.is_borrowed());
        crate::assert_with_log!(*view == *b"bbbb", "content", b"bbbb", &*view);
        crate::test_complete!("take_across_chunk_boundary_splices");
    }

    #[test]
    fn take_zero_is_empty_view() {
        init_test("take_zero_is_empty_view");
        let mut buffer = StreamBuffer::new();
        let view = buffer.take(0);
        crate::assert_with_log!(view.is_empty(), "empty", true, view.is_empty());
        crate::test_complete!("take_zero_is_empty_view");
    }

    #[test]
    fn take_clears_peek_marker() {
        init_test("take_clears_peek_marker");
        let mut buffer = StreamBuffer::new();
        buffer.push(&permit(), b"xy");
        buffer.set_peeked(true);
        drop(buffer.take(1));
        let peeked = buffer.was_peeked();
        crate::assert_with_log!(!peeked, "peek cleared", false, peeked);
        crate::test_complete!("take_clears_peek_marker");
    }

    #[test]
    #[should_panic(expected = "another fill is already in flight")]
    fn double_fill_panics() {
        init_test("double_fill_panics");
        let mut buffer = StreamBuffer::new();
        buffer.begin_fill();
        buffer.begin_fill();
    }
}
