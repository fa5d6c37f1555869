//! Chunked FIFO byte queue.
//!
//! [`ChunkedByteQueue`] is the storage engine behind buffered input streams:
//! an unbounded byte FIFO built from independently allocated fixed-size
//! chunks. Growth only ever appends a chunk and shrinkage only ever frees a
//! fully-consumed chunk from the front, so bytes never move once written.
//! That is the property that keeps views into the buffer stable while a
//! stream suspends and resumes around them.
//!
//! # Offsets
//!
//! `read_offset` and `write_offset` index a virtual byte space spanning the
//! live chunk sequence. Cleanup frees head chunks that are fully behind the
//! read offset and rebases both offsets by a whole number of chunk sizes.
//! After every public operation `read_offset <= CHUNK_SIZE` holds; the
//! search routine relies on this and asserts it rather than assuming it.
//!
//! # Complexity
//!
//! Writing then draining N bytes costs amortized O(1) per byte, performs
//! exactly ⌈N / CHUNK_SIZE⌉ chunk allocations, and leaves at most one chunk
//! of slack once fully drained.

use crate::error::{Error, ErrorKind, Result};
use std::collections::VecDeque;

/// Size of each independently allocated chunk.
pub const CHUNK_SIZE: usize = 4096;

/// Unbounded FIFO byte buffer over fixed-size chunks.
#[derive(Debug, Default)]
pub struct ChunkedByteQueue {
    chunks: VecDeque<Box<[u8]>>,
    read_offset: usize,
    write_offset: usize,
    allocated: usize,
}

impl ChunkedByteQueue {
    /// Creates an empty queue. No chunks are allocated until the first write.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unconsumed bytes currently in the queue.
    #[must_use]
    pub const fn used_size(&self) -> usize {
        self.write_offset - self.read_offset
    }

    /// Returns true if no unconsumed bytes remain.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.used_size() == 0
    }

    /// Number of live chunks. Live memory is `chunk_count() * CHUNK_SIZE`
    /// regardless of how many bytes have ever passed through the queue.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Appends all of `data`, allocating tail chunks as needed.
    ///
    /// Returns the number of bytes written, which is always `data.len()`.
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.cleanup();
        let mut remaining = data;
        while !remaining.is_empty() {
            if self.write_offset == self.chunks.len() * CHUNK_SIZE {
                self.chunks.push_back(vec![0u8; CHUNK_SIZE].into_boxed_slice());
                self.allocated += 1;
            }
            let chunk = self.write_offset / CHUNK_SIZE;
            let offset = self.write_offset % CHUNK_SIZE;
            let n = remaining.len().min(CHUNK_SIZE - offset);
            self.chunks[chunk][offset..offset + n].copy_from_slice(&remaining[..n]);
            self.write_offset += n;
            remaining = &remaining[n..];
        }
        data.len()
    }

    /// Copies bytes from the front of the queue into `dest`.
    ///
    /// Stops when either `dest` or the queue is exhausted; returns the
    /// number of bytes copied. Fully-consumed head chunks are freed and the
    /// offsets rebased before this returns.
    pub fn read(&mut self, dest: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < dest.len() && !self.is_empty() {
            let n = {
                let run = self.front_run();
                let n = run.len().min(dest.len() - copied);
                dest[copied..copied + n].copy_from_slice(&run[..n]);
                n
            };
            self.read_offset += n;
            copied += n;
            self.cleanup();
        }
        copied
    }

    /// Advances the read offset by `count` bytes without copying.
    ///
    /// Fails with [`ErrorKind::OutOfData`] if `count` exceeds
    /// [`used_size`](Self::used_size), in which case nothing is discarded.
    pub fn discard(&mut self, count: usize) -> Result<()> {
        if count > self.used_size() {
            return Err(Error::new(ErrorKind::OutOfData)
                .with_message(format!("discard of {count} bytes, {} buffered", self.used_size())));
        }
        let mut remaining = count;
        while remaining > 0 {
            let n = self.front_run().len().min(remaining);
            self.read_offset += n;
            remaining -= n;
            self.cleanup();
        }
        Ok(())
    }

    /// Searches the live bytes for `needle`, treating the chunk sequence as
    /// one logical byte string.
    ///
    /// The unused head of the first chunk and unused tail of the last chunk
    /// are excluded, and a match spanning a chunk boundary is still found.
    /// Returns the offset from the current read position, or `None`.
    #[must_use]
    pub fn offset_of(&self, needle: &[u8]) -> Option<usize> {
        // Cleanup keeps the read offset within the first chunk; the
        // byte_at indexing below is wrong without this.
        debug_assert!(
            self.read_offset <= CHUNK_SIZE,
            "read offset {} has outrun chunk cleanup",
            self.read_offset
        );
        let used = self.used_size();
        if needle.is_empty() {
            return Some(0);
        }
        if needle.len() > used {
            return None;
        }
        'candidate: for start in 0..=(used - needle.len()) {
            for (i, &b) in needle.iter().enumerate() {
                if self.byte_at(start + i) != b {
                    continue 'candidate;
                }
            }
            return Some(start);
        }
        None
    }

    /// Byte at `logical` positions past the read offset.
    fn byte_at(&self, logical: usize) -> u8 {
        debug_assert!(logical < self.used_size());
        let virtual_offset = self.read_offset + logical;
        self.chunks[virtual_offset / CHUNK_SIZE][virtual_offset % CHUNK_SIZE]
    }

    /// The contiguous run of unconsumed bytes at the front of the queue.
    ///
    /// Empty only when the queue is empty or the head chunk is exactly
    /// consumed but not yet cleaned up.
    pub(crate) fn front_run(&self) -> &[u8] {
        if self.is_empty() {
            return &[];
        }
        let chunk = self.read_offset / CHUNK_SIZE;
        let start = self.read_offset % CHUNK_SIZE;
        let end = (self.write_offset - chunk * CHUNK_SIZE).min(CHUNK_SIZE);
        &self.chunks[chunk][start..end]
    }

    /// Consumes `count` bytes from the front run and returns them.
    ///
    /// The bytes stay resident — the head chunk is not freed even if this
    /// consumes it entirely — so the returned view is backed by stable
    /// memory for as long as the borrow lives. Cleanup of the consumed
    /// chunk happens on the next queue operation.
    ///
    /// Panics if `count` exceeds the front run; callers splice across
    /// chunks themselves when they need more.
    pub(crate) fn dequeue_front(&mut self, count: usize) -> &[u8] {
        self.cleanup();
        if count == 0 {
            return &[];
        }
        let start = self.read_offset;
        let available = self.front_run().len();
        assert!(
            count <= available,
            "dequeue of {count} bytes from a {available}-byte front run"
        );
        self.read_offset += count;
        &self.chunks[0][start..start + count]
    }

    /// Runs any deferred head-chunk cleanup so the front run is maximal.
    pub(crate) fn maintain(&mut self) {
        self.cleanup();
    }

    /// Frees head chunks fully behind the read offset and rebases offsets.
    fn cleanup(&mut self) {
        while self.read_offset >= CHUNK_SIZE {
            self.chunks.pop_front();
            self.read_offset -= CHUNK_SIZE;
            self.write_offset -= CHUNK_SIZE;
        }
        debug_assert!(self.read_offset <= self.write_offset);
    }
}
