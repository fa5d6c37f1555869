//! Fixed-capacity seekable byte buffer.
//!
//! A [`BoundedBuffer`] wraps a caller-supplied contiguous byte region
//! (owned `Vec`, boxed slice, or borrowed slice) behind a cursor. It is the
//! random-access counterpart to the unbounded
//! [`ChunkedByteQueue`](crate::ChunkedByteQueue): capacity is fixed at
//! construction and the storage never reallocates, so reads and writes past
//! the end are truncated rather than grown.

use crate::error::{Error, ErrorKind, Result};
use std::io::SeekFrom;

/// A fixed-capacity, seekable byte buffer over caller-supplied storage.
///
/// The cursor always satisfies `0 <= cursor <= capacity`. A buffer
/// constructed with [`read_only`](BoundedBuffer::read_only) rejects writes
/// at runtime; writing also requires the storage to be mutable
/// (`T: AsMut<[u8]>`).
#[derive(Debug)]
pub struct BoundedBuffer<T> {
    storage: T,
    cursor: usize,
    read_only: bool,
}

impl<T: AsRef<[u8]>> BoundedBuffer<T> {
    /// Creates a read-write buffer over `storage`, cursor at zero.
    pub fn new(storage: T) -> Self {
        Self {
            storage,
            cursor: 0,
            read_only: false,
        }
    }

    /// Creates a read-only buffer over `storage`, cursor at zero.
    pub fn read_only(storage: T) -> Self {
        Self {
            storage,
            cursor: 0,
            read_only: true,
        }
    }

    /// Total capacity in bytes. Fixed for the life of the buffer.
    pub fn capacity(&self) -> usize {
        self.storage.as_ref().len()
    }

    /// Current cursor position.
    pub fn position(&self) -> u64 {
        self.cursor as u64
    }

    /// Bytes between the cursor and the end of the storage.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.cursor
    }

    /// Whether writes are rejected.
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Shared access to the full underlying storage.
    pub fn get_ref(&self) -> &[u8] {
        self.storage.as_ref()
    }

    /// Consumes the buffer, returning the storage.
    pub fn into_inner(self) -> T {
        self.storage
    }

    /// Moves the cursor.
    ///
    /// Targets past the end are clamped to the capacity; targets before the
    /// start fail with [`OutOfData`](ErrorKind::OutOfData). Returns the new
    /// position.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let capacity = self.capacity() as i128;
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => self.cursor as i128 + i128::from(delta),
            SeekFrom::End(delta) => capacity + i128::from(delta),
        };
        if target < 0 {
            return Err(Error::new(ErrorKind::OutOfData)
                .with_message("seek before the start of the buffer"));
        }
        self.cursor = usize::try_from(target.min(capacity)).unwrap_or(usize::MAX);
        tracing::trace!(cursor = self.cursor, "bounded buffer seek");
        Ok(self.cursor as u64)
    }

    /// Copies up to `dest.len()` bytes out at the cursor, advancing it.
    ///
    /// Returns the number of bytes copied; zero means the cursor is at the
    /// end.
    pub fn read_some(&mut self, dest: &mut [u8]) -> usize {
        let count = dest.len().min(self.remaining());
        let source = &self.storage.as_ref()[self.cursor..self.cursor + count];
        dest[..count].copy_from_slice(source);
        self.cursor += count;
        count
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> BoundedBuffer<T> {
    /// Copies up to `remaining()` bytes in at the cursor, advancing it.
    ///
    /// Returns the number of bytes accepted; zero means the buffer is full.
    /// Fails with [`ReadOnly`](ErrorKind::ReadOnly) on a read-only buffer,
    /// with the cursor untouched.
    pub fn write_some(&mut self, data: &[u8]) -> Result<usize> {
        if self.read_only {
            return Err(Error::new(ErrorKind::ReadOnly)
                .with_message("write into a read-only buffer"));
        }
        let count = data.len().min(self.remaining());
        let dest = &mut self.storage.as_mut()[self.cursor..self.cursor + count];
        dest.copy_from_slice(&data[..count]);
        self.cursor += count;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn write_then_seek_then_read_back() {
        init_test("write_then_seek_then_read_back");
        let mut buffer = BoundedBuffer::new(vec![0u8; 8]);
        let accepted = buffer.write_some(b"HELLO").unwrap();
        crate::assert_with_log!(accepted == 5, "accepted", 5, accepted);
        buffer.seek(SeekFrom::Start(0)).unwrap();
        let mut dest = [0u8; 5];
        let copied = buffer.read_some(&mut dest);
        crate::assert_with_log!(copied == 5, "copied", 5, copied);
        crate::assert_with_log!(&dest == b"HELLO", "content", b"HELLO", &dest);
        crate::test_complete!("write_then_seek_then_read_back");
    }

    #[test]
    fn writes_truncate_at_capacity() {
        init_test("writes_truncate_at_capacity");
        let mut buffer = BoundedBuffer::new([0u8; 4]);
        let accepted = buffer.write_some(b"abcdef").unwrap();
        crate::assert_with_log!(accepted == 4, "accepted", 4, accepted);
        let more = buffer.write_some(b"gh").unwrap();
        crate::assert_with_log!(more == 0, "full", 0, more);
        crate::assert_with_log!(buffer.get_ref() == b"abcd", "content", b"abcd", buffer.get_ref());
        crate::test_complete!("writes_truncate_at_capacity");
    }

    #[test]
    fn read_only_rejects_writes() {
        init_test("read_only_rejects_writes");
        let backing = *b"fixed";
        let mut buffer = BoundedBuffer::read_only(backing);
        let err = buffer.write_some(b"x").unwrap_err();
        crate::assert_with_log!(
            err.kind() == ErrorKind::ReadOnly,
            "kind",
            ErrorKind::ReadOnly,
            err.kind()
        );
        let pos = buffer.position();
        crate::assert_with_log!(pos == 0, "cursor untouched", 0u64, pos);
        crate::test_complete!("read_only_rejects_writes");
    }

    #[test]
    fn seek_clamps_to_capacity() {
        init_test("seek_clamps_to_capacity");
        let mut buffer = BoundedBuffer::read_only(*b"0123456789");
        let pos = buffer.seek(SeekFrom::Start(1000)).unwrap();
        crate::assert_with_log!(pos == 10, "clamped", 10u64, pos);
        let back = buffer.seek(SeekFrom::End(-4)).unwrap();
        crate::assert_with_log!(back == 6, "from end", 6u64, back);
        let mut dest = [0u8; 16];
        let copied = buffer.read_some(&mut dest);
        crate::assert_with_log!(copied == 4, "tail", 4, copied);
        crate::assert_with_log!(&dest[..4] == b"6789", "content", b"6789", &dest[..4]);
        crate::test_complete!("seek_clamps_to_capacity");
    }

    #[test]
    fn seek_before_start_fails() {
        init_test("seek_before_start_fails");
        let mut buffer = BoundedBuffer::read_only(*b"abc");
        let err = buffer.seek(SeekFrom::Current(-1)).unwrap_err();
        crate::assert_with_log!(
            err.kind() == ErrorKind::OutOfData,
            "kind",
            ErrorKind::OutOfData,
            err.kind()
        );
        let pos = buffer.position();
        crate::assert_with_log!(pos == 0, "cursor untouched", 0u64, pos);
        crate::test_complete!("seek_before_start_fails");
    }

    #[test]
    fn borrowed_slice_storage() {
        init_test("borrowed_slice_storage");
        let mut backing = [0u8; 6];
        {
            let mut buffer = BoundedBuffer::new(&mut backing[..]);
            buffer.write_some(b"abc").unwrap();
            buffer.seek(SeekFrom::Current(1)).unwrap();
            buffer.write_some(b"zz").unwrap();
        }
        crate::assert_with_log!(&backing == b"abc\0zz", "content", b"abc\0zz", &backing);
        crate::test_complete!("borrowed_slice_storage");
    }
}
