//! End-to-end stream scenarios over the in-memory transports.

use bytestream::test_utils::{block_on, init_test_logging, noop_waker};
use bytestream::{
    AsyncInputStream, AsyncOutputStream, AsyncResource, ErrorKind, LifecycleState,
    MemoryInputStream, MemoryStream, CHUNK_SIZE,
};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

fn init_test(name: &str) {
    init_test_logging();
    bytestream::test_phase!(name);
}

/// A consumer reads a greeting to the end: data, then EOF as a value, then
/// EOF as a failure once more data is demanded anyway.
#[test]
fn greeting_read_to_exhaustion() {
    init_test("greeting_read_to_exhaustion");
    let mut stream = MemoryInputStream::from_bytes(b"HELLO");

    bytestream::test_section!("read the greeting");
    let view = block_on(stream.read_exact(5)).unwrap();
    bytestream::assert_with_log!(*view == *b"HELLO", "greeting", b"HELLO", &*view);
    drop(view);

    bytestream::test_section!("observe EOF as a value");
    let peeked = block_on(stream.peek_or_eof()).unwrap();
    bytestream::assert_with_log!(peeked.is_eof, "eof", true, peeked.is_eof);
    bytestream::assert_with_log!(
        peeked.data.is_empty(),
        "no residue",
        true,
        peeked.data.is_empty()
    );
    bytestream::assert_with_log!(stream.is_open(), "still open", true, stream.is_open());

    bytestream::test_section!("demand data past EOF");
    let err = block_on(stream.read_exact(1)).unwrap_err();
    bytestream::assert_with_log!(
        err.kind() == ErrorKind::UnexpectedEof,
        "kind",
        ErrorKind::UnexpectedEof,
        err.kind()
    );
    bytestream::assert_with_log!(err.is_fatal(), "fatal", true, err.is_fatal());
    let state = stream.lifecycle().state();
    bytestream::assert_with_log!(
        state == LifecycleState::Reset,
        "state",
        LifecycleState::Reset,
        state
    );
    bytestream::test_complete!("greeting_read_to_exhaustion");
}

/// Request/response over one duplex stream, then a clean close that
/// releases the transport exactly once.
#[test]
fn duplex_request_response_then_clean_close() {
    init_test("duplex_request_response_then_clean_close");
    let (mut stream, source, sink) = MemoryStream::new();

    source.push(b"GET /\n");
    let request = block_on(stream.read_exact(6)).unwrap();
    bytestream::assert_with_log!(*request == *b"GET /\n", "request", b"GET /\n", &*request);
    drop(request);

    block_on(stream.write_all(b"200 OK\n")).unwrap();
    let written = sink.written();
    bytestream::assert_with_log!(written == b"200 OK\n", "response", b"200 OK\n", &written);

    sink.ack_all();
    source.finish();
    block_on(stream.close()).unwrap();
    let state = stream.lifecycle().state();
    bytestream::assert_with_log!(
        state == LifecycleState::Closed,
        "state",
        LifecycleState::Closed,
        state
    );

    // A second close is rejected up front; the transport sees one release
    // and no abort.
    let err = block_on(stream.close()).unwrap_err();
    bytestream::assert_with_log!(
        err.kind() == ErrorKind::NotOpen,
        "second close",
        ErrorKind::NotOpen,
        err.kind()
    );
    let releases = source.release_count();
    bytestream::assert_with_log!(releases == 1, "released once", 1, releases);
    bytestream::assert_with_log!(!sink.is_aborted(), "no abort", false, sink.is_aborted());
    bytestream::test_complete!("duplex_request_response_then_clean_close");
}

/// Close on a stream with unacknowledged writes reports busy and falls
/// back to the reset path.
#[test]
fn busy_close_falls_back_to_reset() {
    init_test("busy_close_falls_back_to_reset");
    let (mut stream, _source, sink) = MemoryStream::new();
    block_on(stream.write_all(b"abc")).unwrap();
    bytestream::assert_with_log!(sink.unacked_len() == 3, "unacked", 3, sink.unacked_len());

    let err = block_on(stream.close()).unwrap_err();
    bytestream::assert_with_log!(
        err.kind() == ErrorKind::Busy,
        "kind",
        ErrorKind::Busy,
        err.kind()
    );
    let state = stream.lifecycle().state();
    bytestream::assert_with_log!(
        state == LifecycleState::Reset,
        "state",
        LifecycleState::Reset,
        state
    );
    bytestream::assert_with_log!(sink.is_aborted(), "aborted", true, sink.is_aborted());
    let releases = sink.release_count();
    bytestream::assert_with_log!(releases == 0, "no graceful release", 0, releases);
    bytestream::test_complete!("busy_close_falls_back_to_reset");
}

/// Reset completes synchronously with no scheduler anywhere in sight and
/// tears down both directions of a duplex stream.
#[test]
fn reset_is_synchronous_and_total() {
    init_test("reset_is_synchronous_and_total");
    let (mut stream, source, sink) = MemoryStream::new();
    source.push(b"unread");
    block_on(stream.write_all(b"unacked")).unwrap();

    stream.reset();

    let state = stream.lifecycle().state();
    bytestream::assert_with_log!(
        state == LifecycleState::Reset,
        "state",
        LifecycleState::Reset,
        state
    );
    bytestream::assert_with_log!(source.is_aborted(), "source aborted", true, source.is_aborted());
    bytestream::assert_with_log!(sink.is_aborted(), "sink aborted", true, sink.is_aborted());
    bytestream::test_complete!("reset_is_synchronous_and_total");
}

/// A reset issued by another logical actor while a read is suspended
/// cancels the read; the interrupted operation releases the transport.
#[test]
fn cross_actor_reset_cancels_suspended_read() {
    init_test("cross_actor_reset_cancels_suspended_read");
    let (mut stream, source) = MemoryInputStream::new();
    let supervisor = stream.lifecycle().clone();
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);

    let mut read = stream.read_exact(8);
    let first = Pin::new(&mut read).poll(&mut cx);
    bytestream::assert_with_log!(first.is_pending(), "pending", true, first.is_pending());

    supervisor.cancel();
    let second = Pin::new(&mut read).poll(&mut cx);
    let cancelled = matches!(&second, Poll::Ready(Err(err)) if err.is_cancelled());
    bytestream::assert_with_log!(cancelled, "cancelled", true, cancelled);
    drop(read);
    bytestream::assert_with_log!(source.is_aborted(), "aborted", true, source.is_aborted());
    bytestream::test_complete!("cross_actor_reset_cancels_suspended_read");
}

/// Destroying a stream while a task still waits on it is a checked
/// programming error. Forgetting the suspended future is the only way to
/// get here; a normal drop deregisters the waiter.
#[test]
#[should_panic(expected = "destroyed while a task is waiting")]
fn destroying_a_stream_with_a_waiter_panics() {
    init_test("destroying_a_stream_with_a_waiter_panics");
    let (mut stream, _source) = MemoryInputStream::new();
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    let mut read = stream.read_exact(1);
    let first = Pin::new(&mut read).poll(&mut cx);
    assert!(first.is_pending());
    std::mem::forget(read);
    drop(stream);
}

/// A view returned by a read stays intact while subsequent transport
/// pushes land in fresh chunks behind it.
#[test]
fn views_survive_concurrent_buffer_growth() {
    init_test("views_survive_concurrent_buffer_growth");
    let (mut stream, source) = MemoryInputStream::new();
    source.push(&[b'x'; CHUNK_SIZE]);
    let view = block_on(stream.read_exact(CHUNK_SIZE)).unwrap();
    bytestream::assert_with_log!(view.is_borrowed(), "zero copy", true, view.is_borrowed());
    // Growth happens through the source handle, which does not touch
    // consumed chunks.
    source.push(b"more");
    source.push(&[b'y'; CHUNK_SIZE * 2]);
    let intact = view.iter().all(|&b| b == b'x') && view.len() == CHUNK_SIZE;
    bytestream::assert_with_log!(intact, "intact", true, intact);
    drop(view);
    let next = block_on(stream.read_exact(4)).unwrap();
    bytestream::assert_with_log!(*next == *b"more", "next", b"more", &*next);
    bytestream::test_complete!("views_survive_concurrent_buffer_growth");
}

/// Interleaved peeks and reads across chunk boundaries: contiguous reads
/// borrow, straddling reads splice, and nothing is lost.
#[test]
fn peeks_and_reads_across_chunk_boundaries() {
    init_test("peeks_and_reads_across_chunk_boundaries");
    let (mut stream, source) = MemoryInputStream::new();
    source.push(&[b'a'; CHUNK_SIZE - 1]);
    source.push(b"bcd");
    source.finish();

    let head = block_on(stream.read_exact(CHUNK_SIZE - 2)).unwrap();
    bytestream::assert_with_log!(head.is_borrowed(), "contiguous", true, head.is_borrowed());
    drop(head);

    // One byte left in the first chunk plus three in the second.
    let straddle = block_on(stream.read_exact(3)).unwrap();
    bytestream::assert_with_log!(
        !straddle.is_borrowed(),
        "spliced",
        false,
        straddle.is_borrowed()
    );
    bytestream::assert_with_log!(*straddle == *b"abc", "content", b"abc", &*straddle);
    drop(straddle);

    let tail = block_on(stream.peek()).unwrap().to_vec();
    bytestream::assert_with_log!(tail == b"d", "tail", b"d", &tail);
    let last = block_on(stream.read_exact(1)).unwrap();
    bytestream::assert_with_log!(*last == *b"d", "last", b"d", &*last);
    bytestream::test_complete!("peeks_and_reads_across_chunk_boundaries");
}
