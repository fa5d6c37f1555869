//! Bytestream: cancel-correct async resource lifecycle protocol and buffered
//! stream layer.
//!
//! # Overview
//!
//! Every cancellable, potentially-failing, cooperatively-scheduled resource
//! (files, sockets, response bodies, pipes) has to answer the same questions:
//! when may it suspend, how is it cancelled, what happens to in-flight buffer
//! views when it fails, and who is allowed to touch its buffer. This crate
//! pins those answers down as a small set of contracts plus the chunked
//! byte-queue engine that backs buffered reads.
//!
//! # Core Guarantees
//!
//! - **One-way lifecycle**: once a resource leaves `Open` it never returns;
//!   every termination path lands in a well-defined closed or reset state
//! - **Reset never suspends**: the error/cancel path is callable from
//!   destructors and unwinding code, where waiting is not an option
//! - **Single-flight fills**: at most one buffer fill is in flight per
//!   stream; a second is a checked programming error, not a race
//! - **Stable views**: bytes handed out as a view are never moved or freed
//!   while the view is live; the chunked store grows by appending chunks and
//!   shrinks only by freeing fully-consumed ones
//! - **No dangling waiters**: destroying a resource while a task waits on it
//!   is a checked programming error, never silent
//!
//! # Module Structure
//!
//! - [`error`]: Typed error kinds and the crate error type
//! - [`lifecycle`]: Shared lifecycle cell and waiter registration
//! - [`resource`]: The [`AsyncResource`] contract and the `Close` operation
//! - [`queue`]: [`ChunkedByteQueue`], the chunked FIFO byte engine
//! - [`bounded`]: [`BoundedBuffer`], a fixed-capacity seekable buffer
//! - [`buffer`]: Stream-owned buffer state and the fill capability token
//! - [`input`]: The [`AsyncInputStream`] contract and its futures
//! - [`output`]: The [`AsyncOutputStream`] contract and its futures
//! - [`duplex`]: [`AsyncStream`], the duplex conjunction
//! - [`memory`]: In-memory reference streams over a scripted transport
//!
//! # Concurrency Model
//!
//! Single-threaded cooperative. "Concurrency" means interleaving at
//! suspension points within one logical thread, not parallel mutation; the
//! lifecycle cell is deliberately `!Send`. Cancellation is explicit: a reset
//! wakes the suspended waiter with a [`Cancelled`](error::ErrorKind::Cancelled)
//! failure, and that is the only cancellation path.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod bounded;
pub mod buffer;
pub mod duplex;
pub mod error;
pub mod input;
pub mod lifecycle;
pub mod memory;
pub mod output;
pub mod queue;
pub mod resource;
pub mod test_utils;

pub use bounded::BoundedBuffer;
pub use buffer::{BufferView, FillPermit, StreamBuffer};
pub use duplex::AsyncStream;
pub use error::{Error, ErrorKind, Result};
pub use input::{AsyncInputStream, FixedLayout, PeekResult};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use memory::{MemoryInputStream, MemoryOutputStream, MemorySink, MemorySource, MemoryStream};
pub use output::AsyncOutputStream;
pub use queue::{ChunkedByteQueue, CHUNK_SIZE};
pub use resource::AsyncResource;
pub use std::io::SeekFrom;
