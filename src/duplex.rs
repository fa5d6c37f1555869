//! The bidirectional stream contract.

use crate::input::AsyncInputStream;
use crate::output::AsyncOutputStream;

/// A stream readable and writable over the same transport.
///
/// Both directions share one lifecycle: a close or reset terminates reading
/// and writing together. Implemented automatically for any type carrying
/// both halves.
pub trait AsyncStream: AsyncInputStream + AsyncOutputStream {}

impl<S: AsyncInputStream + AsyncOutputStream> AsyncStream for S {}
