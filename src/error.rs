//! Error types and error handling strategy for Bytestream.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - All recoverable failures are returned as `Result` values the caller
//!   must inspect; nothing in this crate throws across an await point
//! - Fatal input errors (transport failure, EOF where data was required)
//!   reset the stream before they surface, so the resource always lands in
//!   a well-defined state
//! - Contract violations (double fill, waiting on a non-open resource,
//!   destroying a resource with a live waiter) are panics, not error codes
//!
//! # Error Categories
//!
//! - **Lifecycle**: close-path failures (`Busy`, `NotOpen`)
//! - **Fatal I/O**: unrecoverable stream failures (`Io`, `UnexpectedEof`)
//! - **Cancellation**: a waiter woken by a concurrent reset (`Cancelled`)
//! - **Buffer**: bounds failures on the byte engines (`OutOfData`,
//!   `ReadOnly`)

use core::fmt;
use std::sync::Arc;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Lifecycle ===
    /// Close could not reach a clean state; the resource was forcibly reset.
    Busy,
    /// Operation requires an open resource (e.g. close after close).
    NotOpen,

    // === Fatal I/O ===
    /// Underlying transport failure during a fill or write.
    Io,
    /// End of stream reached where data was still required.
    UnexpectedEof,

    // === Cancellation ===
    /// The suspended operation was woken by a reset.
    Cancelled,

    // === Buffer bounds ===
    /// Asked for more bytes than the buffer currently holds.
    OutOfData,
    /// Write attempted on a read-only buffer.
    ReadOnly,
}

impl ErrorKind {
    /// Returns true if this kind is fatal for the stream that produced it.
    ///
    /// Fatal errors are always preceded by a reset: the stream is already in
    /// the error state by the time the caller sees the error.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Io | Self::UnexpectedEof)
    }

    /// Returns a static description of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Busy => "resource busy",
            Self::NotOpen => "resource not open",
            Self::Io => "I/O error",
            Self::UnexpectedEof => "unexpected end of stream",
            Self::Cancelled => "operation cancelled",
            Self::OutOfData => "not enough buffered data",
            Self::ReadOnly => "buffer is read-only",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for Bytestream operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Returns true if this error is fatal for the originating stream.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}: {msg}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::UnexpectedEof => ErrorKind::UnexpectedEof,
            _ => ErrorKind::Io,
        };
        Self::new(kind).with_source(err)
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
    fn kind_classification() {
        init_test("kind_classification");
        let fatal = ErrorKind::UnexpectedEof.is_fatal();
        crate::assert_with_log!(fatal, "eof fatal", true, fatal);
        let fatal = ErrorKind::Io.is_fatal();
        crate::assert_with_log!(fatal, "io fatal", true, fatal);
        let fatal = ErrorKind::Busy.is_fatal();
        crate::assert_with_log!(!fatal, "busy not fatal", false, fatal);
        let cancelled = Error::new(ErrorKind::Cancelled).is_cancelled();
        crate::assert_with_log!(cancelled, "cancelled", true, cancelled);
        crate::test_complete!("kind_classification");
    }

    #[test]
    fn display_with_message() {
        init_test("display_with_message");
        let err = Error::new(ErrorKind::Busy).with_message("3 bytes unacknowledged");
        let text = err.to_string();
        crate::assert_with_log!(
            text == "resource busy: 3 bytes unacknowledged",
            "display",
            "resource busy: 3 bytes unacknowledged",
            text
        );
        crate::test_complete!("display_with_message");
    }

    #[test]
    fn io_error_conversion() {
        init_test("io_error_conversion");
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: Error = io_err.into();
        let kind = err.kind();
        crate::assert_with_log!(
            kind == ErrorKind::UnexpectedEof,
            "kind",
            ErrorKind::UnexpectedEof,
            kind
        );
        let has_source = std::error::Error::source(&err).is_some();
        crate::assert_with_log!(has_source, "source preserved", true, has_source);
        crate::test_complete!("io_error_conversion");
    }
}
