//! Public error type for the BCSV core.
//!
//! `Exhausted` is deliberately absent from this enum: it is normal
//! end-of-stream, signalled by `Ok(false)` from `read_next`, not an `Err`.

use std::io;

/// Errors returned by the BCSV public API.
///
/// Every fallible operation returns `Result<T, BcsvError>`; there is no
/// panic path for recoverable conditions.
#[derive(Debug, thiserror::Error)]
pub enum BcsvError {
    /// Caller-supplied argument is structurally invalid: empty path,
    /// column count beyond `u16`, a string value at/above 65 535 bytes.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Underlying I/O failed (open/read/write/seek, or a short read).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input file does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The output file exists and `overwrite` was not requested.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The file header's magic, version, or CRC did not check out.
    #[error("malformed header: {0}")]
    HeaderMalformed(String),

    /// The Reader's expected layout does not match the file's layout.
    #[error("incompatible layout: {0}")]
    LayoutIncompatible(String),

    /// A packet's magic, declared size, or checksum did not check out,
    /// or the LZ4 stream reported a fatal error.
    #[error("malformed packet: {0}")]
    PacketMalformed(String),

    /// A row codec decoded past the end of its payload, or encountered an
    /// invalid change mask.
    #[error("codec error: {0}")]
    CodecError(String),

    /// Attempted to mutate a Layout's structure while it is structurally
    /// locked by a live Writer, Reader, or codec.
    #[error("layout is structurally locked: {0}")]
    StructuralLock(String),
}

impl BcsvError {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        BcsvError::InvalidArgument(msg.into())
    }

    pub(crate) fn codec(msg: impl Into<String>) -> Self {
        BcsvError::CodecError(msg.into())
    }

    pub(crate) fn packet(msg: impl Into<String>) -> Self {
        BcsvError::PacketMalformed(msg.into())
    }

    pub(crate) fn header(msg: impl Into<String>) -> Self {
        BcsvError::HeaderMalformed(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        BcsvError::NotFound(msg.into())
    }

    pub(crate) fn already_exists(msg: impl Into<String>) -> Self {
        BcsvError::AlreadyExists(msg.into())
    }

    pub(crate) fn layout_incompatible(msg: impl Into<String>) -> Self {
        BcsvError::LayoutIncompatible(msg.into())
    }

    /// String rendering used by the `error_message()` accessor on
    /// [`crate::writer::Writer`] and [`crate::reader::Reader`].
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BcsvError>;
