//! Error types for the sync wire format.

use thiserror::Error;

/// Convenience type alias for Results using [`CodecError`].
pub type Result<T, E = CodecError> = std::result::Result<T, E>;

/// Errors produced while encoding or decoding wire structures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Input ended before a complete element could be read.
    #[error("truncated input: need {needed} more bytes, {remaining} available")]
    Truncated {
        /// Bytes required to finish the current element.
        needed: usize,
        /// Bytes actually available.
        remaining: usize,
    },

    /// A TLV element carried an unexpected type code.
    #[error("unexpected tlv type {got} (expected {expected})")]
    UnexpectedType {
        /// The type code that was required here.
        expected: u64,
        /// The type code found on the wire.
        got: u64,
    },

    /// A non-negative integer had an invalid width.
    ///
    /// Valid widths are 1, 2, 4 and 8 bytes.
    #[error("invalid non-negative integer width: {0}")]
    InvalidIntegerWidth(usize),

    /// A version vector failed structural validation.
    #[error("malformed version vector: {0}")]
    MalformedVector(&'static str),

    /// A name did not have a component at the requested index.
    #[error("missing name component at index {0}")]
    MissingComponent(isize),

    /// A textual name could not be parsed.
    #[error("invalid name: {0}")]
    InvalidName(&'static str),
}
