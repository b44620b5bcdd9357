//! Error types for GIF decoding.

use thiserror::Error;

/// Result type for GIF decoding operations.
pub type Result<T> = std::result::Result<T, GifError>;

/// Errors that can occur while decoding a GIF stream.
#[derive(Error, Debug)]
pub enum GifError {
    /// Buffer too small for the header, or the signature is not
    /// `GIF87a`/`GIF89a`.
    #[error("Invalid GIF header: {0}")]
    InvalidHeader(String),

    /// A byte at a block-introducer position that is not an image
    /// descriptor (0x2C), an extension (0x21) or the trailer (0x3B).
    #[error("Unexpected block introducer: 0x{0:02X}")]
    UnexpectedBlock(u8),

    /// The buffer ended before a structurally complete unit (palette,
    /// sub-block chain, code).
    #[error("Truncated data: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required to finish the current unit.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// A sub-block declares more data than the buffer holds.
    #[error("Malformed sub-block: declares {declared} bytes, {available} available")]
    MalformedSubBlock {
        /// Length byte of the offending sub-block.
        declared: usize,
        /// Bytes remaining in the buffer after the length byte.
        available: usize,
    },

    /// The decoder hit a fatal error on an earlier frame and will not
    /// produce further output.
    #[error("Decoder is in a failed state")]
    Failed,
}
