use std::{io, string::FromUtf8Error};
use thiserror::Error;

/// An error occured while reading the Aseprite file.
///
/// Decoding is atomic: any of these aborts the whole decode.
#[derive(Debug, Error)]
pub enum AsepriteParseError {
    /// Wrong magic number in the file header or in a frame header.
    #[error("Invalid magic number in {section} header at byte {offset}: {found:#06x} != {expected:#06x}")]
    Format {
        /// `"file"` or `"frame"`.
        section: &'static str,
        /// The magic number the format requires.
        expected: u16,
        /// The magic number found in the input.
        found: u16,
        /// Byte offset of the header that failed.
        offset: u64,
    },
    /// The input is well-formed but uses a color depth or blend mode that
    /// cannot be decoded.
    #[error("Unsupported Aseprite format: {0}")]
    UnsupportedFormat(String),
    /// A chunk could not be decoded.
    #[error("Malformed chunk {chunk_type:#06x} at byte {offset}: {message}")]
    MalformedChunk {
        /// Raw chunk type code.
        chunk_type: u16,
        /// Byte offset of the chunk envelope.
        offset: u64,
        /// Detailed message.
        message: String,
    },
    /// The layer nesting levels do not describe a tree.
    #[error("Broken layer hierarchy at layer {layer}: level {level} after {previous_level:?}")]
    BrokenHierarchy {
        /// Index of the offending layer.
        layer: usize,
        /// Its nesting level.
        level: u16,
        /// Nesting level of the layer before it, if any.
        previous_level: Option<u16>,
    },
    /// The input data was malformed. String contains detailed message.
    #[error("Invalid Aseprite input: {0}")]
    InvalidInput(String),
    /// An IO error occured. Also includes errors where the input was shorter
    /// than expected.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Coarse classification of an [AsepriteParseError].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [AsepriteParseError::Format].
    Format,
    /// See [AsepriteParseError::UnsupportedFormat].
    UnsupportedFormat,
    /// See [AsepriteParseError::MalformedChunk].
    MalformedChunk,
    /// See [AsepriteParseError::BrokenHierarchy].
    BrokenHierarchy,
    /// See [AsepriteParseError::InvalidInput].
    InvalidInput,
    /// See [AsepriteParseError::Io].
    Io,
}

impl AsepriteParseError {
    /// Which part of the error taxonomy this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AsepriteParseError::Format { .. } => ErrorKind::Format,
            AsepriteParseError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            AsepriteParseError::MalformedChunk { .. } => ErrorKind::MalformedChunk,
            AsepriteParseError::BrokenHierarchy { .. } => ErrorKind::BrokenHierarchy,
            AsepriteParseError::InvalidInput(_) => ErrorKind::InvalidInput,
            AsepriteParseError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<FromUtf8Error> for AsepriteParseError {
    fn from(err: FromUtf8Error) -> Self {
        AsepriteParseError::InvalidInput(format!("Could not decode utf8: {}", err))
    }
}
