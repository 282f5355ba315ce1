#![forbid(unsafe_code)]

use std::{io, str::Utf8Error};

use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////

/// Errors produced while reading a PAKF archive.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The container itself is malformed.
    #[error("malformed archive at offset {offset:#x}: {kind}")]
    Format { offset: u64, kind: FormatError },

    /// An entry's payload could not be decoded.
    #[error("entry #{index} ({name:?}): {source}")]
    Entry {
        index: usize,
        name: String,
        #[source]
        source: DecodeError,
    },

    /// Decoded size differs from the header. Only raised in strict mode.
    #[error("entry #{index} ({name:?}): decoded {actual} bytes, header declares {expected}")]
    LengthMismatch {
        index: usize,
        name: String,
        expected: u32,
        actual: usize,
    },
}

impl Error {
    /// The decoder failure behind this error, if any.
    pub fn decode_error(&self) -> Option<&DecodeError> {
        match self {
            Error::Entry { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn format_error(&self) -> Option<&FormatError> {
        match self {
            Error::Format { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("bad magic {actual:02x?}, expected \"PAKF\"")]
    BadMagic { actual: [u8; 4] },

    #[error("truncated {field}: needed {needed} bytes, got {available}")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("entry name is not valid UTF-8")]
    InvalidName(#[source] Utf8Error),
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unsupported compression level {0}")]
    UnsupportedCompression(u32),

    #[error(
        "back-reference at payload offset {offset} reaches {distance} bytes back, \
         only {available} bytes decoded"
    )]
    DistanceOutOfRange {
        offset: usize,
        distance: usize,
        available: usize,
    },

    #[error("payload ends inside the token at offset {offset}: {needed} more bytes needed")]
    UnexpectedEnd { offset: usize, needed: usize },
}

impl DecodeError {
    /// True for damaged payloads, as opposed to an unknown level.
    pub fn is_corruption(&self) -> bool {
        !matches!(self, DecodeError::UnsupportedCompression(_))
    }
}

/// A back-reference that points before the start of the output.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("distance {distance} exceeds {available} written bytes")]
pub struct HistoryUnderflow {
    pub distance: usize,
    pub available: usize,
}
