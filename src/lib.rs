#![forbid(unsafe_code)]

use std::io::BufRead;

mod archive;
mod decoder;
mod error;
mod tracking_writer;

pub use archive::{read_archive, Archive, ArchiveReader, FileEntry, MAGIC};
pub use decoder::{decode, CompressionLevel};
pub use error::{DecodeError, Error, FormatError, Result};

/// Parses an archive, failing if any entry decodes to a size other than the one
/// its header declares.
pub fn read_archive_strict<R: BufRead>(input: R) -> Result<Archive> {
    ArchiveReader::new(input).verify_lengths(true).read_archive()
}
