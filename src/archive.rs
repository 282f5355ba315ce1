#![forbid(unsafe_code)]

use std::{
    convert::TryFrom,
    io::{BufRead, Read},
    str,
};

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};

use crate::decoder::CompressionLevel;
use crate::error::{Error, FormatError, Result};

////////////////////////////////////////////////////////////////////////////////

pub const MAGIC: [u8; 4] = *b"PAKF";

const NAME_LEN: usize = 16;
const ENTRY_HEADER_LEN: usize = NAME_LEN + 3 * 4;

// Payload buffers grow with the bytes actually read past this size.
const MAX_PAYLOAD_PREALLOCATION: usize = 1 << 16;

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    name: String,
    compression_level: u32,
    uncompressed_length: u32,
    raw_payload: Vec<u8>,
    data: Vec<u8>,
    crc32: u32,
}

impl FileEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }

    pub fn compressed_length(&self) -> u32 {
        self.raw_payload.len() as u32
    }

    /// Size claimed by the archive header; see [`FileEntry::size_matches`].
    pub fn uncompressed_length(&self) -> u32 {
        self.uncompressed_length
    }

    pub fn raw_payload(&self) -> &[u8] {
        &self.raw_payload
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// CRC-32 (ISO-HDLC) of the decoded data.
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    pub fn size_matches(&self) -> bool {
        self.data.len() == self.uncompressed_length as usize
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    declared_size: u32,
    entries: Vec<FileEntry>,
}

impl Archive {
    /// Total size recorded in the archive header. Informational only.
    pub fn declared_size(&self) -> u32 {
        self.declared_size
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileEntry> {
        self.entries.iter()
    }

    /// First entry with exactly this name.
    pub fn get(&self, name: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn into_entries(self) -> Vec<FileEntry> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a Archive {
    type Item = &'a FileEntry;
    type IntoIter = std::slice::Iter<'a, FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Single-pass reader that parses and decodes a whole archive.
pub struct ArchiveReader<T> {
    inner: T,
    position: u64,
    verify_lengths: bool,
}

impl<T: BufRead> ArchiveReader<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            position: 0,
            verify_lengths: false,
        }
    }

    /// Fail when an entry's decoded size differs from its header.
    pub fn verify_lengths(mut self, value: bool) -> Self {
        self.verify_lengths = value;
        self
    }

    pub fn read_archive(mut self) -> Result<Archive> {
        let magic = self.read_field("magic", 4)?;
        if magic != MAGIC {
            return Err(Error::Format {
                offset: 0,
                kind: FormatError::BadMagic {
                    actual: [magic[0], magic[1], magic[2], magic[3]],
                },
            });
        }
        let declared_size = LittleEndian::read_u32(&self.read_field("declared size", 4)?);
        debug!("archive header: declared size {}", declared_size);

        let mut entries = Vec::new();
        while !self.inner.fill_buf()?.is_empty() {
            let entry = self.read_entry(entries.len())?;
            entries.push(entry);
        }
        debug!("read {} entries", entries.len());

        Ok(Archive {
            declared_size,
            entries,
        })
    }

    fn read_entry(&mut self, index: usize) -> Result<FileEntry> {
        let header_offset = self.position;
        let header = self.read_field("entry header", ENTRY_HEADER_LEN)?;

        let name = parse_name(&header[..NAME_LEN]).map_err(|kind| Error::Format {
            offset: header_offset,
            kind,
        })?;
        let compression_level = LittleEndian::read_u32(&header[NAME_LEN..]);
        let compressed_length = LittleEndian::read_u32(&header[NAME_LEN + 4..]);
        let uncompressed_length = LittleEndian::read_u32(&header[NAME_LEN + 8..]);
        debug!(
            "entry #{} {:?} at {:#x}: level {}, {} -> {} bytes",
            index, name, header_offset, compression_level, compressed_length, uncompressed_length
        );

        let raw_payload = self.read_field("entry payload", compressed_length as usize)?;

        let entry_error = |source| Error::Entry {
            index,
            name: name.clone(),
            source,
        };
        let (data, crc32) = CompressionLevel::try_from(compression_level)
            .and_then(|level| level.decode_tracked(&raw_payload, uncompressed_length as usize))
            .map_err(entry_error)?
            .finish();

        if data.len() != uncompressed_length as usize {
            if self.verify_lengths {
                return Err(Error::LengthMismatch {
                    index,
                    name,
                    expected: uncompressed_length,
                    actual: data.len(),
                });
            }
            warn!(
                "entry #{} {:?}: decoded {} bytes, header declares {}",
                index,
                name,
                data.len(),
                uncompressed_length
            );
        }

        Ok(FileEntry {
            name,
            compression_level,
            uncompressed_length,
            raw_payload,
            data,
            crc32,
        })
    }

    /// Reads exactly `len` bytes; a short read is reported as truncation.
    fn read_field(&mut self, field: &'static str, len: usize) -> Result<Vec<u8>> {
        let offset = self.position;
        let mut buf = Vec::with_capacity(len.min(MAX_PAYLOAD_PREALLOCATION));
        let read = (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        self.position += read as u64;
        if read < len {
            return Err(Error::Format {
                offset,
                kind: FormatError::Truncated {
                    field,
                    needed: len,
                    available: read,
                },
            });
        }
        Ok(buf)
    }
}

/// Decodes a fixed-width name field, dropping everything from the first NUL.
fn parse_name(field: &[u8]) -> std::result::Result<String, FormatError> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    str::from_utf8(&field[..end])
        .map(str::to_owned)
        .map_err(FormatError::InvalidName)
}

/// Parses and decodes a complete archive with default options.
pub fn read_archive<R: BufRead>(input: R) -> Result<Archive> {
    ArchiveReader::new(input).read_archive()
}

////////////////////////////////////////////////////////////////////////////////
