#![forbid(unsafe_code)]

use std::convert::TryFrom;

use byteorder::{BigEndian, ByteOrder};
use log::trace;

use crate::error::DecodeError;
use crate::tracking_writer::TrackingWriter;

////////////////////////////////////////////////////////////////////////////////

const LEVEL_LZ: u32 = 3;

const TAG_BACK_REFERENCE: u8 = 0x80;
const TAG_SHORT_OFFSET: u8 = 0x40;
const RUN_MASK: u8 = 0x3f;
const LITERAL_MASK: u8 = 0x7f;

// Initial output capacity is capped so a lying header cannot force a huge allocation.
const MAX_OUTPUT_PREALLOCATION: usize = 1 << 20;

////////////////////////////////////////////////////////////////////////////////

/// Algorithms an entry's payload may be compressed with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompressionLevel {
    /// Byte-oriented LZ: literal runs and back-references into the output.
    Lz,
}

impl TryFrom<u32> for CompressionLevel {
    type Error = DecodeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            LEVEL_LZ => Ok(CompressionLevel::Lz),
            x => Err(DecodeError::UnsupportedCompression(x)),
        }
    }
}

impl From<CompressionLevel> for u32 {
    fn from(level: CompressionLevel) -> u32 {
        match level {
            CompressionLevel::Lz => LEVEL_LZ,
        }
    }
}

impl CompressionLevel {
    pub fn decode(self, input: &[u8]) -> Result<Vec<u8>, DecodeError> {
        self.decode_tracked(input, 0).map(TrackingWriter::into_inner)
    }

    pub(crate) fn decode_tracked(
        self,
        input: &[u8],
        size_hint: usize,
    ) -> Result<TrackingWriter, DecodeError> {
        match self {
            CompressionLevel::Lz => LzDecoder::new(input, size_hint).run(),
        }
    }
}

/// Decodes `input` with the algorithm selected by the raw level tag.
pub fn decode(level: u32, input: &[u8]) -> Result<Vec<u8>, DecodeError> {
    CompressionLevel::try_from(level)?.decode(input)
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
    Literal(&'a [u8]),
    BackReference { distance: usize, length: usize },
}

struct LzDecoder<'a> {
    input: &'a [u8],
    cursor: usize,
    output: TrackingWriter,
}

impl<'a> LzDecoder<'a> {
    fn new(input: &'a [u8], size_hint: usize) -> Self {
        Self {
            input,
            cursor: 0,
            output: TrackingWriter::with_capacity(size_hint.min(MAX_OUTPUT_PREALLOCATION)),
        }
    }

    fn run(mut self) -> Result<TrackingWriter, DecodeError> {
        // The final byte of a payload is never read as a token.
        while self.cursor + 1 < self.input.len() {
            let offset = self.cursor;
            let token = self.next_token()?;
            trace!("token at {}: {:?}", offset, token);
            match token {
                Token::Literal(bytes) => {
                    self.output.write_slice(bytes);
                }
                Token::BackReference { distance, length } => {
                    self.output
                        .write_previous(distance, length)
                        .map_err(|e| DecodeError::DistanceOutOfRange {
                            offset,
                            distance: e.distance,
                            available: e.available,
                        })?;
                }
            }
        }
        Ok(self.output)
    }

    fn next_token(&mut self) -> Result<Token<'a>, DecodeError> {
        let start = self.cursor;
        let tag = self.take(start, 1)?[0];

        if tag & TAG_BACK_REFERENCE != 0 {
            let length = (tag & RUN_MASK) as usize + 1;
            let raw_offset = if tag & TAG_SHORT_OFFSET != 0 {
                self.take(start, 1)?[0] as usize
            } else {
                BigEndian::read_u16(self.take(start, 2)?) as usize
            };
            Ok(Token::BackReference {
                distance: raw_offset + 1,
                length,
            })
        } else {
            let count = (tag & LITERAL_MASK) as usize + 1;
            Ok(Token::Literal(self.take(start, count)?))
        }
    }

    /// Consumes `count` input bytes; `token_start` is reported on failure.
    fn take(&mut self, token_start: usize, count: usize) -> Result<&'a [u8], DecodeError> {
        let input: &'a [u8] = self.input;
        let available = input.len() - self.cursor;
        if available < count {
            return Err(DecodeError::UnexpectedEnd {
                offset: token_start,
                needed: count - available,
            });
        }
        let bytes = &input[self.cursor..self.cursor + count];
        self.cursor += count;
        Ok(bytes)
    }
}

////////////////////////////////////////////////////////////////////////////////
