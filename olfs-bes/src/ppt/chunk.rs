//! Chunk header codec
//!
//! A chunk header is exactly eight ASCII bytes: seven lowercase hex digits
//! giving the payload size, followed by a one-byte type tag (`d` for data,
//! `x` for extension). The zero-length data chunk `0000000d` closes a message.

use crate::error::{BesError, Result};
use std::fmt;

/// Number of hex digits in the size field
pub const SIZE_DIGITS: usize = 7;

/// Total header width in bytes
pub const HEADER_SIZE: usize = SIZE_DIGITS + 1;

/// Largest payload a single chunk can carry (0x0FFFFFFF)
pub const MAX_CHUNK_SIZE: usize = 0x0FFF_FFFF;

/// Wire bytes of the closing chunk
pub const CLOSING_CHUNK: [u8; HEADER_SIZE] = *b"0000000d";

const DATA_TAG: u8 = b'd';
const EXTENSION_TAG: u8 = b'x';

/// Chunk type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    /// Application payload
    Data,
    /// Out-of-band `name=value;` control record
    Extension,
}

impl ChunkKind {
    pub fn tag(self) -> u8 {
        match self {
            ChunkKind::Data => DATA_TAG,
            ChunkKind::Extension => EXTENSION_TAG,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            DATA_TAG => Some(ChunkKind::Data),
            EXTENSION_TAG => Some(ChunkKind::Extension),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkKind::Data => write!(f, "data"),
            ChunkKind::Extension => write!(f, "extension"),
        }
    }
}

/// Decoded chunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub size: usize,
    pub kind: ChunkKind,
}

impl ChunkHeader {
    /// Build a header, rejecting sizes the 7-digit field cannot express.
    pub fn new(size: usize, kind: ChunkKind) -> Result<Self> {
        if size > MAX_CHUNK_SIZE {
            return Err(BesError::ChunkTooLarge {
                size,
                max: MAX_CHUNK_SIZE,
            });
        }
        Ok(Self { size, kind })
    }

    /// The closing chunk header
    pub const fn closing() -> Self {
        Self {
            size: 0,
            kind: ChunkKind::Data,
        }
    }

    /// True only for a zero-length DATA chunk.
    pub fn is_closing(&self) -> bool {
        self.size == 0 && self.kind == ChunkKind::Data
    }

    pub fn encode(&self) -> Result<[u8; HEADER_SIZE]> {
        encode_header(self.size, self.kind)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_header(bytes)
    }
}

impl fmt::Display for ChunkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:07x}{}", self.size, self.kind.tag() as char)
    }
}

/// Encode `size` and `kind` into the 8-byte wire header.
pub fn encode_header(size: usize, kind: ChunkKind) -> Result<[u8; HEADER_SIZE]> {
    if size > MAX_CHUNK_SIZE {
        return Err(BesError::ChunkTooLarge {
            size,
            max: MAX_CHUNK_SIZE,
        });
    }

    let digits = format!("{:07x}", size);
    let mut header = [0u8; HEADER_SIZE];
    header[..SIZE_DIGITS].copy_from_slice(digits.as_bytes());
    header[SIZE_DIGITS] = kind.tag();
    Ok(header)
}

/// Decode an 8-byte wire header.
pub fn decode_header(bytes: &[u8]) -> Result<ChunkHeader> {
    if bytes.len() != HEADER_SIZE {
        return Err(BesError::MalformedHeader(format!(
            "expected {} header bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let mut size = 0usize;
    for &b in &bytes[..SIZE_DIGITS] {
        let digit = (b as char).to_digit(16).ok_or_else(|| {
            BesError::MalformedHeader(format!(
                "size field {:?} is not {} hex digits",
                String::from_utf8_lossy(&bytes[..SIZE_DIGITS]),
                SIZE_DIGITS
            ))
        })?;
        size = (size << 4) | digit as usize;
    }

    let kind = ChunkKind::from_tag(bytes[SIZE_DIGITS]).ok_or_else(|| {
        BesError::MalformedHeader(format!(
            "unknown chunk type byte 0x{:02x}",
            bytes[SIZE_DIGITS]
        ))
    })?;

    Ok(ChunkHeader { size, kind })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_header() {
        assert_eq!(&encode_header(0x1d, ChunkKind::Data).unwrap(), b"000001dd");
        assert_eq!(&encode_header(14, ChunkKind::Extension).unwrap(), b"000000ex");
        assert_eq!(
            &encode_header(MAX_CHUNK_SIZE, ChunkKind::Data).unwrap(),
            b"fffffffd"
        );
    }

    #[test]
    fn test_encode_rejects_oversize() {
        let err = encode_header(MAX_CHUNK_SIZE + 1, ChunkKind::Data).unwrap_err();
        assert!(matches!(err, BesError::ChunkTooLarge { .. }));
        assert!(ChunkHeader::new(MAX_CHUNK_SIZE + 1, ChunkKind::Extension).is_err());
    }

    #[test]
    fn test_decode_header() {
        let header = decode_header(b"000001ed").unwrap();
        assert_eq!(header.size, 0x1e);
        assert_eq!(header.kind, ChunkKind::Data);

        // uppercase digits from a lenient peer still decode
        let header = decode_header(b"00000FFx").unwrap();
        assert_eq!(header.size, 0xff);
        assert_eq!(header.kind, ChunkKind::Extension);
    }

    #[test]
    fn test_decode_round_trip_boundaries() {
        for size in [0, 1, 0xf, 0x10, 65535, 0x0100_0000, MAX_CHUNK_SIZE] {
            for kind in [ChunkKind::Data, ChunkKind::Extension] {
                let bytes = encode_header(size, kind).unwrap();
                assert_eq!(decode_header(&bytes).unwrap(), ChunkHeader { size, kind });
            }
        }
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            decode_header(b"00000g0d"),
            Err(BesError::MalformedHeader(_))
        ));
        assert!(matches!(
            decode_header(b"-000001d"),
            Err(BesError::MalformedHeader(_))
        ));
        assert!(matches!(
            decode_header(b"0000010z"),
            Err(BesError::MalformedHeader(_))
        ));
        assert!(matches!(
            decode_header(b"0000d"),
            Err(BesError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_closing_chunk() {
        assert_eq!(ChunkHeader::closing().encode().unwrap(), CLOSING_CHUNK);
        assert!(decode_header(&CLOSING_CHUNK).unwrap().is_closing());

        let empty_extension = ChunkHeader::new(0, ChunkKind::Extension).unwrap();
        assert!(!empty_extension.is_closing());

        let data = ChunkHeader::new(1, ChunkKind::Data).unwrap();
        assert!(!data.is_closing());
    }

    #[test]
    fn test_header_display() {
        let header = ChunkHeader::new(0x2a, ChunkKind::Extension).unwrap();
        assert_eq!(header.to_string(), "000002ax");
    }
}
