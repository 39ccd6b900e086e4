//! JPEG segment index.
//!
//! Walks the marker-delimited header of a JPEG buffer and records where each
//! segment lives. Nothing is copied; every [`Segment`] holds offsets into the
//! buffer it was parsed from.

use crate::{Error, Result};
use std::ops::Range;

/// Two-byte JPEG marker code (`0xFFxx`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Marker(pub u16);

impl Marker {
    pub const SOI: Self = Self(0xFFD8);
    pub const EOI: Self = Self(0xFFD9);
    pub const SOS: Self = Self(0xFFDA);
    pub const DQT: Self = Self(0xFFDB);
    pub const DHT: Self = Self(0xFFC4);
    pub const SOF0: Self = Self(0xFFC0);
    pub const APP0: Self = Self(0xFFE0);
    pub const APP1: Self = Self(0xFFE1);
    pub const COM: Self = Self(0xFFFE);
    pub const TEM: Self = Self(0xFF01);

    /// Create from the byte following `0xFF`.
    pub fn from_code(code: u8) -> Self {
        Self(0xFF00 | code as u16)
    }

    /// The byte following `0xFF`.
    pub fn code(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Markers that carry no length field.
    pub fn is_standalone(&self) -> bool {
        matches!(self.code(), 0x01 | 0xD0..=0xD7)
    }

    /// Application segment number (APP0..APP15), if this is one.
    pub fn app_index(&self) -> Option<u8> {
        match self.code() {
            c @ 0xE0..=0xEF => Some(c - 0xE0),
            _ => None,
        }
    }
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.app_index() {
            Some(n) => write!(f, "APP{}", n),
            None => match *self {
                Self::SOI => f.write_str("SOI"),
                Self::EOI => f.write_str("EOI"),
                Self::SOS => f.write_str("SOS"),
                Self::DQT => f.write_str("DQT"),
                Self::DHT => f.write_str("DHT"),
                Self::SOF0 => f.write_str("SOF0"),
                Self::COM => f.write_str("COM"),
                _ => write!(f, "{:04X}", self.0),
            },
        }
    }
}

/// One length-prefixed (or stand-alone) segment in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Marker code.
    pub marker: Marker,
    /// Big-endian length from the file, including its own 2 bytes. Zero for
    /// stand-alone markers.
    pub length: u16,
    /// Offset of the `0xFF` byte that starts the marker.
    pub offset: usize,
    /// Offset just past the length field.
    pub payload_offset: usize,
}

impl Segment {
    /// Number of payload bytes.
    pub fn payload_len(&self) -> usize {
        (self.length as usize).saturating_sub(2)
    }

    /// Offset one past the last byte of the segment.
    pub fn end(&self) -> usize {
        self.payload_offset + self.payload_len()
    }

    /// Full byte range: marker, length field and payload.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }

    /// Borrow this segment's payload from the buffer it was indexed from.
    pub fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.payload_offset..self.end()]
    }
}

/// Ordered segments between SOI and the start of entropy-coded data.
#[derive(Debug, Clone, Default)]
pub struct SegmentIndex {
    /// Segments in file order.
    pub segments: Vec<Segment>,
    /// Offset of the SOS (or EOI) marker that ended the walk.
    pub scan_offset: usize,
}

impl SegmentIndex {
    /// Index a JPEG buffer.
    ///
    /// Fails with [`Error::MalformedContainer`] if SOI is missing, a marker is
    /// expected but not found, a length is invalid or runs past the end of the
    /// buffer, or the buffer ends before SOS/EOI.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 2 || Marker(u16::from_be_bytes([data[0], data[1]])) != Marker::SOI {
            return Err(Error::malformed("missing start-of-image marker at offset 0"));
        }

        let mut segments = Vec::new();
        let mut pos = 2usize;

        loop {
            if pos >= data.len() {
                return Err(Error::malformed(format!(
                    "data ends at offset {} before start of scan",
                    pos
                )));
            }
            if data[pos] != 0xFF {
                return Err(Error::malformed(format!(
                    "expected marker at offset {}, found 0x{:02X}",
                    pos, data[pos]
                )));
            }

            // Any number of 0xFF fill bytes may precede the marker code.
            let mut code_pos = pos + 1;
            while code_pos < data.len() && data[code_pos] == 0xFF {
                code_pos += 1;
            }
            if code_pos >= data.len() {
                return Err(Error::malformed("data ends inside marker fill bytes"));
            }

            let marker = Marker::from_code(data[code_pos]);
            let offset = code_pos - 1;

            match marker {
                Marker::SOS | Marker::EOI => {
                    return Ok(Self {
                        segments,
                        scan_offset: offset,
                    });
                }
                Marker::SOI => {
                    return Err(Error::malformed(format!(
                        "unexpected start-of-image marker at offset {}",
                        offset
                    )));
                }
                m if m.code() == 0x00 => {
                    return Err(Error::malformed(format!(
                        "stuffed byte outside entropy-coded data at offset {}",
                        offset
                    )));
                }
                m if m.is_standalone() => {
                    segments.push(Segment {
                        marker: m,
                        length: 0,
                        offset,
                        payload_offset: offset + 2,
                    });
                    pos = offset + 2;
                    continue;
                }
                _ => {}
            }

            if code_pos + 3 > data.len() {
                return Err(Error::malformed(format!(
                    "length field of {} at offset {} runs past end of file",
                    marker, offset
                )));
            }
            let length = u16::from_be_bytes([data[code_pos + 1], data[code_pos + 2]]);
            if length < 2 {
                return Err(Error::malformed(format!(
                    "{} at offset {} has invalid length {}",
                    marker, offset, length
                )));
            }

            let segment = Segment {
                marker,
                length,
                offset,
                payload_offset: code_pos + 3,
            };
            if segment.end() > data.len() {
                return Err(Error::malformed(format!(
                    "{} at offset {} (length {}) runs past end of file ({} bytes)",
                    marker,
                    offset,
                    length,
                    data.len()
                )));
            }

            pos = segment.end();
            segments.push(segment);
        }
    }

    /// Segments with the given marker, in file order.
    pub fn with_marker(&self, marker: Marker) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(move |s| s.marker == marker)
    }

    /// Number of indexed segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether no segments precede the scan.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Append a length-prefixed segment to `out`.
    pub(crate) fn push_segment(out: &mut Vec<u8>, marker: Marker, payload: &[u8]) {
        out.extend_from_slice(&marker.0.to_be_bytes());
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(payload);
    }

    /// SOI, JFIF APP0, DQT, SOS with a few scan bytes, EOI.
    pub(crate) fn minimal_jpeg() -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        push_segment(&mut out, Marker::APP0, b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0");
        push_segment(&mut out, Marker::DQT, &[0u8; 65]);
        push_segment(&mut out, Marker::SOS, &[1, 1, 0, 0, 0x3F, 0]);
        out.extend_from_slice(&[0x12, 0xFF, 0x00, 0x34]);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    #[test]
    fn test_parse_minimal() {
        let data = minimal_jpeg();
        let index = SegmentIndex::parse(&data).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.segments[0].marker, Marker::APP0);
        assert_eq!(index.segments[0].offset, 2);
        assert_eq!(index.segments[0].payload_offset, 6);
        assert_eq!(index.segments[0].length, 16);
        assert_eq!(index.segments[1].marker, Marker::DQT);
        assert_eq!(index.segments[1].offset, index.segments[0].end());
        assert_eq!(index.scan_offset, index.segments[1].end());
        assert_eq!(&data[index.scan_offset..index.scan_offset + 2], &[0xFF, 0xDA]);
    }

    #[test]
    fn test_payload_borrows_buffer() {
        let data = minimal_jpeg();
        let index = SegmentIndex::parse(&data).unwrap();
        assert!(index.segments[0].payload(&data).starts_with(b"JFIF\0"));
    }

    #[test]
    fn test_missing_soi() {
        let err = SegmentIndex::parse(&[0x89, b'P', b'N', b'G']).unwrap_err();
        assert!(matches!(err, Error::MalformedContainer(_)));
        assert!(SegmentIndex::parse(&[]).is_err());
    }

    #[test]
    fn test_length_past_end_of_file() {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE1, 0x01, 0x00];
        data.extend_from_slice(&[0u8; 10]);
        let err = SegmentIndex::parse(&data).unwrap_err();
        assert!(matches!(err, Error::MalformedContainer(_)));
    }

    #[test]
    fn test_truncated_length_field() {
        let data = vec![0xFF, 0xD8, 0xFF, 0xE1, 0x00];
        assert!(SegmentIndex::parse(&data).is_err());
    }

    #[test]
    fn test_length_below_two() {
        let data = vec![0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x01, 0xFF, 0xD9];
        assert!(SegmentIndex::parse(&data).is_err());
    }

    #[test]
    fn test_missing_scan() {
        let mut data = vec![0xFF, 0xD8];
        push_segment(&mut data, Marker::APP0, b"JFIF\0");
        assert!(SegmentIndex::parse(&data).is_err());
    }

    #[test]
    fn test_garbage_between_segments() {
        let mut data = vec![0xFF, 0xD8];
        push_segment(&mut data, Marker::APP0, b"JFIF\0");
        data.push(0x00);
        data.extend_from_slice(&[0xFF, 0xD9]);
        assert!(SegmentIndex::parse(&data).is_err());
    }

    #[test]
    fn test_fill_bytes_and_standalone_markers() {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xFF, 0xFF, 0x01];
        push_segment(&mut data, Marker::COM, b"hi");
        data.extend_from_slice(&[0xFF, 0xD9]);

        let index = SegmentIndex::parse(&data).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.segments[0].marker, Marker::TEM);
        assert_eq!(index.segments[0].offset, 4);
        assert_eq!(index.segments[0].payload_len(), 0);
        assert_eq!(index.segments[1].marker, Marker::COM);
        assert_eq!(index.segments[1].payload(&data), b"hi");
    }

    #[test]
    fn test_with_marker() {
        let mut data = vec![0xFF, 0xD8];
        push_segment(&mut data, Marker::APP1, b"Exif\0\0");
        push_segment(&mut data, Marker::APP0, b"JFIF\0");
        push_segment(&mut data, Marker::APP1, b"other");
        data.extend_from_slice(&[0xFF, 0xD9]);

        let index = SegmentIndex::parse(&data).unwrap();
        assert_eq!(index.with_marker(Marker::APP1).count(), 2);
        assert_eq!(index.with_marker(Marker::APP0).count(), 1);
    }

    #[test]
    fn test_marker_display() {
        assert_eq!(Marker::APP0.to_string(), "APP0");
        assert_eq!(Marker::APP1.to_string(), "APP1");
        assert_eq!(Marker::from_code(0xED).to_string(), "APP13");
        assert_eq!(Marker::DQT.to_string(), "DQT");
        assert_eq!(Marker(0xFFC2).to_string(), "FFC2");
    }
}
