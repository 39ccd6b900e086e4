//! Strip and embed the panorama XMP segment.
//!
//! A segment is a panorama packet when its marker is APP1 and its payload
//! starts with [`XMP_IDENTIFIER`]. Every other segment, including Exif APP1
//! segments, is copied through untouched.

use crate::packet::PanoramaPacket;
use crate::segment::{Marker, Segment, SegmentIndex};
use crate::{Error, Result};
use bytes::BufMut;
use std::borrow::Cow;
use std::path::Path;

/// Namespace identifier that prefixes an XMP APP1 payload.
pub const XMP_IDENTIFIER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

/// Largest value the 16-bit length field can hold.
pub const MAX_SEGMENT_LENGTH: usize = u16::MAX as usize;

/// Largest packet that fits in one segment.
pub const MAX_PACKET_LEN: usize = MAX_SEGMENT_LENGTH - 2 - XMP_IDENTIFIER.len();

/// Whether `segment` holds a panorama XMP packet.
pub fn is_packet_segment(segment: &Segment, data: &[u8]) -> bool {
    segment.marker == Marker::APP1 && segment.payload(data).starts_with(XMP_IDENTIFIER)
}

/// Locate every panorama packet segment without modifying the buffer.
pub fn find_packets(data: &[u8]) -> Result<Vec<Segment>> {
    let index = SegmentIndex::parse(data)?;
    Ok(index
        .segments
        .into_iter()
        .filter(|s| is_packet_segment(s, data))
        .collect())
}

/// Packet bytes of a segment returned by [`find_packets`].
pub fn packet_bytes<'a>(segment: &Segment, data: &'a [u8]) -> &'a [u8] {
    &segment.payload(data)[XMP_IDENTIFIER.len()..]
}

/// Remove every panorama packet segment.
///
/// Returns the input unchanged (borrowed) when there is nothing to remove.
pub fn strip(data: &[u8]) -> Result<Cow<'_, [u8]>> {
    let matches = find_packets(data)?;
    if matches.is_empty() {
        return Ok(Cow::Borrowed(data));
    }

    let removed: usize = matches.iter().map(|s| s.range().len()).sum();
    let mut out = Vec::with_capacity(data.len() - removed);
    let mut cursor = 0;
    for segment in &matches {
        out.extend_from_slice(&data[cursor..segment.offset]);
        cursor = segment.end();
    }
    out.extend_from_slice(&data[cursor..]);

    #[cfg(feature = "tracing")]
    tracing::trace!("Stripped {} packet segment(s), {} bytes", matches.len(), removed);

    Ok(Cow::Owned(out))
}

/// Replace any panorama packet with `packet`.
///
/// Existing packets are stripped first, so embedding the same packet twice
/// leaves exactly one segment. The new segment goes right after the first
/// APP0 segment, or right after SOI when there is none.
pub fn embed(data: &[u8], packet: &[u8]) -> Result<Vec<u8>> {
    let length = 2 + XMP_IDENTIFIER.len() + packet.len();
    if length > MAX_SEGMENT_LENGTH {
        return Err(Error::PacketTooLarge {
            size: length,
            max: MAX_SEGMENT_LENGTH,
        });
    }

    let stripped = strip(data)?;
    let index = SegmentIndex::parse(&stripped)?;
    let insert_at = index
        .with_marker(Marker::APP0)
        .next()
        .map(|s| s.end())
        .unwrap_or(2);

    let mut out = Vec::with_capacity(stripped.len() + 2 + length);
    out.extend_from_slice(&stripped[..insert_at]);
    out.put_u16(Marker::APP1.0);
    out.put_u16(length as u16);
    out.put_slice(XMP_IDENTIFIER);
    out.put_slice(packet);
    out.extend_from_slice(&stripped[insert_at..]);

    #[cfg(feature = "tracing")]
    tracing::trace!("Embedded {}-byte packet at offset {}", packet.len(), insert_at);

    Ok(out)
}

/// Strip and embed `packet` into the file at `path`, replacing it atomically.
pub fn embed_file(path: &Path, packet: &[u8]) -> Result<()> {
    let data = std::fs::read(path)?;
    let updated = embed(&data, packet)?;
    panoforge_common::fs::write_atomic(path, &updated)?;
    Ok(())
}

/// Decode the single panorama packet in the file at `path`, if any.
///
/// More than one packet segment is reported as malformed.
pub fn read_packet(path: &Path) -> Result<Option<PanoramaPacket>> {
    let data = std::fs::read(path)?;
    let found = find_packets(&data)?;
    match found.as_slice() {
        [] => Ok(None),
        [segment] => PanoramaPacket::parse(packet_bytes(segment, &data)).map(Some),
        many => Err(Error::malformed(format!(
            "{} panorama packet segments present",
            many.len()
        ))),
    }
}

/// Re-read `path` and confirm it holds exactly one packet whose projection
/// and viewer flag match `expected`.
pub fn verify_file(path: &Path, expected: &PanoramaPacket) -> Result<PanoramaPacket> {
    let data = std::fs::read(path)?;
    let found = find_packets(&data).map_err(|e| Error::verification(e.to_string()))?;
    if found.len() != 1 {
        return Err(Error::verification(format!(
            "expected exactly one panorama packet in {}, found {}",
            path.display(),
            found.len()
        )));
    }

    let decoded = PanoramaPacket::parse(packet_bytes(&found[0], &data))
        .map_err(|e| Error::verification(e.to_string()))?;

    if decoded.projection_type != expected.projection_type {
        return Err(Error::verification(format!(
            "projection type is '{}', expected '{}'",
            decoded.projection_type, expected.projection_type
        )));
    }
    if decoded.use_panorama_viewer != expected.use_panorama_viewer {
        return Err(Error::verification(format!(
            "UsePanoramaViewer is {}, expected {}",
            decoded.use_panorama_viewer, expected.use_panorama_viewer
        )));
    }

    Ok(decoded)
}
