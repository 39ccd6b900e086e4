//! Panoforge-JPEG: segment indexing and panorama metadata embedding.
//!
//! This crate reads and rewrites the marker-delimited header of a JPEG file
//! without touching entropy-coded pixel data.
//!
//! # Modules
//!
//! - `segment` - Index of length-prefixed segments between SOI and SOS
//! - `packet` - GPano XMP packet builder and parser (attribute and element forms)
//! - `codec` - Strip/embed of the XMP APP1 segment, plus on-disk verification
//!
//! # Layout
//!
//! A panorama packet is stored as a single APP1 segment:
//!
//! ```text
//! FF E1 | length (u16 BE) | "http://ns.adobe.com/xap/1.0/\0" | XMP packet
//! ```
//!
//! It is placed directly after the JFIF APP0 segment when one exists, otherwise
//! directly after SOI. Embedding always strips existing packets first, so it is
//! idempotent.

pub mod codec;
pub mod error;
pub mod packet;
pub mod segment;

pub use codec::{embed, embed_file, find_packets, read_packet, strip, verify_file};
pub use error::{Error, Result};
pub use packet::{PacketForm, PanoramaPacket};
pub use segment::{Segment, SegmentIndex};
