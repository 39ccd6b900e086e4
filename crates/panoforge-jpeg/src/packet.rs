//! GPano XMP packet.
//!
//! Builds and parses the equirectangular panorama descriptor understood by
//! 360° viewers. Two serializations are supported: every field as an
//! attribute on `rdf:Description`, or every field as a child element of it.

use crate::{Error, Result};
use regex::Regex;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::LazyLock;

/// GPano XML namespace.
pub const GPANO_NAMESPACE: &str = "http://ns.google.com/photos/1.0/panorama/";

/// Projection written by this crate.
pub const PROJECTION_EQUIRECTANGULAR: &str = "equirectangular";

const XPACKET_BEGIN: &str = "<?xpacket begin=\"\u{FEFF}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>";
const XPACKET_END: &str = "<?xpacket end=\"w\"?>";

const PROJECTION_TYPE: &str = "ProjectionType";
const USE_PANORAMA_VIEWER: &str = "UsePanoramaViewer";
const CROPPED_WIDTH: &str = "CroppedAreaImageWidthPixels";
const CROPPED_HEIGHT: &str = "CroppedAreaImageHeightPixels";
const FULL_WIDTH: &str = "FullPanoWidthPixels";
const FULL_HEIGHT: &str = "FullPanoHeightPixels";
const CROPPED_LEFT: &str = "CroppedAreaLeftPixels";
const CROPPED_TOP: &str = "CroppedAreaTopPixels";

static ATTRIBUTE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"GPano:(\w+)\s*=\s*"([^"]*)""#).expect("valid attribute regex")
});

static ELEMENT_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<GPano:(\w+)>\s*([^<]*?)\s*</GPano:(\w+)>").expect("valid element regex")
});

/// Serialization form of a packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PacketForm {
    /// All fields as attributes of a single `rdf:Description`.
    #[default]
    Attribute,
    /// All fields as child elements of `rdf:Description`.
    Element,
}

impl PacketForm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attribute => "attribute",
            Self::Element => "element",
        }
    }
}

impl std::fmt::Display for PacketForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PacketForm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "attribute" | "attributes" => Ok(Self::Attribute),
            "element" | "elements" => Ok(Self::Element),
            other => Err(Error::invalid_packet(format!(
                "unknown packet form '{}' (expected 'attribute' or 'element')",
                other
            ))),
        }
    }
}

/// Decoded panorama descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanoramaPacket {
    pub projection_type: String,
    pub use_panorama_viewer: bool,
    pub cropped_width: u32,
    pub cropped_height: u32,
    pub full_width: u32,
    pub full_height: u32,
    pub cropped_left: u32,
    pub cropped_top: u32,
}

impl PanoramaPacket {
    /// Descriptor for a full (uncropped) equirectangular image.
    pub fn equirectangular(width: u32, height: u32) -> Self {
        Self {
            projection_type: PROJECTION_EQUIRECTANGULAR.to_string(),
            use_panorama_viewer: true,
            cropped_width: width,
            cropped_height: height,
            full_width: width,
            full_height: height,
            cropped_left: 0,
            cropped_top: 0,
        }
    }

    fn fields(&self) -> [(&'static str, String); 8] {
        [
            (PROJECTION_TYPE, self.projection_type.clone()),
            (
                USE_PANORAMA_VIEWER,
                if self.use_panorama_viewer { "True" } else { "False" }.to_string(),
            ),
            (CROPPED_WIDTH, self.cropped_width.to_string()),
            (CROPPED_HEIGHT, self.cropped_height.to_string()),
            (FULL_WIDTH, self.full_width.to_string()),
            (FULL_HEIGHT, self.full_height.to_string()),
            (CROPPED_LEFT, self.cropped_left.to_string()),
            (CROPPED_TOP, self.cropped_top.to_string()),
        ]
    }

    /// Serialize as an XMP packet string.
    pub fn to_xmp(&self, form: PacketForm) -> String {
        let mut out = String::with_capacity(1024);
        out.push_str(XPACKET_BEGIN);
        out.push('\n');
        out.push_str("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n");
        out.push_str(" <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n");
        let _ = write!(
            out,
            "  <rdf:Description rdf:about=\"\"\n    xmlns:GPano=\"{}\"",
            GPANO_NAMESPACE
        );

        match form {
            PacketForm::Attribute => {
                for (name, value) in self.fields() {
                    let _ = write!(out, "\n    GPano:{}=\"{}\"", name, escape(&value));
                }
                out.push_str("/>\n");
            }
            PacketForm::Element => {
                out.push_str(">\n");
                for (name, value) in self.fields() {
                    let _ = writeln!(out, "   <GPano:{0}>{1}</GPano:{0}>", name, escape(&value));
                }
                out.push_str("  </rdf:Description>\n");
            }
        }

        out.push_str(" </rdf:RDF>\n");
        out.push_str("</x:xmpmeta>\n");
        out.push_str(XPACKET_END);
        out
    }

    /// Serialize as packet bytes ready for embedding.
    pub fn to_bytes(&self, form: PacketForm) -> Vec<u8> {
        self.to_xmp(form).into_bytes()
    }

    /// Parse a packet produced by either form.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::invalid_packet(format!("packet is not UTF-8: {}", e)))?;

        let mut values: HashMap<&str, &str> = HashMap::new();
        for caps in ATTRIBUTE_FIELD.captures_iter(text) {
            if let (Some(name), Some(value)) = (caps.get(1), caps.get(2)) {
                values.entry(name.as_str()).or_insert(value.as_str());
            }
        }
        for caps in ELEMENT_FIELD.captures_iter(text) {
            if let (Some(open), Some(value), Some(close)) = (caps.get(1), caps.get(2), caps.get(3))
            {
                if open.as_str() == close.as_str() {
                    values.entry(open.as_str()).or_insert(value.as_str());
                }
            }
        }

        let field = |name: &str| -> Result<&str> {
            values
                .get(name)
                .copied()
                .ok_or_else(|| Error::invalid_packet(format!("missing GPano:{}", name)))
        };
        let pixels = |name: &str| -> Result<u32> {
            let raw = field(name)?;
            raw.trim().parse::<u32>().map_err(|_| {
                Error::invalid_packet(format!("GPano:{} is not a pixel count: '{}'", name, raw))
            })
        };

        let viewer = field(USE_PANORAMA_VIEWER)?;
        let use_panorama_viewer = if viewer.eq_ignore_ascii_case("true") {
            true
        } else if viewer.eq_ignore_ascii_case("false") {
            false
        } else {
            return Err(Error::invalid_packet(format!(
                "GPano:{} is not a boolean: '{}'",
                USE_PANORAMA_VIEWER, viewer
            )));
        };

        Ok(Self {
            projection_type: unescape(field(PROJECTION_TYPE)?),
            use_panorama_viewer,
            cropped_width: pixels(CROPPED_WIDTH)?,
            cropped_height: pixels(CROPPED_HEIGHT)?,
            full_width: pixels(FULL_WIDTH)?,
            full_height: pixels(FULL_HEIGHT)?,
            cropped_left: pixels(CROPPED_LEFT)?,
            cropped_top: pixels(CROPPED_TOP)?,
        })
    }
}

/// Build the packet bytes for a full equirectangular image of the given size.
pub fn build(width: u32, height: u32, form: PacketForm) -> Vec<u8> {
    PanoramaPacket::equirectangular(width, height).to_bytes(form)
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unescape(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}
