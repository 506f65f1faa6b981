//! Font resources: decoding shown strings through the font's encoding, and
//! glyph widths for advancing the text position.

use crate::reader::number;
use lopdf::{dictionary, Dictionary, Document, Encoding, Object};

/// Assumed glyph width for a simple font without a `/Widths` array.
const DEFAULT_GLYPH_WIDTH: f64 = 500.0;

/// Every Courier glyph is 600 units wide.
const MONOSPACE_GLYPH_WIDTH: f64 = 600.0;

/// `/DW` when a descendant CID font has none.
const DEFAULT_CID_WIDTH: f64 = 1000.0;

/// Named single-byte encodings lopdf carries tables for.
const ONE_BYTE_ENCODINGS: [&[u8]; 5] = [
    b"StandardEncoding",
    b"MacRomanEncoding",
    b"MacExpertEncoding",
    b"WinAnsiEncoding",
    b"PDFDocEncoding",
];

/// Horizontal glyph widths in thousandths of a text space unit.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum GlyphWidths {
    /// One-byte codes, from `/FirstChar` and `/Widths`.
    Simple {
        first_char: u32,
        widths: Vec<f64>,
        missing: f64,
    },
    /// Two-byte CIDs, from the descendant font's `/W`. Ranges are inclusive
    /// and sorted by their first CID.
    Composite {
        ranges: Vec<(u32, u32, f64)>,
        default: f64,
    },
}

/// Used when the shown font is not in the page's resources.
pub(crate) static ESTIMATED_WIDTHS: GlyphWidths = GlyphWidths::Simple {
    first_char: 0,
    widths: Vec::new(),
    missing: DEFAULT_GLYPH_WIDTH,
};

impl GlyphWidths {
    fn simple(doc: &Document, font: &Dictionary, base_font: Option<&str>) -> Self {
        let first_char = lookup(doc, font, b"FirstChar")
            .and_then(number)
            .unwrap_or(0.0)
            .max(0.0) as u32;
        let widths: Vec<f64> = lookup(doc, font, b"Widths")
            .and_then(|w| w.as_array().ok())
            .map(|arr| {
                arr.iter()
                    .map(|w| deref(doc, w).and_then(number).unwrap_or(0.0))
                    .collect()
            })
            .unwrap_or_default();
        let declared = lookup(doc, font, b"FontDescriptor")
            .and_then(|d| d.as_dict().ok())
            .and_then(|d| lookup(doc, d, b"MissingWidth"))
            .and_then(number);

        let missing = match declared {
            Some(width) => width,
            None if !widths.is_empty() => 0.0,
            None if base_font.is_some_and(|n| n.starts_with("Courier")) => MONOSPACE_GLYPH_WIDTH,
            None => DEFAULT_GLYPH_WIDTH,
        };
        Self::Simple {
            first_char,
            widths,
            missing,
        }
    }

    fn composite(doc: &Document, font: &Dictionary) -> Self {
        let descendant = lookup(doc, font, b"DescendantFonts")
            .and_then(|d| d.as_array().ok())
            .and_then(|d| d.first())
            .and_then(|d| deref(doc, d))
            .and_then(|d| d.as_dict().ok());
        let Some(descendant) = descendant else {
            return Self::Composite {
                ranges: Vec::new(),
                default: DEFAULT_CID_WIDTH,
            };
        };

        let default = lookup(doc, descendant, b"DW")
            .and_then(number)
            .unwrap_or(DEFAULT_CID_WIDTH);
        let items: Vec<&Object> = lookup(doc, descendant, b"W")
            .and_then(|w| w.as_array().ok())
            .map(|w| w.iter().filter_map(|o| deref(doc, o)).collect())
            .unwrap_or_default();

        // `c [w1 w2 ...]` or `c_first c_last w`
        let mut ranges = Vec::new();
        let mut i = 0;
        while i + 1 < items.len() {
            let Some(first) = number(items[i]) else {
                break;
            };
            let first = first.max(0.0) as u32;
            match items[i + 1] {
                Object::Array(list) => {
                    for (offset, width) in list.iter().enumerate() {
                        if let Some(width) = deref(doc, width).and_then(number) {
                            let cid = first + offset as u32;
                            ranges.push((cid, cid, width));
                        }
                    }
                    i += 2;
                }
                last => {
                    let (Some(last), Some(width)) =
                        (number(last), items.get(i + 2).and_then(|w| number(w)))
                    else {
                        break;
                    };
                    ranges.push((first, last.max(0.0) as u32, width));
                    i += 3;
                }
            }
        }
        ranges.sort_by_key(|r| r.0);
        Self::Composite { ranges, default }
    }

    fn width(&self, code: u32) -> f64 {
        match self {
            Self::Simple {
                first_char,
                widths,
                missing,
            } => code
                .checked_sub(*first_char)
                .and_then(|i| widths.get(i as usize))
                .copied()
                .unwrap_or(*missing),
            Self::Composite { ranges, default } => {
                let idx = ranges.partition_point(|r| r.0 <= code);
                idx.checked_sub(1)
                    .map(|i| ranges[i])
                    .filter(|r| code <= r.1)
                    .map_or(*default, |r| r.2)
            }
        }
    }

    /// Horizontal displacement of a shown string in text space, before
    /// horizontal scaling. Word spacing applies to the single-byte code 32 only.
    pub(crate) fn advance(
        &self,
        bytes: &[u8],
        font_size: f64,
        char_spacing: f64,
        word_spacing: f64,
    ) -> f64 {
        match self {
            Self::Simple { .. } => bytes
                .iter()
                .map(|&b| {
                    let word = if b == b' ' { word_spacing } else { 0.0 };
                    self.width(b as u32) / 1000.0 * font_size + char_spacing + word
                })
                .sum(),
            Self::Composite { .. } => bytes
                .chunks(2)
                .map(|c| {
                    let code = c.iter().fold(0u32, |acc, &b| acc << 8 | b as u32);
                    self.width(code) / 1000.0 * font_size + char_spacing
                })
                .sum(),
        }
    }
}

/// One entry of a page's `/Font` resources.
#[derive(Debug)]
pub(crate) struct FontResource {
    /// Base font name without a subset tag.
    name: Option<String>,
    /// Font dictionary reduced to what lopdf's encoding lookup reads. `None`
    /// when the font uses an encoding lopdf would decode wrongly.
    encoding: Option<Dictionary>,
    widths: GlyphWidths,
}

impl FontResource {
    pub(crate) fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let name = lookup(doc, font, b"BaseFont")
            .and_then(|b| b.as_name().ok())
            .map(|n| strip_subset_prefix(&String::from_utf8_lossy(n)).to_string());
        let composite = lookup(doc, font, b"Subtype").and_then(|s| s.as_name().ok())
            == Some(b"Type0".as_slice());

        let encoding_name = lookup(doc, font, b"Encoding").and_then(|e| match e {
            Object::Name(n) => Some(n.clone()),
            Object::Dictionary(d) => lookup(doc, d, b"BaseEncoding")
                .and_then(|b| b.as_name().ok())
                .map(<[u8]>::to_vec),
            _ => None,
        });

        // lopdf maps ToUnicode in two-byte units, so only composite fonts
        // may use it; simple fonts need one of the named tables.
        let encoding = if composite {
            encoding_name
                .filter(|n| n == b"Identity-H" || n == b"Identity-V")
                .zip(font.get(b"ToUnicode").ok())
                .map(|(n, to_unicode)| {
                    dictionary! {
                        "Type" => "Font",
                        "Encoding" => Object::Name(n),
                        "ToUnicode" => to_unicode.clone(),
                    }
                })
        } else {
            encoding_name
                .filter(|n| ONE_BYTE_ENCODINGS.contains(&n.as_slice()))
                .map(|n| {
                    dictionary! {
                        "Type" => "Font",
                        "Encoding" => Object::Name(n),
                    }
                })
        };

        let widths = if composite {
            GlyphWidths::composite(doc, font)
        } else {
            GlyphWidths::simple(doc, font, name.as_deref())
        };
        Self {
            name,
            encoding,
            widths,
        }
    }

    /// Resolve the encoding against `doc`.
    pub(crate) fn load<'a>(&'a self, doc: &'a Document) -> PdfFont<'a> {
        let encoding = self
            .encoding
            .as_ref()
            .and_then(|dict| match dict.get_font_encoding(doc) {
                Ok(encoding) => Some(encoding),
                Err(e) => {
                    log::debug!("Font {:?}: encoding unavailable ({})", self.name, e);
                    None
                }
            });
        PdfFont {
            name: self.name.as_deref(),
            widths: &self.widths,
            encoding,
        }
    }
}

/// A font ready for use while interpreting a content stream.
#[derive(Debug)]
pub(crate) struct PdfFont<'a> {
    pub(crate) name: Option<&'a str>,
    pub(crate) widths: &'a GlyphWidths,
    encoding: Option<Encoding<'a>>,
}

impl PdfFont<'_> {
    /// Decode a shown string, falling back to byte-level decoding.
    pub(crate) fn decode(&self, bytes: &[u8]) -> String {
        match &self.encoding {
            Some(encoding) => Document::decode_text(encoding, bytes)
                .unwrap_or_else(|_| decode_text_simple(bytes)),
            None => decode_text_simple(bytes),
        }
    }
}

fn deref<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    doc.dereference(obj).ok().map(|(_, o)| o)
}

fn lookup<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    deref(doc, dict.get(key).ok()?)
}

/// Drop a `ABCDEF+` font subset tag.
pub(crate) fn strip_subset_prefix(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.bytes().all(|b| b.is_ascii_uppercase()) => rest,
        _ => name,
    }
}

/// Byte-level decoding for strings without a usable font encoding.
pub(crate) fn decode_text_simple(bytes: &[u8]) -> String {
    // Try UTF-16BE first (BOM marker)
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }

    // Try UTF-8
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    // Fallback: Latin-1
    bytes.iter().map(|&b| b as char).collect()
}
